// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of WattLedger.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One historical reading of a single signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp of the reading
    pub timestamp: DateTime<Utc>,
    /// Numeric value (W for power signals, EUR/kWh for price)
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// The five signals a price analysis run consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    BatteryPower,
    PvPower,
    GridPower,
    LoadPower,
    SpotPrice,
}

impl SignalKind {
    /// All signals required for an analysis run, in fetch order
    pub const REQUIRED: [SignalKind; 5] = [
        Self::BatteryPower,
        Self::PvPower,
        Self::GridPower,
        Self::LoadPower,
        Self::SpotPrice,
    ];

    /// Stable key used in config and log lines
    pub fn key(self) -> &'static str {
        match self {
            Self::BatteryPower => "battery_power",
            Self::PvPower => "pv_power",
            Self::GridPower => "grid_power",
            Self::LoadPower => "load_power",
            Self::SpotPrice => "price",
        }
    }

    /// Price values get auto-scaled during conversion; power values do not
    pub fn is_price(self) -> bool {
        matches!(self, Self::SpotPrice)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A time-ordered series of samples for one signal
///
/// Samples are sorted by timestamp on construction; every consumer relies
/// on the non-decreasing ordering invariant.
#[derive(Debug, Clone)]
pub struct SensorSeries {
    signal: SignalKind,
    samples: Vec<Sample>,
}

impl SensorSeries {
    /// Build a series, sorting the samples into timestamp order
    pub fn new(signal: SignalKind, mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self { signal, samples }
    }

    pub fn empty(signal: SignalKind) -> Self {
        Self {
            signal,
            samples: Vec::new(),
        }
    }

    pub fn signal(&self) -> SignalKind {
        self.signal
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Samples with `start <= timestamp <= end`, cloned into a new vector
    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Sample> {
        let lo = self.samples.partition_point(|s| s.timestamp < start);
        let hi = self.samples.partition_point(|s| s.timestamp <= end);
        self.samples[lo..hi].to_vec()
    }

    /// Value of the sample closest to `at`, if one lies within `max_distance`
    pub fn value_near(&self, at: DateTime<Utc>, max_distance: Duration) -> Option<f64> {
        closest_value(&self.samples, at, max_distance)
    }
}

/// Closest-sample lookup over a sorted slice, bounded by `max_distance`
pub fn closest_value(samples: &[Sample], at: DateTime<Utc>, max_distance: Duration) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let idx = samples.partition_point(|s| s.timestamp <= at);
    let mut best: Option<&Sample> = None;
    for candidate in [idx.checked_sub(1), Some(idx)].into_iter().flatten() {
        if let Some(sample) = samples.get(candidate) {
            let better = match best {
                Some(current) => {
                    (sample.timestamp - at).abs() < (current.timestamp - at).abs()
                }
                None => true,
            };
            if better {
                best = Some(sample);
            }
        }
    }
    best.filter(|s| (s.timestamp - at).abs() <= max_distance)
        .map(|s| s.value)
}
