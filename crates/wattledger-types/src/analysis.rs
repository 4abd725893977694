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

use crate::series::Sample;

/// Sign convention a battery power sensor uses for charging
///
/// Inverter vendors do not agree on whether charging shows up as positive
/// or negative battery power, so the convention is detected per
/// installation and remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerConvention {
    PositiveCharging,
    NegativeCharging,
}

impl PowerConvention {
    /// Normalize a raw battery power reading so charging is positive
    pub fn normalize(self, raw: f64) -> f64 {
        match self {
            Self::PositiveCharging => raw,
            Self::NegativeCharging => -raw,
        }
    }
}

impl fmt::Display for PowerConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PositiveCharging => write!(f, "positive_charging"),
            Self::NegativeCharging => write!(f, "negative_charging"),
        }
    }
}

/// A maximal run of battery samples whose normalized power stayed above
/// the charging threshold (modulo short gaps)
#[derive(Debug, Clone)]
pub struct ChargingEvent {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub points: Vec<Sample>,
}

impl ChargingEvent {
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

/// A priced, source-attributed reconstruction of one charging event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Energy charged into the battery over the whole event (Wh)
    pub charged_energy_wh: f64,
    pub charged_from_pv_wh: f64,
    pub charged_from_grid_wh: f64,
    /// Grid cost including the charge-efficiency surcharge (EUR)
    pub cost_eur: f64,
    /// Set by aggregation when part of this session is presumed still
    /// resident in the battery
    pub is_inventory: bool,
    /// How much of this session counts toward the inventory target (Wh)
    pub inventory_energy_wh: f64,
}

impl Session {
    /// Share of this session's energy that came from PV, in percent
    pub fn pv_ratio_percent(&self) -> f64 {
        if self.charged_energy_wh > 0.0 {
            self.charged_from_pv_wh / self.charged_energy_wh * 100.0
        } else {
            0.0
        }
    }
}

/// Snapshot of one completed price analysis
///
/// Built whole by the aggregator and swapped into engine state in a single
/// assignment; readers never observe a partially updated result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Cost-weighted average price of the analyzed energy (EUR/Wh)
    pub stored_energy_price_eur_per_wh: f64,
    /// Lookback window the analysis covered (hours)
    pub lookback_hours: u32,
    pub charged_energy_wh: f64,
    pub charged_from_pv_wh: f64,
    pub charged_from_grid_wh: f64,
    pub pv_ratio_percent: f64,
    /// Per-session detail for diagnostics/visualization, chronological
    pub sessions: Vec<Session>,
    pub computed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Zero-valued result recording that a run completed without finding
    /// any charging activity (distinct from a failed run)
    pub fn empty(
        price_eur_per_wh: f64,
        lookback_hours: u32,
        computed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stored_energy_price_eur_per_wh: price_eur_per_wh,
            lookback_hours,
            charged_energy_wh: 0.0,
            charged_from_pv_wh: 0.0,
            charged_from_grid_wh: 0.0,
            pv_ratio_percent: 0.0,
            sessions: Vec::new(),
            computed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_flips_only_negative_convention() {
        assert_eq!(PowerConvention::PositiveCharging.normalize(-500.0), -500.0);
        assert_eq!(PowerConvention::NegativeCharging.normalize(-500.0), 500.0);
        assert_eq!(PowerConvention::NegativeCharging.normalize(500.0), -500.0);
    }

    #[test]
    fn test_session_pv_ratio() {
        let session = Session {
            start_time: Utc::now(),
            end_time: Utc::now(),
            charged_energy_wh: 2000.0,
            charged_from_pv_wh: 500.0,
            charged_from_grid_wh: 1500.0,
            cost_eur: 0.4,
            is_inventory: false,
            inventory_energy_wh: 0.0,
        };
        assert_eq!(session.pv_ratio_percent(), 25.0);
    }
}
