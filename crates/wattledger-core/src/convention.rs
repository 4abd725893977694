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

use chrono::Duration;
use tracing::debug;

use wattledger_types::series::closest_value;
use wattledger_types::{PowerConvention, Sample, SensorSeries};

/// Maximum distance between a battery sample and a context sample for the
/// context to count as simultaneous
const CONTEXT_MATCH_MAX_SECS: i64 = 300;

/// Below this many contextual events the correlation result is noise and
/// the magnitude fallback decides instead
const MIN_CONTEXTUAL_EVENTS: u32 = 3;

/// Minimum number of recent battery samples inspected
const MIN_SAMPLE_POINTS: usize = 100;

/// Detect whether this installation reports charging as positive or
/// negative battery power
///
/// Raw sign frequency is useless here (a battery that mostly discharges
/// has the majority sign on discharging), so the detector correlates
/// battery activity with moments where charging energy was actually
/// available: grid import above the charging threshold, or PV production
/// exceeding load by more than the threshold. Whichever battery sign
/// lines up with more of those moments is the charging sign.
///
/// Only the most recent ~20% of battery data (at least 100 points) is
/// sampled, and the context series are pre-filtered to that span, keeping
/// the correlation cheap over long histories. The result is deterministic
/// for a fixed input.
pub fn detect_power_convention(
    battery: &SensorSeries,
    pv: &SensorSeries,
    grid: &SensorSeries,
    load: &SensorSeries,
    charging_threshold_w: f64,
) -> PowerConvention {
    let samples = battery.samples();
    if samples.is_empty() {
        return PowerConvention::PositiveCharging;
    }

    let sample_size = (samples.len() / 5)
        .max(MIN_SAMPLE_POINTS)
        .min(samples.len());
    let window = &samples[samples.len() - sample_size..];

    let span_start = window[0].timestamp;
    let span_end = window[window.len() - 1].timestamp;
    let pv_context = pv.window(span_start, span_end);
    let grid_context = grid.window(span_start, span_end);
    let load_context = load.window(span_start, span_end);

    let mut positive_events = 0u32;
    let mut negative_events = 0u32;
    let max_distance = Duration::seconds(CONTEXT_MATCH_MAX_SECS);

    for point in window {
        if point.value.abs() <= charging_threshold_w {
            continue;
        }

        let grid_power = closest_value(&grid_context, point.timestamp, max_distance).unwrap_or(0.0);
        let pv_power = closest_value(&pv_context, point.timestamp, max_distance).unwrap_or(0.0);
        let load_power = closest_value(&load_context, point.timestamp, max_distance).unwrap_or(0.0);

        let grid_importing = grid_power > charging_threshold_w;
        let pv_surplus = pv_power > load_power + charging_threshold_w;
        if !(grid_importing || pv_surplus) {
            continue;
        }

        if point.value > charging_threshold_w {
            positive_events += 1;
        } else if point.value < -charging_threshold_w {
            negative_events += 1;
        }
    }

    debug!(
        "🔍 [CONVENTION] {} positive / {} negative contextual events from {} samples",
        positive_events,
        negative_events,
        window.len()
    );

    if positive_events + negative_events < MIN_CONTEXTUAL_EVENTS {
        // Not enough context (e.g., grid-only system that never charged
        // in the sample span): decide by magnitude frequency instead
        return magnitude_fallback(window, charging_threshold_w);
    }

    if negative_events > positive_events {
        PowerConvention::NegativeCharging
    } else {
        PowerConvention::PositiveCharging
    }
}

/// Majority sign among high-power samples, ties resolve to positive
fn magnitude_fallback(window: &[Sample], charging_threshold_w: f64) -> PowerConvention {
    let threshold = charging_threshold_w * 2.0;
    let mut positive = 0u32;
    let mut negative = 0u32;

    for point in window {
        if point.value > threshold {
            positive += 1;
        } else if point.value < -threshold {
            negative += 1;
        }
    }

    debug!(
        "🔍 [CONVENTION] magnitude fallback: {} positive / {} negative high-power samples",
        positive, negative
    );

    if negative > positive {
        PowerConvention::NegativeCharging
    } else {
        PowerConvention::PositiveCharging
    }
}
