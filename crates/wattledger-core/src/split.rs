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

use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, warn};

use crate::events::MAX_EVENT_GAP_SECS;
use wattledger_types::{ChargingEvent, PowerConvention, SensorSeries};

/// Replacement duration when a pair of event samples is further apart
/// than the gap bound, so one missing-data hole cannot dominate totals
pub const DEFAULT_INTERVAL_SECS: i64 = 300;

/// Monotone cursor over one sensor stream
///
/// Advances to the latest sample at or before the queried instant and
/// never rewinds; valid because intervals are visited in non-decreasing
/// time order across an event.
#[derive(Debug, Default)]
pub struct StreamCursor {
    index: usize,
}

impl StreamCursor {
    pub fn new() -> Self {
        Self { index: 0 }
    }

    /// Step-function value of `series` at `at`; None when the series has
    /// no samples at all
    pub fn value_at(&mut self, series: &SensorSeries, at: DateTime<Utc>) -> Option<f64> {
        let samples = series.samples();
        if samples.is_empty() {
            return None;
        }
        while self.index < samples.len() - 1 && samples[self.index + 1].timestamp <= at {
            self.index += 1;
        }
        Some(samples[self.index].value)
    }
}

/// Per-event energy attribution totals
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventTotals {
    pub pv_to_battery_wh: f64,
    pub grid_to_battery_wh: f64,
    /// Integrated battery charging energy over the event (Wh)
    pub total_battery_wh: f64,
    /// Cost of the grid-sourced share at historical spot prices (EUR),
    /// before the charge-efficiency surcharge
    pub grid_cost_eur: f64,
}

/// Splits one charging event's energy between PV surplus and grid import
///
/// Holds the four context streams of a single analysis run; each call to
/// [`split`](Self::split) walks one event with fresh stream cursors.
#[derive(Debug)]
pub struct EnergySourceSplitter<'a> {
    pv: &'a SensorSeries,
    grid: &'a SensorSeries,
    load: &'a SensorSeries,
    price: &'a SensorSeries,
    convention: PowerConvention,
    grid_charge_threshold_w: f64,
}

impl<'a> EnergySourceSplitter<'a> {
    pub fn new(
        pv: &'a SensorSeries,
        grid: &'a SensorSeries,
        load: &'a SensorSeries,
        price: &'a SensorSeries,
        convention: PowerConvention,
        grid_charge_threshold_w: f64,
    ) -> Self {
        Self {
            pv,
            grid,
            load,
            price,
            convention,
            grid_charge_threshold_w,
        }
    }

    /// Integrate one event and attribute its energy to PV and grid
    ///
    /// Battery power is trapezoidal (mean of each sample pair); the other
    /// streams are sampled as step functions held from the latest sample
    /// at or before each interval start. Events with fewer than two
    /// trimmed points carry no integrable energy and return zero totals.
    pub fn split(&self, event: &ChargingEvent) -> EventTotals {
        let mut totals = EventTotals::default();
        let points = &event.points;
        if points.len() < 2 {
            return totals;
        }

        self.warn_missing_streams(event);

        let mut pv_cursor = StreamCursor::new();
        let mut grid_cursor = StreamCursor::new();
        let mut load_cursor = StreamCursor::new();
        let mut price_cursor = StreamCursor::new();

        for pair in points.windows(2) {
            let interval_start = pair[0].timestamp;
            let mut delta_secs = (pair[1].timestamp - pair[0].timestamp).num_seconds();
            if delta_secs > MAX_EVENT_GAP_SECS {
                delta_secs = DEFAULT_INTERVAL_SECS;
            }
            let hours = delta_secs as f64 / 3600.0;

            let pv_power = pv_cursor.value_at(self.pv, interval_start).unwrap_or(0.0);
            let grid_power = grid_cursor.value_at(self.grid, interval_start).unwrap_or(0.0);
            let load_power = load_cursor.value_at(self.load, interval_start).unwrap_or(0.0);
            let price = price_cursor
                .value_at(self.price, interval_start)
                .unwrap_or_else(|| fallback_price_eur_per_kwh(interval_start));

            let avg_battery = self
                .convention
                .normalize((pair[0].value + pair[1].value) / 2.0);

            let (pv_to_battery, grid_to_battery) = split_power(
                avg_battery,
                pv_power,
                grid_power,
                load_power,
                self.grid_charge_threshold_w,
            );

            let grid_energy_wh = grid_to_battery * hours;
            totals.pv_to_battery_wh += pv_to_battery * hours;
            totals.grid_to_battery_wh += grid_energy_wh;
            totals.total_battery_wh += avg_battery * hours;
            totals.grid_cost_eur += grid_energy_wh / 1000.0 * price;
        }

        debug!(
            "⚡ [SPLIT] event {} → {}: {:.1} Wh charged ({:.1} PV / {:.1} grid, {:.4} EUR)",
            event.start_time.format("%Y-%m-%d %H:%M"),
            event.end_time.format("%H:%M"),
            totals.total_battery_wh,
            totals.pv_to_battery_wh,
            totals.grid_to_battery_wh,
            totals.grid_cost_eur
        );
        totals
    }

    /// An empty context stream silently reads as constant zero, which
    /// skews attribution; make the degradation visible per event
    fn warn_missing_streams(&self, event: &ChargingEvent) {
        if self.grid.is_empty() {
            warn!(
                "⚠️ [SPLIT] Missing sensor data for grid during event starting {}; \
                 grid-charged energy will be misattributed to PV",
                event.start_time.format("%Y-%m-%d %H:%M")
            );
        }
        if self.pv.is_empty() {
            warn!(
                "⚠️ [SPLIT] Missing sensor data for pv during event starting {}; \
                 attribution degrades to grid surplus and the residual catch-all",
                event.start_time.format("%Y-%m-%d %H:%M")
            );
        }
    }
}

/// Split instantaneous battery charging power between PV and grid
///
/// Priority order: PV serves load first, grid serves the rest of the
/// load, the battery then draws from PV surplus before grid surplus.
/// Grid surplus only counts once it clears the grid-charge threshold, so
/// export/metering noise is not billed as grid charging. Whatever the
/// surpluses cannot explain folds into the PV share as a conservative
/// catch-all (battery-internal flows are not billed twice).
pub fn split_power(
    battery_power: f64,
    pv_power: f64,
    grid_power: f64,
    load_power: f64,
    grid_charge_threshold_w: f64,
) -> (f64, f64) {
    let pv_for_load = pv_power.min(load_power);
    let remaining_load = (load_power - pv_for_load).max(0.0);
    let grid_for_load = grid_power.min(remaining_load);
    let pv_surplus = (pv_power - pv_for_load).max(0.0);
    let grid_surplus = (grid_power - grid_for_load).max(0.0);

    let mut pv_to_battery = battery_power.min(pv_surplus);
    let mut remaining_battery = (battery_power - pv_to_battery).max(0.0);

    let mut grid_to_battery = 0.0;
    if grid_surplus > grid_charge_threshold_w {
        grid_to_battery = remaining_battery.min(grid_surplus);
        remaining_battery = (remaining_battery - grid_to_battery).max(0.0);
    }

    if remaining_battery > 0.0 {
        pv_to_battery += remaining_battery;
    }

    (pv_to_battery, grid_to_battery)
}

/// Price assumption when no spot price history is available, banded by
/// hour of day (EUR/kWh)
pub fn fallback_price_eur_per_kwh(at: DateTime<Utc>) -> f64 {
    match at.hour() {
        0..=6 | 22..=23 => 0.15,
        7..=13 => 0.25,
        _ => 0.35,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use wattledger_types::{Sample, SignalKind};

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).expect("valid timestamp")
    }

    fn constant(signal: SignalKind, until_secs: i64, value: f64) -> SensorSeries {
        SensorSeries::new(
            signal,
            (0..=until_secs / 300)
                .map(|i| Sample::new(ts(i * 300), value))
                .collect(),
        )
    }

    fn hour_event(power_w: f64) -> ChargingEvent {
        let points: Vec<Sample> = (0..=12).map(|i| Sample::new(ts(i * 300), power_w)).collect();
        ChargingEvent {
            start_time: ts(0),
            end_time: ts(3600),
            points,
        }
    }

    #[test]
    fn test_pure_grid_charge() {
        // battery 3000 W, pv 0, grid 3500 W, load 500 W over one hour
        let pv = constant(SignalKind::PvPower, 3600, 0.0);
        let grid = constant(SignalKind::GridPower, 3600, 3500.0);
        let load = constant(SignalKind::LoadPower, 3600, 500.0);
        let price = constant(SignalKind::SpotPrice, 3600, 0.25);

        let splitter = EnergySourceSplitter::new(
            &pv,
            &grid,
            &load,
            &price,
            PowerConvention::PositiveCharging,
            100.0,
        );
        let totals = splitter.split(&hour_event(3000.0));

        assert!((totals.grid_to_battery_wh - 3000.0).abs() < 1e-6);
        assert!((totals.pv_to_battery_wh - 0.0).abs() < 1e-6);
        assert!((totals.total_battery_wh - 3000.0).abs() < 1e-6);
        // 3 kWh at 0.25 EUR/kWh
        assert!((totals.grid_cost_eur - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_mixed_source_charge() {
        // battery 3000 W, pv 2000 W, grid 2000 W, load 500 W: PV surplus
        // 1500 W first, grid surplus covers the remaining 1500 W
        let pv = constant(SignalKind::PvPower, 3600, 2000.0);
        let grid = constant(SignalKind::GridPower, 3600, 2000.0);
        let load = constant(SignalKind::LoadPower, 3600, 500.0);
        let price = constant(SignalKind::SpotPrice, 3600, 0.30);

        let splitter = EnergySourceSplitter::new(
            &pv,
            &grid,
            &load,
            &price,
            PowerConvention::PositiveCharging,
            100.0,
        );
        let totals = splitter.split(&hour_event(3000.0));

        assert!((totals.pv_to_battery_wh - 1500.0).abs() < 1e-6);
        assert!((totals.grid_to_battery_wh - 1500.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_grid_series_biases_to_pv() {
        // Empty grid series reads as zero: everything lands on PV via
        // the residual catch-all, cost stays zero
        let pv = constant(SignalKind::PvPower, 3600, 0.0);
        let grid = SensorSeries::empty(SignalKind::GridPower);
        let load = constant(SignalKind::LoadPower, 3600, 500.0);
        let price = constant(SignalKind::SpotPrice, 3600, 0.25);

        let splitter = EnergySourceSplitter::new(
            &pv,
            &grid,
            &load,
            &price,
            PowerConvention::PositiveCharging,
            100.0,
        );
        let totals = splitter.split(&hour_event(3000.0));

        assert!((totals.grid_to_battery_wh - 0.0).abs() < 1e-6);
        assert!((totals.pv_to_battery_wh - 3000.0).abs() < 1e-6);
        assert!((totals.grid_cost_eur - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_tiny_event_contributes_nothing() {
        let pv = constant(SignalKind::PvPower, 3600, 0.0);
        let grid = constant(SignalKind::GridPower, 3600, 3500.0);
        let load = constant(SignalKind::LoadPower, 3600, 500.0);
        let price = constant(SignalKind::SpotPrice, 3600, 0.25);

        let splitter = EnergySourceSplitter::new(
            &pv,
            &grid,
            &load,
            &price,
            PowerConvention::PositiveCharging,
            100.0,
        );

        let event = ChargingEvent {
            start_time: ts(0),
            end_time: ts(0),
            points: vec![Sample::new(ts(0), 3000.0)],
        };
        assert_eq!(splitter.split(&event), EventTotals::default());
    }

    #[test]
    fn test_oversized_gap_replaced_by_default_interval() {
        let pv = SensorSeries::empty(SignalKind::PvPower);
        let grid = constant(SignalKind::GridPower, 7200, 3500.0);
        let load = constant(SignalKind::LoadPower, 7200, 500.0);
        let price = constant(SignalKind::SpotPrice, 7200, 0.25);

        let splitter = EnergySourceSplitter::new(
            &pv,
            &grid,
            &load,
            &price,
            PowerConvention::PositiveCharging,
            100.0,
        );

        // Two samples 2 h apart: billed as the 300 s default, not 2 h
        let event = ChargingEvent {
            start_time: ts(0),
            end_time: ts(7200),
            points: vec![Sample::new(ts(0), 3000.0), Sample::new(ts(7200), 3000.0)],
        };
        let totals = splitter.split(&event);
        assert!((totals.total_battery_wh - 3000.0 * 300.0 / 3600.0).abs() < 1e-6);
    }

    #[test]
    fn test_split_power_grid_noise_gate() {
        // 80 W of grid surplus stays under the 100 W gate: the residual
        // folds into PV instead of being billed
        let (pv_to_battery, grid_to_battery) = split_power(60.0, 0.0, 80.0, 0.0, 100.0);
        assert_eq!(grid_to_battery, 0.0);
        assert_eq!(pv_to_battery, 60.0);
    }

    #[test]
    fn test_split_power_invariant_no_double_count() {
        for &(battery, pv, grid, load) in &[
            (3000.0, 0.0, 3500.0, 500.0),
            (3000.0, 2000.0, 2000.0, 500.0),
            (3000.0, 0.0, 0.0, 500.0),
            (1500.0, 5000.0, 0.0, 1000.0),
            (500.0, 200.0, 150.0, 100.0),
        ] {
            let (pv_share, grid_share) = split_power(battery, pv, grid, load, 100.0);
            assert!(pv_share + grid_share <= battery + 1e-9);
            assert!(grid_share >= 0.0);
        }
    }

    #[test]
    fn test_fallback_price_bands() {
        let night = ts(0).date_naive().and_hms_opt(23, 0, 0).expect("valid").and_utc();
        let morning = ts(0).date_naive().and_hms_opt(9, 0, 0).expect("valid").and_utc();
        let evening = ts(0).date_naive().and_hms_opt(18, 0, 0).expect("valid").and_utc();

        assert_eq!(fallback_price_eur_per_kwh(night), 0.15);
        assert_eq!(fallback_price_eur_per_kwh(morning), 0.25);
        assert_eq!(fallback_price_eur_per_kwh(evening), 0.35);
    }

    #[test]
    fn test_cursor_never_rewinds() {
        let series = SensorSeries::new(
            SignalKind::GridPower,
            vec![
                Sample::new(ts(0), 1.0),
                Sample::new(ts(300), 2.0),
                Sample::new(ts(600), 3.0),
            ],
        );

        let mut cursor = StreamCursor::new();
        assert_eq!(cursor.value_at(&series, ts(350)), Some(2.0));
        // An earlier query after advancing holds the cursor position
        assert_eq!(cursor.value_at(&series, ts(0)), Some(2.0));
        assert_eq!(cursor.value_at(&series, ts(900)), Some(3.0));
    }

    #[test]
    fn test_event_duration_helper() {
        let event = hour_event(3000.0);
        assert_eq!(event.duration(), Duration::seconds(3600));
    }
}
