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
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::convention::detect_power_convention;
use crate::convert::{convert_history, parse_state_value};
use crate::error::AnalysisError;
use crate::events::reconstruct_charging_events;
use crate::inventory::aggregate_sessions;
use crate::split::EnergySourceSplitter;
use crate::traits::HistoryDataSource;
use wattledger_types::{
    AnalysisResult, PowerConvention, PriceTrackerConfig, SensorSeries, Session, SignalKind,
};

/// Extra history fetched before the lookback window so sessions that
/// straddle the window boundary reconstruct fully
pub const LOOKBACK_BUFFER_HOURS: i64 = 12;

/// Sessions below this energy are sensor noise, not charges (Wh)
const MIN_SESSION_ENERGY_WH: f64 = 0.001;

/// How far back the SoC inventory probe looks for a recent reading
const SOC_PROBE_HOURS: i64 = 2;

/// Mutable engine state, written only by the single active recompute
struct EngineState {
    price_eur_per_wh: f64,
    last_calculation: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    convention: Option<PowerConvention>,
    last_result: Option<AnalysisResult>,
}

/// Point-in-time view of the engine for callers
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    pub enabled: bool,
    pub current_price_eur_per_wh: f64,
    pub last_calculation: Option<DateTime<Utc>>,
    pub next_update_in_secs: u64,
}

/// The stored-energy price engine
///
/// Owns the configuration and the sticky per-installation state (current
/// price, detected power convention, last analysis). One instance per
/// installation; share it behind an [`Arc`]. Reads are non-blocking and
/// always serve the last-known-good values; recomputes are single-flight.
pub struct PriceEngine {
    config: PriceTrackerConfig,
    source: Arc<dyn HistoryDataSource>,
    state: RwLock<EngineState>,
    calculating: AtomicBool,
}

impl std::fmt::Debug for PriceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceEngine")
            .field("source", &self.source.name())
            .field("calculating", &self.calculating.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// The five series of one analysis run, local to that run
struct SeriesBundle {
    battery: SensorSeries,
    pv: SensorSeries,
    grid: SensorSeries,
    load: SensorSeries,
    price: SensorSeries,
}

impl PriceEngine {
    /// Create an engine; fails fast when price calculation is enabled but
    /// required sensor entities are missing
    pub fn new(
        config: PriceTrackerConfig,
        source: Arc<dyn HistoryDataSource>,
    ) -> Result<Self, AnalysisError> {
        if config.price_calculation_enabled {
            config.validate().map_err(AnalysisError::Config)?;
            info!(
                "💰 [PRICE] Dynamic price calculation enabled (interval: {}s, lookback: {}h, source: {})",
                config.price_update_interval_secs,
                config.price_history_lookback_hours,
                source.name()
            );
        } else {
            info!("💰 [PRICE] Dynamic price calculation is disabled in config");
        }

        let state = EngineState {
            price_eur_per_wh: config.baseline_price_eur_per_wh,
            last_calculation: None,
            last_attempt: None,
            convention: None,
            last_result: None,
        };

        Ok(Self {
            config,
            source,
            state: RwLock::new(state),
            calculating: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &PriceTrackerConfig {
        &self.config
    }

    /// Current stored-energy price (EUR/Wh), never blocking
    pub fn current_price_eur_per_wh(&self) -> f64 {
        self.state.read().price_eur_per_wh
    }

    /// Last completed analysis snapshot
    pub fn last_result(&self) -> Option<AnalysisResult> {
        self.state.read().last_result.clone()
    }

    /// Detected battery power convention, once a run has needed it
    pub fn convention(&self) -> Option<PowerConvention> {
        self.state.read().convention
    }

    /// Forget the detected convention so the next run re-detects it
    pub fn reset_convention(&self) {
        info!("🔍 [PRICE] Battery power convention reset, will re-detect on next run");
        self.state.write().convention = None;
    }

    /// Timestamp of the last analysis attempt, successful or not
    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_attempt
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.state.read();
        EngineStatus {
            enabled: self.config.price_calculation_enabled,
            current_price_eur_per_wh: state.price_eur_per_wh,
            last_calculation: state.last_calculation,
            next_update_in_secs: self.seconds_until_next_update_locked(&state.last_calculation),
        }
    }

    /// Whether the update interval has elapsed since the last successful
    /// calculation
    pub fn should_update(&self) -> bool {
        if !self.config.price_calculation_enabled {
            return false;
        }
        match self.state.read().last_calculation {
            None => true,
            Some(last) => {
                (Utc::now() - last).num_seconds()
                    >= self.config.price_update_interval_secs as i64
            }
        }
    }

    pub fn seconds_until_next_update(&self) -> u64 {
        let last = self.state.read().last_calculation;
        self.seconds_until_next_update_locked(&last)
    }

    fn seconds_until_next_update_locked(&self, last: &Option<DateTime<Utc>>) -> u64 {
        match last {
            None => 0,
            Some(last) => {
                let elapsed = (Utc::now() - *last).num_seconds();
                (self.config.price_update_interval_secs as i64 - elapsed).max(0) as u64
            }
        }
    }

    /// Recalculate if the interval has elapsed; returns whether a new
    /// price was accepted
    pub async fn update_if_needed(
        &self,
        inventory_wh: Option<f64>,
    ) -> Result<bool, AnalysisError> {
        if !self.should_update() {
            return Ok(false);
        }
        match self.recalculate(inventory_wh).await {
            Ok(_) => Ok(true),
            Err(AnalysisError::AlreadyCalculating) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Run one full analysis cycle and return the accepted price (EUR/Wh)
    ///
    /// Single-flight: a call arriving while another analysis runs is
    /// rejected with [`AnalysisError::AlreadyCalculating`], so two cycles
    /// never race on engine state.
    pub async fn recalculate(&self, inventory_wh: Option<f64>) -> Result<f64, AnalysisError> {
        if self.calculating.swap(true, Ordering::SeqCst) {
            return Err(AnalysisError::AlreadyCalculating);
        }
        let outcome = self.run_analysis(inventory_wh).await;
        self.calculating.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_analysis(&self, inventory_wh: Option<f64>) -> Result<f64, AnalysisError> {
        let lookback_hours = self.config.price_history_lookback_hours;
        info!(
            "💰 [PRICE] Starting historical analysis ({}h lookback, inventory: {})",
            lookback_hours,
            inventory_wh.map_or_else(|| "all-history".to_owned(), |wh| format!("{wh:.1} Wh")),
        );

        let end = Utc::now();
        let start = end - Duration::hours(i64::from(lookback_hours) + LOOKBACK_BUFFER_HOURS);
        let series = self.fetch_all_series(start, end).await;

        self.state.write().last_attempt = Some(Utc::now());

        if series.battery.is_empty() {
            warn!("⚠️ [PRICE] No battery power data available, keeping current price");
            return Err(AnalysisError::NoBatteryData);
        }

        debug!(
            "📊 [PRICE] Data points received - battery: {}, pv: {}, grid: {}, load: {}, price: {}",
            series.battery.len(),
            series.pv.len(),
            series.grid.len(),
            series.load.len(),
            series.price.len()
        );

        let convention = self.sticky_convention(&series);

        let events = reconstruct_charging_events(
            &series.battery,
            convention,
            self.config.charging_threshold_w,
        );
        info!("💰 [PRICE] Found {} charging events", events.len());

        if events.is_empty() {
            // Not a failure: record an explicit zero-valued result so
            // callers can tell "nothing charged" from "analysis failed"
            let mut state = self.state.write();
            let held = state.price_eur_per_wh;
            state.last_result = Some(AnalysisResult::empty(held, lookback_hours, Utc::now()));
            state.last_calculation = Some(Utc::now());
            info!("💰 [PRICE] No charging events found, keeping current price");
            return Ok(held);
        }

        let splitter = EnergySourceSplitter::new(
            &series.pv,
            &series.grid,
            &series.load,
            &series.price,
            convention,
            self.config.grid_charge_threshold_w,
        );

        let mut sessions = Vec::with_capacity(events.len());
        for event in &events {
            let totals = splitter.split(event);
            if totals.total_battery_wh <= MIN_SESSION_ENERGY_WH {
                continue;
            }
            sessions.push(Session {
                start_time: event.start_time,
                end_time: event.end_time,
                charged_energy_wh: totals.total_battery_wh,
                charged_from_pv_wh: totals.pv_to_battery_wh,
                charged_from_grid_wh: totals.grid_to_battery_wh,
                // Round-trip losses make grid energy more expensive than
                // the meter says
                cost_eur: totals.grid_cost_eur / self.config.charge_efficiency,
                is_inventory: false,
                inventory_energy_wh: 0.0,
            });
        }

        let window_start = end - Duration::hours(i64::from(lookback_hours));
        let held_price = self.current_price_eur_per_wh();
        let result = aggregate_sessions(
            sessions,
            inventory_wh,
            window_start,
            lookback_hours,
            held_price,
            Utc::now(),
        );

        let price = result.stored_energy_price_eur_per_wh;
        info!(
            "💰 [PRICE] Final price {:.4} EUR/kWh (total charged {:.1} Wh, PV {:.1}%)",
            price * 1000.0,
            result.charged_energy_wh,
            result.pv_ratio_percent
        );

        let mut state = self.state.write();
        state.price_eur_per_wh = price;
        state.last_calculation = Some(Utc::now());
        state.last_result = Some(result);
        Ok(price)
    }

    /// Detect the power convention once and remember it for the engine's
    /// lifetime; `reset_convention` forces a re-detect
    fn sticky_convention(&self, series: &SeriesBundle) -> PowerConvention {
        if let Some(known) = self.state.read().convention {
            return known;
        }
        let detected = detect_power_convention(
            &series.battery,
            &series.pv,
            &series.grid,
            &series.load,
            self.config.charging_threshold_w,
        );
        info!("🔍 [PRICE] Auto-detected battery power convention: {detected}");
        self.state.write().convention = Some(detected);
        detected
    }

    /// Fetch all five signals concurrently, one task per signal, each
    /// bounded by the per-fetch timeout
    ///
    /// Fan-in is deterministic (fixed signal order). A fetch that fails
    /// or times out degrades to an empty series for that signal; the run
    /// continues on partial data.
    async fn fetch_all_series(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> SeriesBundle {
        let timeout = self.config.fetch_timeout();
        debug!(
            "📊 [FETCH] Fetching {} signals for {:.1}h of history",
            SignalKind::REQUIRED.len(),
            (end - start).num_minutes() as f64 / 60.0
        );

        let mut handles = Vec::with_capacity(SignalKind::REQUIRED.len());
        for signal in SignalKind::REQUIRED {
            let source = Arc::clone(&self.source);
            let entity_id = self.config.sensors.entity_for(signal).to_owned();
            handles.push((
                signal,
                tokio::spawn(async move {
                    match tokio::time::timeout(timeout, source.get_history(&entity_id, start, end))
                        .await
                    {
                        Ok(Ok(raw)) => convert_history(signal, raw),
                        Ok(Err(e)) => {
                            warn!("⚠️ [FETCH] Failed to fetch {signal} history: {e:#}");
                            SensorSeries::empty(signal)
                        }
                        Err(_) => {
                            warn!(
                                "⚠️ [FETCH] Timed out fetching {signal} history after {}s",
                                timeout.as_secs()
                            );
                            SensorSeries::empty(signal)
                        }
                    }
                }),
            ));
        }

        let mut bundle = SeriesBundle {
            battery: SensorSeries::empty(SignalKind::BatteryPower),
            pv: SensorSeries::empty(SignalKind::PvPower),
            grid: SensorSeries::empty(SignalKind::GridPower),
            load: SensorSeries::empty(SignalKind::LoadPower),
            price: SensorSeries::empty(SignalKind::SpotPrice),
        };

        for (signal, handle) in handles {
            let series = match handle.await {
                Ok(series) => series,
                Err(e) => {
                    warn!("⚠️ [FETCH] Fetch task for {signal} aborted: {e}");
                    SensorSeries::empty(signal)
                }
            };
            match signal {
                SignalKind::BatteryPower => bundle.battery = series,
                SignalKind::PvPower => bundle.pv = series,
                SignalKind::GridPower => bundle.grid = series,
                SignalKind::LoadPower => bundle.load = series,
                SignalKind::SpotPrice => bundle.price = series,
            }
        }

        bundle
    }

    /// Estimate the energy currently stored above the protected SoC floor
    ///
    /// Reads the latest sample of the configured SoC entity through the
    /// same history contract as everything else. Returns None (all-history
    /// weighting) when no SoC entity is configured or the probe fails.
    pub async fn probe_inventory_wh(&self) -> Option<f64> {
        let entity_id = self.config.sensors.battery_soc.as_deref()?;
        let end = Utc::now();
        let start = end - Duration::hours(SOC_PROBE_HOURS);

        match self.source.get_history(entity_id, start, end).await {
            Ok(raw) => {
                let soc = raw.iter().rev().find_map(|point| parse_state_value(&point.state))?;
                let inventory = self.config.usable_inventory_wh(soc);
                debug!(
                    "🔋 [PRICE] Battery SoC {soc:.1}% → usable inventory {inventory:.0} Wh"
                );
                Some(inventory)
            }
            Err(e) => {
                warn!("⚠️ [PRICE] SoC probe failed, using all-history weighting: {e:#}");
                None
            }
        }
    }
}
