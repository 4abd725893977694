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

use crossbeam_channel::Receiver;
use futures_timer::Delay;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::PriceEngine;
use wattledger_types::AnalysisResult;

/// Upper bound on the worker's poll tick so interval changes and missed
/// updates are noticed promptly
const MAX_TICK_SECS: u64 = 60;

/// Spawn the periodic price recompute worker
///
/// The worker wakes at most every minute, checks the engine's update
/// interval, probes the battery SoC for the current inventory when
/// configured, and runs the single-flight recompute. Every accepted
/// analysis is pushed into the returned bounded channel; consumers drain
/// it with `try_recv` and never block the worker (when the channel is
/// full the update is dropped, the engine state still holds it). All
/// cycle errors are logged and swallowed; the worker never dies and the
/// last-known-good price stays readable throughout.
pub fn spawn_price_worker(engine: Arc<PriceEngine>) -> Receiver<AnalysisResult> {
    let (tx, rx) = crossbeam_channel::bounded::<AnalysisResult>(10);

    tokio::spawn(async move {
        if !engine.config().price_calculation_enabled {
            info!("💰 Price worker idle: dynamic price calculation is disabled");
            return;
        }

        info!("💰 Price worker started");
        let tick = Duration::from_secs(engine.config().price_update_interval_secs.min(MAX_TICK_SECS));

        loop {
            if engine.should_update() {
                let inventory_wh = engine.probe_inventory_wh().await;
                match engine.update_if_needed(inventory_wh).await {
                    Ok(true) => {
                        if let Some(result) = engine.last_result() {
                            if tx.try_send(result).is_err() {
                                debug!("analysis channel full, dropping update");
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("❌ Price recalculation failed: {e}");
                    }
                }
            }

            Delay::new(tick).await;
        }
    });

    rx
}
