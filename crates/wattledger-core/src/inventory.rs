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

use chrono::{DateTime, Utc};
use tracing::info;

use wattledger_types::{AnalysisResult, Session};

/// Weight sessions by the energy still resident in the battery and fold
/// them into one analysis result
///
/// Pure function of its inputs: sessions are consumed, inventory flags
/// are written on the owned copies during a single backward walk, and the
/// annotated sessions come back inside the result (chronological order).
///
/// With `inventory_wh = Some(target)`, sessions are walked most recent
/// first and consumed until the target is covered: the energy in the
/// battery right now is, most plausibly, whatever charged last. Each
/// touched session contributes proportionally: `cost × used/charged`
/// toward total cost and `used` toward total energy. With `None`, every
/// session participates at full weight.
///
/// Sessions that ended before `window_start` are discarded up front (the
/// fetch deliberately over-reads history so boundary events reconstruct
/// fully). A zero total never divides: the previously held price is
/// carried through unchanged.
pub fn aggregate_sessions(
    mut sessions: Vec<Session>,
    inventory_wh: Option<f64>,
    window_start: DateTime<Utc>,
    lookback_hours: u32,
    held_price_eur_per_wh: f64,
    computed_at: DateTime<Utc>,
) -> AnalysisResult {
    sessions.retain(|session| session.end_time >= window_start);
    sessions.sort_by(|a, b| b.end_time.cmp(&a.end_time));

    let mut accumulated_inventory = 0.0_f64;
    let mut total_cost = 0.0_f64;
    let mut total_energy = 0.0_f64;
    let mut total_pv = 0.0_f64;
    let mut total_grid = 0.0_f64;

    for session in &mut sessions {
        if let Some(target) = inventory_wh {
            if accumulated_inventory < target {
                let remaining_needed = target - accumulated_inventory;
                session.is_inventory = true;
                if session.charged_energy_wh <= remaining_needed {
                    session.inventory_energy_wh = session.charged_energy_wh;
                    accumulated_inventory += session.charged_energy_wh;
                } else {
                    session.inventory_energy_wh = remaining_needed;
                    accumulated_inventory = target;
                }
            }
        }

        if inventory_wh.is_some() && !session.is_inventory {
            continue;
        }
        if session.charged_energy_wh <= 0.0 {
            continue;
        }

        let energy_used = if inventory_wh.is_some() {
            session.inventory_energy_wh
        } else {
            session.charged_energy_wh
        };
        let ratio = energy_used / session.charged_energy_wh;

        total_cost += session.cost_eur * ratio;
        total_energy += energy_used;
        total_pv += session.charged_from_pv_wh * ratio;
        total_grid += session.charged_from_grid_wh * ratio;
    }

    sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));

    let weighted_price = if total_energy > 0.0 {
        total_cost / total_energy
    } else {
        held_price_eur_per_wh
    };
    let pv_ratio = if total_energy > 0.0 {
        total_pv / total_energy * 100.0
    } else {
        0.0
    };

    info!(
        "💰 [AGGREGATE] {:.1} Wh weighted ({:.1} PV / {:.1} grid, PV {:.1}%), cost {:.4} EUR over {} sessions",
        total_energy,
        total_pv,
        total_grid,
        pv_ratio,
        total_cost,
        sessions.len()
    );

    AnalysisResult {
        stored_energy_price_eur_per_wh: weighted_price,
        lookback_hours,
        charged_energy_wh: total_energy,
        charged_from_pv_wh: total_pv,
        charged_from_grid_wh: total_grid,
        pv_ratio_percent: pv_ratio,
        sessions,
        computed_at,
    }
}
