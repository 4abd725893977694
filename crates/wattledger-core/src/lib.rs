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

//! Forensic stored-energy price engine
//!
//! Reconstructs what the energy currently sitting in a home battery cost
//! (EUR/Wh) from historical battery/PV/grid/load power and spot price
//! telemetry: charging events are recovered from noisy power samples,
//! each instant of charging is split between free PV surplus and priced
//! grid import, and the sessions still represented in the battery's
//! inventory are cost-weighted into a single price.

pub mod convention;
pub mod convert;
pub mod engine;
pub mod error;
pub mod events;
pub mod inventory;
pub mod split;
pub mod traits;
pub mod worker;

// Re-export common types for convenience
pub use convention::detect_power_convention;
pub use convert::convert_history;
pub use engine::{EngineStatus, PriceEngine};
pub use error::AnalysisError;
pub use events::reconstruct_charging_events;
pub use inventory::aggregate_sessions;
pub use split::{EnergySourceSplitter, EventTotals, StreamCursor};
pub use traits::{HistoryDataSource, RawHistoryPoint};
pub use worker::spawn_price_worker;

pub use wattledger_types::{
    AnalysisResult, ChargingEvent, PowerConvention, PriceTrackerConfig, Sample, SensorEntities,
    SensorSeries, Session, SignalKind,
};
