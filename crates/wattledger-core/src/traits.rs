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

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw history entry as delivered by the telemetry backend
///
/// The state is kept as the backend's string form; parsing to a number
/// (including unit-suffix tolerance and price scaling) happens in the
/// engine's conversion step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub state: String,
}

/// Source of historical per-entity samples
///
/// The engine never knows where history comes from; adapters implement
/// this over Home Assistant or any other recorder.
#[async_trait]
pub trait HistoryDataSource: Send + Sync {
    /// Fetch history for one entity over a time range, ordered by time
    async fn get_history(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawHistoryPoint>>;

    /// Check if the data source is available
    async fn health_check(&self) -> Result<bool>;

    /// Get data source name for logging
    fn name(&self) -> &str;
}
