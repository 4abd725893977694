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

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::client::HomeAssistantClient;
use wattledger_core::{HistoryDataSource, RawHistoryPoint};

/// Home Assistant adapter implementing the engine's history contract
#[derive(Debug)]
pub struct HaHistorySource {
    client: Arc<HomeAssistantClient>,
}

impl HaHistorySource {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }

    /// Get reference to the underlying HA client
    pub fn client(&self) -> &Arc<HomeAssistantClient> {
        &self.client
    }
}

#[async_trait]
impl HistoryDataSource for HaHistorySource {
    async fn get_history(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawHistoryPoint>> {
        debug!("📊 [ADAPTER] History query for {}", entity_id);
        self.client
            .get_history(entity_id, start, Some(end))
            .await
            .with_context(|| format!("Failed to fetch history for entity: {}", entity_id))
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.ping().await.map_err(|e| anyhow::anyhow!(e))
    }

    fn name(&self) -> &str {
        "HomeAssistant"
    }
}
