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

use crate::errors::{HaError, HaResult};
use crate::types::HaHistoryState;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use wattledger_core::RawHistoryPoint;

/// Home Assistant REST API client, scoped to the history surface the
/// price engine needs
#[derive(Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for HomeAssistantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HomeAssistantClient {
    /// Create a new HA client with custom configuration
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> HaResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HaError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            token: token.into(),
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Create HA client using Supervisor API environment variables
    /// This is the standard method for HA addons
    pub fn from_supervisor() -> HaResult<Self> {
        let base_url = "http://supervisor/core";
        let token = std::env::var("SUPERVISOR_TOKEN").map_err(|_| {
            HaError::ConfigError(
                "SUPERVISOR_TOKEN environment variable not set. Are you running as an HA addon?"
                    .to_string(),
            )
        })?;

        info!("Initializing HA client using Supervisor API");
        Self::new(base_url, token)
    }

    /// Create HA client for development/testing with custom URL
    pub fn from_env() -> HaResult<Self> {
        let base_url =
            std::env::var("HA_BASE_URL").unwrap_or_else(|_| "http://localhost:8123".to_string());
        let token = std::env::var("HA_TOKEN").map_err(|_| {
            HaError::ConfigError("HA_TOKEN environment variable not set".to_string())
        })?;

        info!("Initializing HA client for development: {}", base_url);
        Self::new(base_url, token)
    }

    /// Create HA client from configuration values
    /// Falls back to environment variables if config values are not set
    pub fn from_config(ha_base_url: Option<String>, ha_token: Option<String>) -> HaResult<Self> {
        let base_url = ha_base_url
            .or_else(|| std::env::var("HA_BASE_URL").ok())
            .unwrap_or_else(|| "http://localhost:8123".to_string());

        let token = ha_token
            .or_else(|| std::env::var("HA_TOKEN").ok())
            .ok_or_else(|| {
                HaError::ConfigError(
                    "HA token not found in config or HA_TOKEN environment variable".to_string(),
                )
            })?;

        info!("Initializing HA client from configuration: {}", base_url);
        Self::new(base_url, token)
    }

    /// Health check - ping HA API
    pub async fn ping(&self) -> HaResult<bool> {
        let url = format!("{}/api/", self.base_url);
        debug!("Performing health check");

        match self.client.get(&url).bearer_auth(&self.token).send().await {
            Ok(response) => {
                let is_ok = response.status().is_success();
                if is_ok {
                    debug!("Health check passed");
                } else {
                    warn!("Health check failed: status {}", response.status());
                }
                Ok(is_ok)
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                Ok(false) // Don't error on health check failure
            }
        }
    }

    /// Get historical states for a sensor entity
    ///
    /// # Arguments
    /// * `entity_id` - Entity ID to fetch history for (e.g., "sensor.solax_battery_power")
    /// * `start_time` - Start of the time range
    /// * `end_time` - Optional end of the time range (defaults to now)
    ///
    /// # Returns
    /// Raw (timestamp, state-string) points in time order. States are not
    /// parsed here: the engine's conversion step owns numeric parsing,
    /// unit tolerance and price scaling.
    pub async fn get_history(
        &self,
        entity_id: &str,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> HaResult<Vec<RawHistoryPoint>> {
        let end = end_time.unwrap_or_else(Utc::now);

        // HA history API expects ISO 8601 timestamps
        // Format: /api/history/period/{start}?filter_entity_id={entity}&end_time={end}
        let start_str = start_time.to_rfc3339();
        let end_str = end.to_rfc3339();
        let end_encoded = urlencoding::encode(&end_str);

        let url = format!(
            "{}/api/history/period/{}?filter_entity_id={}&end_time={}",
            self.base_url, start_str, entity_id, end_encoded
        );

        debug!("📊 [HA HISTORY] Fetching history for: {}", entity_id);
        debug!("   Time range: {} to {}", start_str, end_str);

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => {
                // HA returns an array of arrays, one inner array per entity
                let history: Vec<Vec<HaHistoryState>> = response.json().await?;

                let Some(entity_history) = history.first() else {
                    debug!("⚠️ [HA HISTORY] No history data returned for {}", entity_id);
                    return Ok(Vec::new());
                };

                let mut points = Vec::with_capacity(entity_history.len());
                for state in entity_history {
                    match DateTime::parse_from_rfc3339(&state.last_updated) {
                        Ok(timestamp) => points.push(RawHistoryPoint {
                            timestamp: timestamp.with_timezone(&Utc),
                            state: state.state.clone(),
                        }),
                        Err(_) => {
                            trace!("Could not parse timestamp: {}", state.last_updated);
                        }
                    }
                }

                info!(
                    "✅ [HA HISTORY] Retrieved {} data points for {}",
                    points.len(),
                    entity_id
                );
                Ok(points)
            }
            StatusCode::NOT_FOUND => {
                error!("❌ [HA HISTORY] Entity not found: {}", entity_id);
                Err(HaError::EntityNotFound(entity_id.to_string()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [HA HISTORY] Authentication failed for: {}", entity_id);
                Err(HaError::AuthenticationFailed)
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                error!("❌ [HA HISTORY] Status {}: {}", status, error_text);
                Err(HaError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> HaResult<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    error!("Request failed after {} attempts: {}", attempts, e);
                    return Err(HaError::HttpError(e));
                }
                Err(e) => {
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2; // Exponential backoff
                }
            }
        }
    }

    /// Set custom retry configuration
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;

    fn history_body() -> String {
        json!([[
            {
                "entity_id": "sensor.battery_power",
                "state": "3000",
                "attributes": {},
                "last_changed": "2025-10-02T10:00:00+00:00",
                "last_updated": "2025-10-02T10:00:00+00:00"
            },
            {
                "entity_id": "sensor.battery_power",
                "state": "unavailable",
                "attributes": {},
                "last_changed": "2025-10-02T10:05:00+00:00",
                "last_updated": "2025-10-02T10:05:00+00:00"
            },
            {
                "entity_id": "sensor.battery_power",
                "state": "2950.5 W",
                "attributes": {},
                "last_changed": "2025-10-02T10:10:00+00:00",
                "last_updated": "2025-10-02T10:10:00+00:00"
            }
        ]])
        .to_string()
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-10-02T09:00:00+00:00")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_get_history_passes_states_through_raw() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex("/api/history/period/.*".to_string()))
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(history_body())
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let points = client
            .get_history("sensor.battery_power", start(), None)
            .await
            .unwrap();

        // All three entries come back, including the non-numeric one:
        // parsing is the engine's concern, not the transport's
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].state, "3000");
        assert_eq!(points[1].state, "unavailable");
        assert_eq!(points[2].state, "2950.5 W");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_history_empty_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex("/api/history/period/.*".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let points = client
            .get_history("sensor.battery_power", start(), None)
            .await
            .unwrap();

        assert!(points.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_history_not_found() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex("/api/history/period/.*".to_string()))
            .with_status(404)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client.get_history("sensor.nonexistent", start(), None).await;

        assert!(matches!(result, Err(HaError::EntityNotFound(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_history_auth_failure() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex("/api/history/period/.*".to_string()))
            .with_status(401)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "bad_token").unwrap();
        let result = client.get_history("sensor.battery_power", start(), None).await;

        assert!(matches!(result, Err(HaError::AuthenticationFailed)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ping_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        assert!(client.ping().await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ping_unreachable_is_false_not_error() {
        let client = HomeAssistantClient::new("http://127.0.0.1:1", "test_token").unwrap();
        assert!(!client.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_retry_logic() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex("/api/history/period/.*".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .expect_at_least(1)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token")
            .unwrap()
            .with_retry_config(3, Duration::from_millis(10));

        let result = client.get_history("sensor.battery_power", start(), None).await;
        assert!(result.is_ok());
        mock.assert_async().await;
    }
}
