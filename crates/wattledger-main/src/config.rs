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
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use wattledger_types::PriceTrackerConfig;

const DEFAULT_CONFIG_PATH: &str = "wattledger.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Home Assistant connection settings
    #[serde(default)]
    pub homeassistant: HomeAssistantConfig,

    /// Stored-energy price tracker settings
    #[serde(default)]
    pub price_tracker: PriceTrackerConfig,
}

/// Home Assistant connection settings
///
/// Both values fall back to environment variables (HA_BASE_URL /
/// HA_TOKEN) or the Supervisor API when running as an addon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomeAssistantConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub token: Option<String>,
}

/// Load configuration from WATTLEDGER_CONFIG or ./wattledger.toml
pub fn load_config() -> Result<AppConfig> {
    let path = std::env::var("WATTLEDGER_CONFIG")
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config_from(Path::new(&path))
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        info!(
            "No config file at {}, starting with defaults",
            path.display()
        );
        return Ok(AppConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: AppConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[homeassistant]
base_url = "http://homeassistant.local:8123"
token = "secret"

[price_tracker]
price_calculation_enabled = true
price_update_interval_secs = 600
price_history_lookback_hours = 72

[price_tracker.sensors]
battery_power = "sensor.solax_battery_power"
pv_power = "sensor.solax_pv_power_total"
grid_power = "sensor.solax_grid_power"
load_power = "sensor.solax_house_load"
price = "sensor.current_spot_electricity_price"
battery_soc = "sensor.solax_battery_capacity"
"#
        )
        .expect("write config");

        let config = load_config_from(file.path()).expect("load");
        assert_eq!(
            config.homeassistant.base_url.as_deref(),
            Some("http://homeassistant.local:8123")
        );
        assert!(config.price_tracker.price_calculation_enabled);
        assert_eq!(config.price_tracker.price_update_interval_secs, 600);
        assert_eq!(config.price_tracker.price_history_lookback_hours, 72);
        assert_eq!(
            config.price_tracker.sensors.battery_soc.as_deref(),
            Some("sensor.solax_battery_capacity")
        );
        assert!(config.price_tracker.validate().is_ok());
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "[homeassistant]\n").expect("write config");

        let config = load_config_from(file.path()).expect("load");
        assert!(!config.price_tracker.price_calculation_enabled);
        assert_eq!(config.price_tracker.price_update_interval_secs, 900);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config_from(Path::new("/nonexistent/wattledger.toml")).expect("load");
        assert!(config.homeassistant.base_url.is_none());
    }

    #[test]
    fn test_malformed_file_errors() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not toml at all [").expect("write config");
        assert!(load_config_from(file.path()).is_err());
    }
}
