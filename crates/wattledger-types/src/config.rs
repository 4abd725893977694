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

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::series::SignalKind;

/// Home Assistant entity ids for the signals an analysis run consumes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorEntities {
    /// Battery power sensor (e.g., "sensor.solax_battery_power_charge")
    #[serde(default)]
    pub battery_power: String,

    /// Total PV production sensor
    #[serde(default)]
    pub pv_power: String,

    /// Grid power sensor (import/export)
    #[serde(default)]
    pub grid_power: String,

    /// House load sensor
    #[serde(default)]
    pub load_power: String,

    /// Spot price sensor (EUR/kWh, or ct/kWh which is auto-scaled)
    #[serde(default)]
    pub price: String,

    /// Optional battery SoC sensor used to derive the stored-energy
    /// inventory; unset means all-history weighting
    #[serde(default)]
    pub battery_soc: Option<String>,
}

impl SensorEntities {
    /// Entity id configured for a required signal
    pub fn entity_for(&self, signal: SignalKind) -> &str {
        match signal {
            SignalKind::BatteryPower => &self.battery_power,
            SignalKind::PvPower => &self.pv_power,
            SignalKind::GridPower => &self.grid_power,
            SignalKind::LoadPower => &self.load_power,
            SignalKind::SpotPrice => &self.price,
        }
    }

    /// Keys of required signals that have no entity configured
    pub fn missing(&self) -> Vec<&'static str> {
        SignalKind::REQUIRED
            .into_iter()
            .filter(|signal| self.entity_for(*signal).is_empty())
            .map(SignalKind::key)
            .collect()
    }
}

/// Configuration for the stored-energy price tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTrackerConfig {
    /// Master switch for the periodic price calculation
    #[serde(default)]
    pub price_calculation_enabled: bool,

    /// Seconds between recalculations
    #[serde(default = "default_update_interval_secs")]
    pub price_update_interval_secs: u64,

    /// How far back the analysis looks (hours)
    #[serde(default = "default_lookback_hours")]
    pub price_history_lookback_hours: u32,

    /// Normalized battery power above this counts as charging (W)
    #[serde(default = "default_charging_threshold_w")]
    pub charging_threshold_w: f64,

    /// Grid surplus must exceed this before it is attributed to battery
    /// charging, filtering small export/metering noise (W)
    #[serde(default = "default_grid_charge_threshold_w")]
    pub grid_charge_threshold_w: f64,

    /// Round-trip charge efficiency (0..1), applied as a divisor on grid
    /// cost so losses are paid for
    #[serde(default = "default_charge_efficiency")]
    pub charge_efficiency: f64,

    /// Usable battery capacity (Wh)
    #[serde(default = "default_capacity_wh")]
    pub capacity_wh: f64,

    /// SoC floor the inverter will not discharge below (%)
    #[serde(default = "default_min_soc_percentage")]
    pub min_soc_percentage: f64,

    /// Seed price reported before the first successful analysis (EUR/Wh)
    #[serde(default = "default_baseline_price_eur_per_wh")]
    pub baseline_price_eur_per_wh: f64,

    /// Per-signal history fetch timeout (seconds)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Entity ids for the required signals
    #[serde(default)]
    pub sensors: SensorEntities,
}

fn default_update_interval_secs() -> u64 {
    900
}

fn default_lookback_hours() -> u32 {
    48
}

fn default_charging_threshold_w() -> f64 {
    50.0
}

fn default_grid_charge_threshold_w() -> f64 {
    100.0
}

fn default_charge_efficiency() -> f64 {
    0.95
}

fn default_capacity_wh() -> f64 {
    10_000.0
}

fn default_min_soc_percentage() -> f64 {
    10.0
}

fn default_baseline_price_eur_per_wh() -> f64 {
    4.0e-5
}

fn default_fetch_timeout_secs() -> u64 {
    120
}

impl Default for PriceTrackerConfig {
    fn default() -> Self {
        Self {
            price_calculation_enabled: false,
            price_update_interval_secs: default_update_interval_secs(),
            price_history_lookback_hours: default_lookback_hours(),
            charging_threshold_w: default_charging_threshold_w(),
            grid_charge_threshold_w: default_grid_charge_threshold_w(),
            charge_efficiency: default_charge_efficiency(),
            capacity_wh: default_capacity_wh(),
            min_soc_percentage: default_min_soc_percentage(),
            baseline_price_eur_per_wh: default_baseline_price_eur_per_wh(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            sensors: SensorEntities::default(),
        }
    }
}

impl PriceTrackerConfig {
    /// Check that every required sensor entity is configured
    pub fn validate(&self) -> Result<(), String> {
        let missing = self.sensors.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing required sensors: {}", missing.join(", ")))
        }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.price_update_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Stored energy above the protected SoC floor for a given SoC reading
    pub fn usable_inventory_wh(&self, soc_percent: f64) -> f64 {
        let usable_percent = (soc_percent - self.min_soc_percentage).clamp(0.0, 100.0);
        self.capacity_wh * usable_percent / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> PriceTrackerConfig {
        PriceTrackerConfig {
            price_calculation_enabled: true,
            sensors: SensorEntities {
                battery_power: "sensor.battery_power".into(),
                pv_power: "sensor.pv_power".into(),
                grid_power: "sensor.grid_power".into(),
                load_power: "sensor.load_power".into(),
                price: "sensor.price".into(),
                battery_soc: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_accepts_complete_sensor_set() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_validate_lists_every_missing_sensor() {
        let mut config = configured();
        config.sensors.grid_power.clear();
        config.sensors.price.clear();

        let err = config.validate().expect_err("validation must fail");
        assert!(err.contains("grid_power"));
        assert!(err.contains("price"));
        assert!(!err.contains("battery_power"));
    }

    #[test]
    fn test_usable_inventory_respects_soc_floor() {
        let config = configured();
        // 10% floor on a 10 kWh pack
        assert_eq!(config.usable_inventory_wh(60.0), 5000.0);
        assert_eq!(config.usable_inventory_wh(10.0), 0.0);
        assert_eq!(config.usable_inventory_wh(5.0), 0.0);
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = PriceTrackerConfig::default();
        assert_eq!(config.price_update_interval_secs, 900);
        assert_eq!(config.price_history_lookback_hours, 48);
        assert_eq!(config.charging_threshold_w, 50.0);
        assert_eq!(config.grid_charge_threshold_w, 100.0);
        assert!(!config.price_calculation_enabled);
    }
}
