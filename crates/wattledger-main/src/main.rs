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

mod config;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use wattledger_core::{PriceEngine, spawn_price_worker};
use wattledger_ha::{HaHistorySource, HomeAssistantClient};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Handle command line arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" => {
                println!("WattLedger - Stored Battery Energy Price Tracker");
                println!("Version: {VERSION}");
                println!();
                println!("Usage: wattledger [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help    Print this help message");
                println!("  -v, --version Print version");
                return Ok(());
            }
            "--version" | "-v" => {
                println!("{VERSION}");
                return Ok(());
            }
            _ => {
                // Continue to normal execution for unknown args
            }
        }
    }

    // Initialize tracing with env filter support
    // Respects RUST_LOG environment variable
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let app_config = config::load_config()?;

    info!("🚀 Starting WattLedger v{VERSION}");
    info!("📋 Configuration summary:");
    info!(
        "   Price calculation: {}",
        if app_config.price_tracker.price_calculation_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    info!(
        "   Update interval: {}s, lookback: {}h",
        app_config.price_tracker.price_update_interval_secs,
        app_config.price_tracker.price_history_lookback_hours
    );
    info!(
        "   Battery: {:.0} Wh capacity, {:.0}% SoC floor, efficiency {:.2}",
        app_config.price_tracker.capacity_wh,
        app_config.price_tracker.min_soc_percentage,
        app_config.price_tracker.charge_efficiency
    );

    let client = match (
        app_config.homeassistant.base_url.clone(),
        app_config.homeassistant.token.clone(),
    ) {
        (None, None) if std::env::var("SUPERVISOR_TOKEN").is_ok() => {
            HomeAssistantClient::from_supervisor()?
        }
        (base_url, token) => HomeAssistantClient::from_config(base_url, token)?,
    };
    let source = Arc::new(HaHistorySource::new(Arc::new(client)));

    let engine = Arc::new(PriceEngine::new(app_config.price_tracker, source)?);
    let updates = spawn_price_worker(Arc::clone(&engine));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("👋 Shutting down");
                break;
            }
            () = tokio::time::sleep(Duration::from_secs(5)) => {
                while let Ok(result) = updates.try_recv() {
                    info!(
                        "💰 Stored energy price: {:.4} EUR/kWh ({:.1} Wh charged, PV {:.1}%, {} sessions)",
                        result.stored_energy_price_eur_per_wh * 1000.0,
                        result.charged_energy_wh,
                        result.pv_ratio_percent,
                        result.sessions.len()
                    );
                }
            }
        }
    }

    Ok(())
}
