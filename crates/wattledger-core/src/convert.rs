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

use tracing::trace;

use crate::traits::RawHistoryPoint;
use wattledger_types::{Sample, SensorSeries, SignalKind};

/// Parse a state string into a finite float
///
/// Takes the leading whitespace-separated token, so unit-suffixed states
/// like "10.5 W" parse as 10.5. Returns None for "unknown",
/// "unavailable" and anything else that is not a finite number.
pub fn parse_state_value(state: &str) -> Option<f64> {
    state
        .split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Convert raw history entries into a sorted sensor series
///
/// Unparsable states are dropped, never coerced to zero. Price values
/// above 1.0 are assumed to be minor-currency-per-kWh (ct/kWh) and are
/// scaled down to EUR/kWh.
pub fn convert_history(signal: SignalKind, raw: Vec<RawHistoryPoint>) -> SensorSeries {
    let mut samples = Vec::with_capacity(raw.len());
    for point in raw {
        let Some(mut value) = parse_state_value(&point.state) else {
            trace!("skipping non-numeric {signal} state: {}", point.state);
            continue;
        };
        if signal.is_price() && value > 1.0 {
            value /= 100.0;
        }
        samples.push(Sample::new(point.timestamp, value));
    }
    SensorSeries::new(signal, samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn raw(state: &str) -> RawHistoryPoint {
        RawHistoryPoint {
            timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("valid timestamp"),
            state: state.to_owned(),
        }
    }

    #[test]
    fn test_parse_tolerates_unit_suffix() {
        assert_eq!(parse_state_value("10.5 W"), Some(10.5));
        assert_eq!(parse_state_value("-230"), Some(-230.0));
        assert_eq!(parse_state_value("0.25"), Some(0.25));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_state_value("unavailable"), None);
        assert_eq!(parse_state_value("unknown"), None);
        assert_eq!(parse_state_value(""), None);
        assert_eq!(parse_state_value("NaN"), None);
    }

    #[test]
    fn test_convert_drops_unparsable_entries() {
        let series = convert_history(
            SignalKind::BatteryPower,
            vec![raw("3000"), raw("unavailable"), raw("2950.5 W")],
        );
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_price_auto_scaling() {
        // 25.5 ct/kWh scales down, 0.25 EUR/kWh passes through
        let series = convert_history(SignalKind::SpotPrice, vec![raw("25.5"), raw("0.25")]);
        let values: Vec<f64> = series.samples().iter().map(|s| s.value).collect();
        assert!(values.contains(&0.255));
        assert!(values.contains(&0.25));
    }

    #[test]
    fn test_power_values_never_scaled() {
        let series = convert_history(SignalKind::GridPower, vec![raw("3500")]);
        assert_eq!(series.samples()[0].value, 3500.0);
    }
}
