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
use tracing::debug;

use wattledger_types::{ChargingEvent, PowerConvention, Sample, SensorSeries};

/// A gap of this many seconds or more between samples closes the open
/// charging event; shorter dropouts are bridged
pub const MAX_EVENT_GAP_SECS: i64 = 600;

/// A charging event that is still being extended
struct OpenEvent {
    event: ChargingEvent,
    /// Timestamp of the last sample that was above the charging threshold
    last_above: DateTime<Utc>,
}

impl OpenEvent {
    fn start(point: &Sample) -> Self {
        Self {
            event: ChargingEvent {
                start_time: point.timestamp,
                end_time: point.timestamp,
                points: vec![point.clone()],
            },
            last_above: point.timestamp,
        }
    }
}

/// Group battery power samples into discrete charging events
///
/// Samples are walked in time order with power normalized by the detected
/// convention. An event opens on the first above-threshold sample and is
/// extended by any sample arriving within the gap tolerance, including
/// sub-threshold samples, so one physical charge does not fragment over
/// brief sensor noise. On close, trailing sub-threshold samples are
/// trimmed so event boundaries cover only the active charging window.
pub fn reconstruct_charging_events(
    battery: &SensorSeries,
    convention: PowerConvention,
    charging_threshold_w: f64,
) -> Vec<ChargingEvent> {
    let mut events = Vec::new();
    let mut current: Option<OpenEvent> = None;

    for point in battery.samples() {
        let above = convention.normalize(point.value) > charging_threshold_w;

        if let Some(open) = current.as_mut() {
            let gap = (point.timestamp - open.last_above).num_seconds();
            if gap < MAX_EVENT_GAP_SECS {
                open.event.end_time = point.timestamp;
                open.event.points.push(point.clone());
                if above {
                    open.last_above = point.timestamp;
                }
                continue;
            }
        } else if !above {
            continue;
        }

        // Either the gap bound closed the open event, or a fresh charge
        // is starting with no event open
        if let Some(open) = current.take() {
            close_event(open.event, convention, charging_threshold_w, &mut events);
        }
        if above {
            current = Some(OpenEvent::start(point));
        }
    }

    if let Some(open) = current.take() {
        close_event(open.event, convention, charging_threshold_w, &mut events);
    }

    debug!(
        "🔋 [EVENTS] reconstructed {} charging events from {} battery samples",
        events.len(),
        battery.len()
    );
    events
}

/// Trim the sub-threshold tail and keep the event if anything remains
fn close_event(
    mut event: ChargingEvent,
    convention: PowerConvention,
    charging_threshold_w: f64,
    events: &mut Vec<ChargingEvent>,
) {
    while let Some(last) = event.points.last() {
        if convention.normalize(last.value) <= charging_threshold_w {
            event.points.pop();
        } else {
            break;
        }
    }

    if let Some(last) = event.points.last() {
        event.end_time = last.timestamp;
        events.push(event);
    }
}
