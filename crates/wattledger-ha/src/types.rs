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

/// One state entry from the HA `/api/history/period` endpoint
///
/// Only the fields the price engine consumes; HA sends more (attributes,
/// last_changed) which serde ignores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaHistoryState {
    /// Raw state string ("3000", "10.5 W", "unavailable", ...)
    pub state: String,
    /// RFC 3339 timestamp of the reading
    pub last_updated: String,
}
