// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Client-side identifiers.
//!
//! Records created while offline get a Temp ID that stands in for the server
//! id until the record's create operation is confirmed remotely.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Reserved prefix that marks a Temp ID.
pub const TEMP_ID_PREFIX: &str = "temp_";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TEMP_SUFFIX_LEN: usize = 9;

/// Generate a Temp ID.
/// Format: `temp_{unix_millis}_{9 random base36 chars}`
pub fn generate_temp_id(now: &DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TEMP_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}_{}", TEMP_ID_PREFIX, now.timestamp_millis(), suffix)
}

/// Returns true if the id is a client-generated placeholder.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Generate a sync queue entry id (time-ordered UUID).
pub fn generate_entry_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
