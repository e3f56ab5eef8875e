// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Entity records mirrored in the local store.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::id::is_temp_id;

/// Keys managed by the store rather than by the domain payload.
pub const RESERVED_FIELDS: [&str; 4] = ["id", "synced", "updated_at", "deleted_at"];

/// A business object mirrored locally.
///
/// `fields` holds the domain payload exactly as the remote collaborator
/// shapes it; the store only ever interprets the reserved keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub synced: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Creates a record from domain fields. Reserved keys in `fields` are dropped.
    pub fn new(id: impl Into<String>, fields: Map<String, Value>, synced: bool, now: DateTime<Utc>) -> Self {
        Record {
            id: id.into(),
            fields: strip_reserved(fields),
            synced,
            updated_at: now.trunc_subsecs(3),
            deleted_at: None,
        }
    }

    /// Builds a synced record from a row returned by the remote collaborator.
    ///
    /// The row must be a JSON object carrying an `id` (string or number).
    /// A remote `updated_at`/`deleted_at` given as epoch millis or RFC 3339 is
    /// kept; otherwise the record is stamped with `now`. Timestamps are
    /// truncated to the millisecond precision the store keeps.
    pub fn from_remote(row: Value, now: DateTime<Utc>) -> Result<Self> {
        let Value::Object(mut obj) = row else {
            return Err(Error::RemoteError(format!(
                "expected a JSON object row, got {row}"
            )));
        };

        let id = match obj.remove("id") {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(Error::RemoteError(
                    "remote row is missing an id".to_string(),
                ))
            }
        };
        let updated_at = obj
            .get("updated_at")
            .and_then(parse_timestamp)
            .unwrap_or(now)
            .trunc_subsecs(3);
        let deleted_at = obj
            .get("deleted_at")
            .and_then(parse_timestamp)
            .map(|t| t.trunc_subsecs(3));

        Ok(Record {
            id,
            fields: strip_reserved(obj),
            synced: true,
            updated_at,
            deleted_at,
        })
    }

    /// Returns true while the record still carries a client placeholder id.
    pub fn has_temp_id(&self) -> bool {
        is_temp_id(&self.id)
    }

    /// Looks up a domain field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Shallow-merges `patch` into the domain fields and marks the record
    /// unsynced. Reserved keys in the patch are ignored.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>, now: DateTime<Utc>) {
        for (k, v) in patch {
            if !RESERVED_FIELDS.contains(&k.as_str()) {
                self.fields.insert(k.clone(), v.clone());
            }
        }
        self.synced = false;
        self.updated_at = now.trunc_subsecs(3);
    }

    /// Value of a field as seen by secondary indexes and query filters.
    pub fn index_value(&self, field: &str) -> Value {
        match field {
            "id" => Value::String(self.id.clone()),
            "synced" => Value::Bool(self.synced),
            "updated_at" => Value::from(self.updated_at.timestamp_millis()),
            "deleted_at" => self
                .deleted_at
                .map(|t| Value::from(t.timestamp_millis()))
                .unwrap_or(Value::Null),
            other => self.fields.get(other).cloned().unwrap_or(Value::Null),
        }
    }

    /// Full JSON view of the record, as handed back to callers.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Interprets a JSON value as a payload object.
pub fn as_object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidInput(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn strip_reserved(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_FIELDS {
        fields.remove(key);
    }
    fields
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
