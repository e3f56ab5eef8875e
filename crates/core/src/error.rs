// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Error types for fl-core operations.

use thiserror::Error;

/// All possible errors that can occur in fl-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("durable storage unavailable: {0}\n  hint: offline capability is disabled for this session")]
    StorageUnavailable(String),

    #[error("record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("remote error: {0}")]
    RemoteError(String),

    #[error("authentication expired: {0}\n  hint: sign in again, queued changes are kept")]
    AuthExpired(String),

    #[error("corrupt queue entry {id}: {reason}")]
    QueueCorrupt { id: String, reason: String },

    #[error("unknown collection: '{0}'\n  hint: valid collections are: {valid}", valid = crate::collection::Collection::names().join(", "))]
    UnknownCollection(String),

    #[error("unknown index '{index}' on collection '{collection}'")]
    UnknownIndex { collection: String, index: String },

    #[error("queue entry not found: {0}")]
    EntryNotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] on a collection record.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

/// A specialized Result type for fl-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
