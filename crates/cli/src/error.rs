// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the `fieldline` command line.
#[derive(Debug, Error)]
pub enum Error {
    #[error("already initialized: {}\n  hint: edit the file or pass --config to use another one", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("local store unavailable: {0}\n  hint: check the `database` path in the config file")]
    StoreUnavailable(String),

    #[error("drain stopped: {0}\n  hint: queued changes are kept, refresh the api key and run drain again")]
    DrainAborted(String),

    #[error(transparent)]
    Sync(#[from] fl_sync::SyncError),

    #[error(transparent)]
    Core(#[from] fl_core::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for CLI commands.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
