// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Error types for fl-sync operations.

use thiserror::Error;

/// Errors raised while wiring up or driving synchronisation.
///
/// Per-entry dispatch failures are not errors at this level; they are
/// reported through a drain report instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Core(#[from] fl_core::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no remote configured\n  hint: add a [remote] section with a url to the config file")]
    NoRemote,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for fl-sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
