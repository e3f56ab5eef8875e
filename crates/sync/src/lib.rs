// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! fl-sync: connectivity-driven reconciliation for Fieldline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Business   │────►│ DataAccess  │────►│   Remote    │
//! │   caller    │◄────│  (facade)   │◄────│   (trait)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                        │      ▲                ▲
//!                        ▼      │                │
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │ Store+Queue │◄────│ SyncContext │◄── ConnectivityMonitor
//!                     │  (fl-core)  │     │  (drain)    │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! - Offline mutations land in the store and the durable queue
//! - The monitor broadcasts online/foreground transitions
//! - The context drains the queue in order and remaps Temp IDs
//! - Injectable remote trait for testing

pub mod config;
pub mod connectivity;
pub mod error;
pub mod facade;
pub mod query;
pub mod reconciler;
pub mod remote;

pub use config::{default_config_path, Config, RemoteConfig, SyncSettings};
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor, SyncStatus};
pub use error::{Result, SyncError};
pub use facade::{DataAccess, Outcome};
pub use query::{OrderBy, Query};
pub use reconciler::{evict_stale, DrainReport, EvictionReport, SyncContext};
pub use remote::{HttpRemote, Remote, RemoteError, RemoteErrorKind, RemoteFuture, RemoteResult};

#[cfg(test)]
mod test_helpers;
