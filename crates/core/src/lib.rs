// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! fl-core: local persistence for the Fieldline offline-first sync core.
//!
//! This crate provides the collection registry, the durable record store and
//! the sync queue that share one SQLite database. Everything network-facing
//! lives in `fl-sync`.

pub mod collection;
pub mod error;
pub mod id;
pub mod queue;
pub mod record;
pub mod store;

pub use collection::{Collection, IndexSpec, SCHEMA_VERSION};
pub use error::{Error, Result};
pub use id::{generate_entry_id, generate_temp_id, is_temp_id, TEMP_ID_PREFIX};
pub use queue::{CorruptEntry, EntryState, OpKind, PendingBatch, QueueCounts, QueueEntry, SyncQueue};
pub use record::Record;
pub use store::{IndexScan, ScanCursor, ScanRange, Store};
