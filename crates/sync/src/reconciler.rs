// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Reconciliation engine.
//!
//! [`SyncContext`] owns everything one installation needs to reconcile:
//! the store, the queue view over it, the remote collaborator, the
//! connectivity monitor and the tunables. It is constructed once per
//! process and passed explicitly; several isolated contexts may coexist.
//!
//! # Drain
//!
//! Pending entries are dispatched one at a time in queue order. A create
//! is sent without its Temp ID, which travels as the idempotency key
//! instead; on success the record is remapped to the server id. An update
//! or delete still addressed to a Temp ID waits for its create. A retryable
//! failure holds back later entries of the same record for the rest of the
//! pass, while other records keep going. An expired session ends the pass
//! without charging a retry.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use fl_core::record::as_object;
use fl_core::{Collection, EntryState, Error, OpKind, QueueEntry, Record, ScanRange, Store, SyncQueue};

use crate::config::{Config, SyncSettings};
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::error::Result;
use crate::remote::{Remote, RemoteError, RemoteErrorKind};

/// Outcome of one drain pass.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub success_count: usize,
    pub failed_count: usize,
    /// Another drain was already running, nothing was attempted.
    pub skipped: bool,
    /// The pass stopped early because the session expired.
    pub aborted: bool,
    pub errors: Vec<Error>,
}

impl DrainReport {
    fn skipped() -> Self {
        DrainReport {
            skipped: true,
            ..DrainReport::default()
        }
    }
}

/// Outcome of an eviction sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionReport {
    /// Records untouched since this instant were candidates.
    pub cutoff: DateTime<Utc>,
    pub evicted: BTreeMap<Collection, usize>,
    /// Candidates kept because they still carry local changes.
    pub retained_unsynced: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.evicted.values().sum()
    }
}

/// Resets the single-flight flag when a drain ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum DispatchError {
    /// The remote refused or could not be reached.
    Remote(RemoteError),
    /// The entry cannot be sent as stored.
    Invalid(Error),
    /// The remote accepted the change but mirroring it locally failed.
    Local(Error),
}

/// Explicit reconciliation context for one installation.
pub struct SyncContext {
    store: Option<Store>,
    queue: Option<SyncQueue>,
    remote: Arc<dyn Remote>,
    monitor: ConnectivityMonitor,
    settings: SyncSettings,
    draining: AtomicBool,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("store", &self.store)
            .field("settings", &self.settings)
            .field("status", &self.monitor.status())
            .finish()
    }
}

impl SyncContext {
    /// Assemble a context. `store` is `None` when durable storage could not
    /// be opened; the context then works online-only.
    pub fn new(
        store: Option<Store>,
        remote: Arc<dyn Remote>,
        monitor: ConnectivityMonitor,
        settings: SyncSettings,
    ) -> Self {
        let queue = store.clone().map(SyncQueue::new);
        SyncContext {
            store,
            queue,
            remote,
            monitor,
            settings,
            draining: AtomicBool::new(false),
        }
    }

    /// Open the configured store and assemble a context around it.
    ///
    /// An unavailable store disables offline capability instead of failing.
    pub async fn open(
        config: &Config,
        remote: Arc<dyn Remote>,
        monitor: ConnectivityMonitor,
    ) -> Result<Self> {
        let store = match Store::open(&config.database).await {
            Ok(store) => Some(store),
            Err(Error::StorageUnavailable(reason)) => {
                tracing::warn!(%reason, "durable storage unavailable, running online-only");
                None
            }
            Err(e) => return Err(e.into()),
        };
        let ctx = Self::new(store, remote, monitor, config.sync);
        ctx.refresh_pending().await;
        Ok(ctx)
    }

    pub fn store(&self) -> Option<&Store> {
        self.store.as_ref()
    }

    pub fn queue(&self) -> Option<&SyncQueue> {
        self.queue.as_ref()
    }

    pub fn remote(&self) -> &dyn Remote {
        self.remote.as_ref()
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub(crate) fn require_store(&self) -> fl_core::Result<(&Store, &SyncQueue)> {
        match (&self.store, &self.queue) {
            (Some(store), Some(queue)) => Ok((store, queue)),
            _ => Err(Error::StorageUnavailable(
                "offline storage is not available".to_string(),
            )),
        }
    }

    /// Publish the current queue length on the monitor.
    pub async fn refresh_pending(&self) {
        let Some(queue) = &self.queue else {
            return;
        };
        match queue.len().await {
            Ok(n) => self.monitor.set_pending(n),
            Err(e) => tracing::warn!(error = %e, "failed to count queue entries"),
        }
    }

    /// Drain the queue against the remote.
    ///
    /// Single-flight: a call made while another drain runs returns at once
    /// with `skipped` set. A report is always returned, even when the pass
    /// fails part way.
    pub async fn drain(&self) -> DrainReport {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("drain already in progress");
            return DrainReport::skipped();
        }
        let _guard = DrainGuard(&self.draining);

        self.monitor.set_syncing(true);
        let report = self.drain_pass().await;

        let pending = match &self.queue {
            Some(queue) => match queue.len().await {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to count queue entries");
                    self.monitor.status().pending_operations
                }
            },
            None => 0,
        };
        self.monitor.finish_sync(Utc::now(), pending);

        tracing::info!(
            succeeded = report.success_count,
            failed = report.failed_count,
            aborted = report.aborted,
            pending,
            "drain finished"
        );
        report
    }

    async fn drain_pass(&self) -> DrainReport {
        let mut report = DrainReport::default();
        let Some(queue) = &self.queue else {
            return report;
        };

        let batch = match queue.load_pending().await {
            Ok(batch) => batch,
            Err(e) => {
                report.errors.push(e);
                return report;
            }
        };
        report.failed_count += batch.corrupt.len();
        report.errors.extend(batch.corrupt.into_iter().map(Error::from));

        let mut blocked: HashSet<(Collection, String)> = HashSet::new();

        for loaded in batch.entries {
            // Earlier dispatches may have remapped the entry, and local
            // deletes may have cancelled it since the batch was read.
            let entry = match queue.get(&loaded.id).await {
                Ok(Some(entry)) if entry.state == EntryState::Pending => entry,
                Ok(_) => {
                    tracing::debug!(entry = %loaded.id, "entry settled during drain");
                    continue;
                }
                Err(e) => {
                    report.failed_count += 1;
                    report.errors.push(e);
                    continue;
                }
            };
            let key = (entry.collection, entry.record_id.clone());
            if blocked.contains(&key) {
                continue;
            }
            if entry.operation != OpKind::Create && entry.targets_temp_id() {
                tracing::debug!(entry = %entry.id, record = %entry.record_id, "waiting for create");
                blocked.insert(key);
                continue;
            }

            tracing::debug!(
                entry = %entry.id,
                operation = %entry.operation,
                collection = %entry.collection,
                record = %entry.record_id,
                "dispatching"
            );
            match self.dispatch(queue, &entry).await {
                Ok(()) => report.success_count += 1,
                Err(DispatchError::Remote(e)) if e.kind == RemoteErrorKind::AuthExpired => {
                    tracing::warn!(entry = %entry.id, "session expired, stopping drain");
                    report.aborted = true;
                    report.errors.push(e.into_error(entry.collection, None));
                    break;
                }
                Err(DispatchError::Remote(e)) => {
                    let retryable = e.is_retryable();
                    let state = self
                        .charge_failure(queue, &entry, &e.to_string(), retryable, &mut report)
                        .await;
                    if retryable {
                        tracing::warn!(entry = %entry.id, error = %e, ?state, "dispatch failed");
                        blocked.insert(key);
                    } else {
                        tracing::warn!(entry = %entry.id, error = %e, "remote rejected entry");
                    }
                    report.errors.push(Error::RemoteError(format!("entry {}: {e}", entry.id)));
                }
                Err(DispatchError::Invalid(e)) => {
                    self.charge_failure(queue, &entry, &e.to_string(), false, &mut report)
                        .await;
                    report.errors.push(e);
                }
                Err(DispatchError::Local(e)) => {
                    tracing::warn!(entry = %entry.id, error = %e, "failed to record confirmed change");
                    report.failed_count += 1;
                    blocked.insert(key);
                    report.errors.push(e);
                }
            }
        }
        report
    }

    async fn charge_failure(
        &self,
        queue: &SyncQueue,
        entry: &QueueEntry,
        error: &str,
        retryable: bool,
        report: &mut DrainReport,
    ) -> Option<EntryState> {
        report.failed_count += 1;
        match queue
            .record_failure(&entry.id, error, retryable, self.settings.max_retries)
            .await
        {
            Ok(state) => Some(state),
            Err(e) => {
                report.errors.push(e);
                None
            }
        }
    }

    /// Send one entry and record the confirmed change.
    async fn dispatch(
        &self,
        queue: &SyncQueue,
        entry: &QueueEntry,
    ) -> std::result::Result<(), DispatchError> {
        let now = Utc::now();
        match entry.operation {
            OpKind::Create => {
                let mut data = as_object(entry.payload.clone()).map_err(DispatchError::Invalid)?;
                data.remove("id");
                let row = self
                    .remote
                    .insert(entry.collection, data, Some(entry.record_id.clone()))
                    .await
                    .map_err(DispatchError::Remote)?;
                let server = Record::from_remote(row, now).map_err(DispatchError::Local)?;
                queue
                    .complete_create(entry, server)
                    .await
                    .map_err(DispatchError::Local)?;
                Ok(())
            }
            OpKind::Update => {
                let patch = as_object(entry.payload.clone()).map_err(DispatchError::Invalid)?;
                let row = self
                    .remote
                    .update(entry.collection, entry.record_id.clone(), patch)
                    .await
                    .map_err(DispatchError::Remote)?;
                let server = Record::from_remote(row, now).map_err(DispatchError::Local)?;
                queue
                    .complete(entry, Some(server))
                    .await
                    .map_err(DispatchError::Local)?;
                Ok(())
            }
            OpKind::Delete => {
                match self
                    .remote
                    .delete(entry.collection, entry.record_id.clone())
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.kind == RemoteErrorKind::NotFound => {
                        tracing::debug!(entry = %entry.id, "already deleted remotely");
                    }
                    Err(e) => return Err(DispatchError::Remote(e)),
                }
                queue
                    .complete(entry, None)
                    .await
                    .map_err(DispatchError::Local)?;
                Ok(())
            }
        }
    }

    /// Evict synced records not touched within the retention window.
    pub async fn evict_stale(&self, now: DateTime<Utc>) -> fl_core::Result<EvictionReport> {
        let (store, _) = self.require_store()?;
        evict_stale(store, &self.settings, now).await
    }

    /// Event loop: drain on reconnect and foreground, refresh the pending
    /// count and sweep stale records on their intervals. Returns when
    /// `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut events = self.monitor.events();
        let mut poll = tokio::time::interval(self.settings.pending_poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut evict = tokio::time::interval(self.settings.eviction_interval());
        evict.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if self.monitor.is_online() {
            self.drain().await;
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("reconciler shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Ok(ConnectivityEvent::Online | ConnectivityEvent::Foreground) => {
                        self.drain().await;
                    }
                    Ok(ConnectivityEvent::Offline) => {}
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!(missed = n, "connectivity events lagged");
                        if self.monitor.is_online() {
                            self.drain().await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = poll.tick() => self.refresh_pending().await,
                _ = evict.tick() => {
                    if self.store.is_some() {
                        if let Err(e) = self.evict_stale(Utc::now()).await {
                            tracing::warn!(error = %e, "eviction sweep failed");
                        }
                    }
                }
            }
        }
    }
}

/// Sweep every evictable collection for synced records whose `updated_at`
/// is at or before `now - retention`. Unsynced records are never removed.
pub async fn evict_stale(
    store: &Store,
    settings: &SyncSettings,
    now: DateTime<Utc>,
) -> fl_core::Result<EvictionReport> {
    let cutoff = now - settings.retention();
    let mut report = EvictionReport {
        cutoff,
        evicted: BTreeMap::new(),
        retained_unsynced: 0,
    };

    for collection in Collection::ALL.into_iter().filter(Collection::evictable) {
        let mut scan = store.scan_by_index(
            collection,
            "updated_at",
            ScanRange::up_to(json!(cutoff.timestamp_millis())),
        )?;
        let mut evicted = 0;
        while let Some(record) = scan.next().await? {
            if !record.synced {
                report.retained_unsynced += 1;
                continue;
            }
            if store.evict_if_stale(collection, &record.id, cutoff).await? {
                evicted += 1;
            } else {
                tracing::debug!(%collection, id = %record.id, "record changed during sweep, kept");
            }
        }
        if evicted > 0 {
            report.evicted.insert(collection, evicted);
        }
    }

    tracing::info!(
        evicted = report.total(),
        retained_unsynced = report.retained_unsynced,
        cutoff = %cutoff,
        "eviction sweep finished"
    );
    Ok(report)
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
