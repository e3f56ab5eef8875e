// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Connectivity tracking and sync status publication.
//!
//! The host reports network and visibility transitions; the monitor keeps
//! the current [`SyncStatus`] on a watch channel for presentation layers and
//! broadcasts [`ConnectivityEvent`]s to the reconciliation loop.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 16;

/// Snapshot of synchronisation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    /// Retained queue entries, including failed and quarantined ones.
    pub pending_operations: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub is_syncing: bool,
}

/// Transition reported to the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Offline to online.
    Online,
    /// Online to offline.
    Offline,
    /// The host became visible again while online.
    Foreground,
}

/// Tracks connectivity and publishes [`SyncStatus`].
#[derive(Debug)]
pub struct ConnectivityMonitor {
    status: watch::Sender<SyncStatus>,
    events: broadcast::Sender<ConnectivityEvent>,
    visible: AtomicBool,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial connectivity.
    pub fn new(online: bool) -> Self {
        let (status, _) = watch::channel(SyncStatus {
            is_online: online,
            ..SyncStatus::default()
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        ConnectivityMonitor {
            status,
            events,
            visible: AtomicBool::new(true),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status.borrow().is_online
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Record a connectivity change. Emits an event only on a transition.
    pub fn set_online(&self, online: bool) {
        let changed = self.status.send_if_modified(|s| {
            if s.is_online == online {
                return false;
            }
            s.is_online = online;
            true
        });
        if changed {
            let event = if online {
                ConnectivityEvent::Online
            } else {
                ConnectivityEvent::Offline
            };
            tracing::info!(?event, "connectivity changed");
            let _ = self.events.send(event);
        }
    }

    /// Record a visibility change. Returning to the foreground while online
    /// emits [`ConnectivityEvent::Foreground`].
    pub fn set_visible(&self, visible: bool) {
        let was_visible = self.visible.swap(visible, Ordering::AcqRel);
        if visible && !was_visible && self.is_online() {
            tracing::debug!("returned to foreground");
            let _ = self.events.send(ConnectivityEvent::Foreground);
        }
    }

    /// Resolve once the monitor reports online.
    pub async fn wait_for_online(&self) {
        let mut rx = self.status.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|s| s.is_online).await;
    }

    /// Receiver for status updates.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Receiver for connectivity transitions.
    pub fn events(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    pub(crate) fn set_pending(&self, pending: usize) {
        self.status.send_if_modified(|s| {
            let changed = s.pending_operations != pending;
            s.pending_operations = pending;
            changed
        });
    }

    pub(crate) fn set_syncing(&self, syncing: bool) {
        self.status.send_modify(|s| s.is_syncing = syncing);
    }

    pub(crate) fn finish_sync(&self, at: DateTime<Utc>, pending: usize) {
        self.status.send_modify(|s| {
            s.is_syncing = false;
            s.last_sync = Some(at);
            s.pending_operations = pending;
        });
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;
