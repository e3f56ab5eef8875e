// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use crate::facade::DataAccess;
use crate::test_helpers::{memory_context, MemoryRemote};
use chrono::Duration;
use fl_core::generate_temp_id;
use fl_core::record::as_object;
use serde_json::{json, Value};

async fn offline_access() -> (DataAccess, Arc<SyncContext>, MemoryRemote) {
    let (ctx, remote) = memory_context(false).await;
    (DataAccess::new(Arc::clone(&ctx)), ctx, remote)
}

fn queue(ctx: &SyncContext) -> &SyncQueue {
    ctx.queue().unwrap()
}

fn store(ctx: &SyncContext) -> &Store {
    ctx.store().unwrap()
}

fn synced(id: &str, fields: Value, age_days: i64) -> Record {
    let mut r = Record::new(id, as_object(fields).unwrap(), true, Utc::now());
    r.updated_at = Utc::now() - Duration::days(age_days);
    r
}

#[tokio::test]
async fn empty_drain_still_reports() {
    let (ctx, remote) = memory_context(true).await;
    let report = ctx.drain().await;

    assert!(!report.skipped);
    assert_eq!(report.success_count, 0);
    assert_eq!(report.failed_count, 0);
    assert!(report.errors.is_empty());
    assert!(ctx.monitor().status().last_sync.is_some());
    assert!(!ctx.monitor().status().is_syncing);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn drain_remaps_temp_id_to_server_id() {
    let (access, ctx, remote) = offline_access().await;
    let temp = access
        .insert(Collection::Customers, json!({"name": "Acme"}))
        .await
        .data
        .unwrap();

    ctx.monitor().set_online(true);
    let report = ctx.drain().await;

    assert_eq!(report.success_count, 1);
    assert!(queue(&ctx).is_empty().await.unwrap());
    assert!(store(&ctx).get(Collection::Customers, &temp.id).await.unwrap().is_none());
    let server = store(&ctx).get(Collection::Customers, "srv-1").await.unwrap().unwrap();
    assert!(server.synced);
    assert_eq!(server.field("name"), Some(&json!("Acme")));
    assert_eq!(remote.rows(Collection::Customers), vec![json!({"id": "srv-1", "name": "Acme"})]);
    assert_eq!(ctx.monitor().status().pending_operations, 0);
}

#[tokio::test]
async fn create_then_updates_reach_remote_in_order() {
    let (access, ctx, remote) = offline_access().await;
    let temp = access
        .insert(Collection::Jobs, json!({"status": "new", "title": "Boiler"}))
        .await
        .data
        .unwrap();
    for status in ["scheduled", "started", "done"] {
        let out = access
            .update(Collection::Jobs, &temp.id, json!({"status": status}))
            .await;
        assert!(out.queued);
    }
    assert_eq!(queue(&ctx).len().await.unwrap(), 4);

    ctx.monitor().set_online(true);
    let report = ctx.drain().await;

    assert_eq!(report.success_count, 4);
    assert_eq!(
        remote.calls(),
        vec![
            "insert jobs",
            "update jobs srv-1",
            "update jobs srv-1",
            "update jobs srv-1"
        ]
    );
    assert_eq!(
        remote.row(Collection::Jobs, "srv-1").unwrap(),
        json!({"id": "srv-1", "status": "done", "title": "Boiler"})
    );
    let local = store(&ctx).get(Collection::Jobs, "srv-1").await.unwrap().unwrap();
    assert!(local.synced);
    assert_eq!(local.field("status"), Some(&json!("done")));
}

#[tokio::test]
async fn replayed_create_is_not_duplicated() {
    let (access, ctx, remote) = offline_access().await;
    let temp = access
        .insert(Collection::Invoices, json!({"total": 120}))
        .await
        .data
        .unwrap();

    // The remote applied the create but the process died before the entry
    // was removed.
    remote
        .insert(
            Collection::Invoices,
            as_object(json!({"total": 120})).unwrap(),
            Some(temp.id.clone()),
        )
        .await
        .unwrap();

    ctx.monitor().set_online(true);
    let report = ctx.drain().await;

    assert_eq!(report.success_count, 1);
    assert_eq!(remote.rows(Collection::Invoices).len(), 1);
    assert!(store(&ctx).get(Collection::Invoices, "srv-1").await.unwrap().unwrap().synced);
}

#[tokio::test]
async fn temp_id_entries_wait_for_their_create() {
    let (access, ctx, remote) = offline_access().await;
    let temp = access
        .insert(Collection::Customers, json!({"name": "A"}))
        .await
        .data
        .unwrap();
    access
        .update(Collection::Customers, &temp.id, json!({"name": "B"}))
        .await;

    remote.fail_next(RemoteErrorKind::Timeout, 1);
    let report = ctx.drain().await;

    assert_eq!(report.success_count, 0);
    assert_eq!(report.failed_count, 1);
    assert_eq!(remote.calls(), vec!["insert customers"]);
    let pending = queue(&ctx).pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].retry_count, 1);
    assert_eq!(pending[1].retry_count, 0);
    assert!(pending[1].targets_temp_id());

    let report = ctx.drain().await;
    assert_eq!(report.success_count, 2);
    assert_eq!(
        remote.row(Collection::Customers, "srv-1").unwrap()["name"],
        json!("B")
    );
}

#[tokio::test]
async fn update_exhausting_retries_is_parked_as_failed() {
    let (ctx, remote) = memory_context(true).await;
    remote.seed(Collection::Jobs, json!({"id": "j-1", "status": "open"}));
    store(&ctx)
        .put(Collection::Jobs, synced("j-1", json!({"status": "open"}), 0))
        .await
        .unwrap();
    queue(&ctx)
        .enqueue(OpKind::Update, Collection::Jobs, "j-1", json!({"status": "done"}))
        .await
        .unwrap();

    remote.fail_next(RemoteErrorKind::Server, 4);
    for _ in 0..3 {
        let report = ctx.drain().await;
        assert_eq!(report.failed_count, 1);
        assert_eq!(queue(&ctx).pending().await.unwrap().len(), 1);
    }
    let report = ctx.drain().await;
    assert_eq!(report.failed_count, 1);

    let failed = queue(&ctx).failed().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].state, EntryState::Failed);
    assert_eq!(failed[0].retry_count, 4);
    assert_eq!(ctx.monitor().status().pending_operations, 1);

    // Parked entries are not dispatched again.
    let report = ctx.drain().await;
    assert_eq!(report.success_count + report.failed_count, 0);
    assert_eq!(remote.calls().len(), 4);
    assert!(!store(&ctx).get(Collection::Jobs, "j-1").await.unwrap().unwrap().synced);
}

#[tokio::test]
async fn retryable_failure_only_blocks_the_same_record() {
    let (ctx, remote) = memory_context(true).await;
    for id in ["j-1", "j-2"] {
        remote.seed(Collection::Jobs, json!({"id": id}));
        store(&ctx).put(Collection::Jobs, synced(id, json!({}), 0)).await.unwrap();
    }
    let q = queue(&ctx);
    q.enqueue(OpKind::Update, Collection::Jobs, "j-1", json!({"n": 1})).await.unwrap();
    q.enqueue(OpKind::Update, Collection::Jobs, "j-2", json!({"n": 1})).await.unwrap();
    q.enqueue(OpKind::Update, Collection::Jobs, "j-1", json!({"n": 2})).await.unwrap();

    remote.fail_next(RemoteErrorKind::Network, 1);
    let report = ctx.drain().await;

    assert_eq!(report.success_count, 1);
    assert_eq!(report.failed_count, 1);
    assert_eq!(remote.calls(), vec!["update jobs j-1", "update jobs j-2"]);
    let left: Vec<_> = q.pending().await.unwrap().into_iter().map(|e| e.record_id).collect();
    assert_eq!(left, vec!["j-1", "j-1"]);
}

#[tokio::test]
async fn rejection_fails_entry_and_continues() {
    let (ctx, remote) = memory_context(true).await;
    remote.seed(Collection::Jobs, json!({"id": "j-1"}));
    store(&ctx).put(Collection::Jobs, synced("j-1", json!({}), 0)).await.unwrap();
    let q = queue(&ctx);
    q.enqueue(OpKind::Update, Collection::Jobs, "j-1", json!({"n": 1})).await.unwrap();
    q.enqueue(OpKind::Update, Collection::Jobs, "j-1", json!({"n": 2})).await.unwrap();

    remote.fail_next(RemoteErrorKind::Rejected, 1);
    let report = ctx.drain().await;

    assert_eq!(report.success_count, 1);
    assert_eq!(report.failed_count, 1);
    assert_eq!(q.failed().await.unwrap().len(), 1);
    assert!(q.pending().await.unwrap().is_empty());
    assert_eq!(remote.row(Collection::Jobs, "j-1").unwrap()["n"], json!(2));
}

#[tokio::test]
async fn expired_session_aborts_without_charging() {
    let (ctx, remote) = memory_context(true).await;
    let q = queue(&ctx);
    q.enqueue(OpKind::Update, Collection::Jobs, "j-1", json!({})).await.unwrap();
    q.enqueue(OpKind::Update, Collection::Jobs, "j-2", json!({})).await.unwrap();

    remote.fail_next(RemoteErrorKind::AuthExpired, 1);
    let report = ctx.drain().await;

    assert!(report.aborted);
    assert_eq!(report.failed_count, 0);
    assert!(matches!(report.errors[0], Error::AuthExpired(_)));
    assert_eq!(remote.calls().len(), 1);
    assert!(q.pending().await.unwrap().iter().all(|e| e.retry_count == 0));
}

#[tokio::test]
async fn delete_of_missing_remote_row_completes() {
    let (ctx, remote) = memory_context(true).await;
    queue(&ctx)
        .enqueue(OpKind::Delete, Collection::Tags, "t-1", Value::Null)
        .await
        .unwrap();

    let report = ctx.drain().await;
    assert_eq!(report.success_count, 1);
    assert_eq!(remote.calls(), vec!["delete tags t-1"]);
    assert!(queue(&ctx).is_empty().await.unwrap());
}

#[tokio::test]
async fn non_object_payload_is_failed_not_sent() {
    let (ctx, remote) = memory_context(true).await;
    let entry = queue(&ctx)
        .enqueue(OpKind::Update, Collection::Jobs, "j-1", json!([1, 2]))
        .await
        .unwrap();

    let report = ctx.drain().await;
    assert_eq!(report.failed_count, 1);
    assert!(remote.calls().is_empty());
    assert_eq!(
        queue(&ctx).get(&entry.id).await.unwrap().unwrap().state,
        EntryState::Failed
    );
}

#[tokio::test]
async fn concurrent_drain_is_skipped() {
    let (ctx, remote) = memory_context(true).await;
    remote.seed(Collection::Jobs, json!({"id": "j-1"}));
    queue(&ctx)
        .enqueue(OpKind::Update, Collection::Jobs, "j-1", json!({"n": 1}))
        .await
        .unwrap();

    let (a, b) = tokio::join!(ctx.drain(), ctx.drain());
    assert!(a.skipped ^ b.skipped);
    assert_eq!(a.success_count + b.success_count, 1);
    assert_eq!(remote.calls().len(), 1);

    // The guard is released afterwards.
    assert!(!ctx.drain().await.skipped);
}

#[tokio::test]
async fn update_of_missing_remote_row_is_failed() {
    let (ctx, _remote) = memory_context(true).await;
    let q = queue(&ctx);
    q.enqueue(OpKind::Update, Collection::Jobs, "j-1", json!({})).await.unwrap();

    let report = ctx.drain().await;
    assert_eq!(report.failed_count, 1);
    assert!(matches!(report.errors[0], Error::RemoteError(_)));
    assert_eq!(q.failed().await.unwrap().len(), 1);
}

#[tokio::test]
async fn eviction_keeps_unsynced_and_recent_records() {
    let (ctx, _remote) = memory_context(true).await;
    let s = store(&ctx);
    s.put(Collection::Customers, synced("old", json!({}), 30)).await.unwrap();
    s.put(Collection::Customers, synced("fresh", json!({}), 1)).await.unwrap();
    let mut dirty = synced("dirty", json!({}), 30);
    dirty.synced = false;
    s.put(Collection::Customers, dirty).await.unwrap();
    s.put(Collection::Tags, synced("t-old", json!({}), 8)).await.unwrap();
    s.put(Collection::Jobs, synced("j-old", json!({}), 90)).await.unwrap();

    let report = ctx.evict_stale(Utc::now()).await.unwrap();

    assert_eq!(report.total(), 2);
    assert_eq!(report.evicted.get(&Collection::Customers), Some(&1));
    assert_eq!(report.evicted.get(&Collection::Tags), Some(&1));
    assert_eq!(report.retained_unsynced, 1);
    assert!(s.get(Collection::Customers, "old").await.unwrap().is_none());
    assert!(s.get(Collection::Customers, "fresh").await.unwrap().is_some());
    assert!(s.get(Collection::Customers, "dirty").await.unwrap().is_some());
    assert!(s.get(Collection::Jobs, "j-old").await.unwrap().is_some());
}

#[tokio::test]
async fn offline_edit_during_eviction_sweep_is_kept() {
    let (access, ctx, _remote) = offline_access().await;
    for i in 0..200 {
        store(&ctx)
            .put(Collection::Customers, synced(&format!("c-{i:04}"), json!({"name": "old"}), 30))
            .await
            .unwrap();
    }

    let sweep = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { ctx.evict_stale(Utc::now()).await })
    };
    let out = access
        .update(Collection::Customers, "c-0199", json!({"name": "edited"}))
        .await;
    let report = sweep.await.unwrap().unwrap();

    assert!(out.is_ok());
    assert!(out.queued);
    assert_eq!(report.total(), 199);
    let kept = store(&ctx).get(Collection::Customers, "c-0199").await.unwrap().unwrap();
    assert!(!kept.synced);
    assert_eq!(kept.field("name"), Some(&json!("edited")));
    let entries = queue(&ctx).entries_for(Collection::Customers, "c-0199").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, OpKind::Update);
    assert_eq!(store(&ctx).get_all(Collection::Customers).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unreadable_queue_keeps_last_pending_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline.db");
    let store = Store::open(&path).await.unwrap();
    let ctx = SyncContext::new(
        Some(store),
        Arc::new(MemoryRemote::new()),
        ConnectivityMonitor::new(true),
        SyncSettings::default(),
    );
    ctx.monitor().set_pending(2);

    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch("DROP TABLE sync_queue")
        .unwrap();

    ctx.drain().await;
    assert_eq!(ctx.monitor().status().pending_operations, 2);
    assert!(ctx.monitor().status().last_sync.is_some());
    ctx.refresh_pending().await;
    assert_eq!(ctx.monitor().status().pending_operations, 2);
}

#[tokio::test]
async fn eviction_without_store_is_unavailable() {
    let remote = MemoryRemote::new();
    let ctx = SyncContext::new(
        None,
        Arc::new(remote),
        ConnectivityMonitor::new(true),
        SyncSettings::default(),
    );
    assert!(matches!(
        ctx.evict_stale(Utc::now()).await.unwrap_err(),
        Error::StorageUnavailable(_)
    ));
    let report = ctx.drain().await;
    assert_eq!(report.success_count, 0);
}

#[tokio::test]
async fn open_falls_back_when_storage_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "x").unwrap();
    let config = Config {
        database: blocker.join("offline.db"),
        ..Config::default()
    };

    let ctx = SyncContext::open(&config, Arc::new(MemoryRemote::new()), ConnectivityMonitor::new(false))
        .await
        .unwrap();
    assert!(ctx.store().is_none());
    assert!(ctx.queue().is_none());
}

#[tokio::test]
async fn run_drains_on_reconnect_and_stops_on_cancel() {
    let (access, ctx, remote) = offline_access().await;
    access.insert(Collection::Tags, json!({"name": "urgent"})).await;

    let shutdown = CancellationToken::new();
    let handle = {
        let ctx = Arc::clone(&ctx);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { ctx.run(shutdown).await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    ctx.monitor().set_online(true);

    let mut status = ctx.monitor().subscribe();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        status.wait_for(|s| s.last_sync.is_some() && s.pending_operations == 0),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(remote.rows(Collection::Tags).len(), 1);

    shutdown.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

fn unsent_tag() -> Record {
    let now = Utc::now();
    Record::new(
        generate_temp_id(&now),
        as_object(json!({"name": "urgent"})).unwrap(),
        false,
        now,
    )
}

#[tokio::test(start_paused = true)]
async fn run_drains_when_returning_to_foreground() {
    let (ctx, remote) = memory_context(true).await;
    let shutdown = CancellationToken::new();
    let handle = {
        let ctx = Arc::clone(&ctx);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { ctx.run(shutdown).await })
    };
    let mut status = ctx.monitor().subscribe();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        status.wait_for(|s| s.last_sync.is_some()),
    )
    .await
    .unwrap()
    .unwrap();

    queue(&ctx).stage_create(Collection::Tags, unsent_tag()).await.unwrap();
    tokio::time::sleep(ctx.settings().pending_poll_interval() * 2).await;
    assert!(remote.calls().is_empty());
    assert_eq!(ctx.monitor().status().pending_operations, 1);

    ctx.monitor().set_visible(false);
    ctx.monitor().set_visible(true);
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        status.wait_for(|s| s.pending_operations == 0),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(remote.rows(Collection::Tags).len(), 1);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn poll_tick_refreshes_pending_count() {
    let (ctx, remote) = memory_context(false).await;
    let shutdown = CancellationToken::new();
    let handle = {
        let ctx = Arc::clone(&ctx);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { ctx.run(shutdown).await })
    };
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    let mut status = ctx.monitor().subscribe();
    assert_eq!(status.borrow().pending_operations, 0);

    queue(&ctx).stage_create(Collection::Tags, unsent_tag()).await.unwrap();
    let staged = tokio::time::Instant::now();
    tokio::time::timeout(
        std::time::Duration::from_secs(30),
        status.wait_for(|s| s.pending_operations == 1),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(staged.elapsed() >= std::time::Duration::from_secs(3));
    assert!(remote.calls().is_empty());

    shutdown.cancel();
    handle.await.unwrap();
}
