// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use chrono::{DateTime, Utc};
use fl_core::{generate_temp_id, Collection, OpKind, Record, Store, SyncQueue};
use serde_json::{json, Map, Value};

pub use predicates::prelude::*;
pub use tempfile::TempDir;

/// `fieldline` pointed at the config file inside `dir`.
pub fn fl(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("fieldline");
    cmd.arg("--config")
        .arg(config_path(dir))
        .env("RUST_LOG", "warn");
    cmd
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join("fieldline.toml")
}

pub fn db_path(dir: &Path) -> PathBuf {
    dir.join("offline.db")
}

/// A temp directory with a config whose database lives next to it.
pub fn init_temp() -> TempDir {
    let temp = TempDir::new().unwrap();
    fl(temp.path())
        .args(["init", "--database", "offline.db"])
        .assert()
        .success();
    temp
}

/// Same as [`init_temp`] with a `[remote]` section pointing at `url`.
pub fn init_temp_with_remote(url: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    fl(temp.path())
        .args(["init", "--database", "offline.db", "--remote", url])
        .assert()
        .success();
    temp
}

pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap()
}

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// Record an offline create the way the data access layer does.
/// Returns `(temp id, queue entry id)`.
pub async fn seed_offline_create(dir: &Path, collection: Collection, data: Value) -> (String, String) {
    let store = Store::open(&db_path(dir)).await.unwrap();
    let now = Utc::now();
    let id = generate_temp_id(&now);
    let data = fields(data);
    store
        .put(collection, Record::new(id.clone(), data.clone(), false, now))
        .await
        .unwrap();
    let entry = SyncQueue::new(store)
        .enqueue(OpKind::Create, collection, &id, Value::Object(data))
        .await
        .unwrap();
    (id, entry.id)
}

/// Mark a queued entry as terminally failed.
pub async fn fail_entry(dir: &Path, entry_id: &str) {
    let store = Store::open(&db_path(dir)).await.unwrap();
    SyncQueue::new(store)
        .record_failure(entry_id, "rejected: bad field", false, 3)
        .await
        .unwrap();
}

/// Store a synced record last touched at `updated_at`.
pub async fn seed_synced(dir: &Path, collection: Collection, id: &str, updated_at: DateTime<Utc>) {
    let store = Store::open(&db_path(dir)).await.unwrap();
    store
        .put(
            collection,
            Record::new(id, fields(json!({"name": id})), true, updated_at),
        )
        .await
        .unwrap();
}
