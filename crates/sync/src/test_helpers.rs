// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Shared test helpers for engine and facade tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use fl_core::{Collection, Store};
use serde_json::{Map, Value};

use crate::config::SyncSettings;
use crate::connectivity::ConnectivityMonitor;
use crate::query::{compare_values, Query};
use crate::reconciler::SyncContext;
use crate::remote::{Remote, RemoteError, RemoteErrorKind, RemoteFuture, RemoteResult};

#[derive(Default)]
struct MemoryState {
    tables: HashMap<Collection, BTreeMap<String, Map<String, Value>>>,
    idempotency: HashMap<String, String>,
    next_id: u64,
    calls: Vec<String>,
    failures: VecDeque<RemoteError>,
    unreachable: bool,
}

/// In-memory remote that honours idempotency keys.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row directly, bypassing the call log.
    pub fn seed(&self, collection: Collection, row: Value) {
        let Value::Object(mut row) = row else {
            return;
        };
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        row.insert("id".into(), Value::String(id.clone()));
        let mut state = self.state.lock().unwrap();
        state.tables.entry(collection).or_default().insert(id, row);
    }

    pub fn row(&self, collection: Collection, id: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(&collection)
            .and_then(|t| t.get(id))
            .cloned()
            .map(Value::Object)
    }

    pub fn rows(&self, collection: Collection) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(&collection)
            .map(|t| t.values().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Calls received, as `"<op> <collection> <id>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Fail the next `times` calls with `kind`.
    pub fn fail_next(&self, kind: RemoteErrorKind, times: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..times {
            state
                .failures
                .push_back(RemoteError::new(kind, "injected failure"));
        }
    }

    /// Make every call fail with a network error until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    fn call<T>(
        &self,
        label: String,
        f: impl FnOnce(&mut MemoryState) -> RemoteResult<T>,
    ) -> RemoteResult<T> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(label);
        if state.unreachable {
            return Err(RemoteError::new(RemoteErrorKind::Network, "unreachable"));
        }
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        f(&mut state)
    }
}

fn not_found(collection: Collection, id: &str) -> RemoteError {
    RemoteError::new(RemoteErrorKind::NotFound, format!("{collection}/{id}"))
}

impl Remote for MemoryRemote {
    fn insert(
        &self,
        collection: Collection,
        data: Map<String, Value>,
        idempotency_key: Option<String>,
    ) -> RemoteFuture<'_, Value> {
        let result = self.call(format!("insert {collection}"), |state| {
            if let Some(existing) = idempotency_key
                .as_ref()
                .and_then(|k| state.idempotency.get(k))
                .cloned()
            {
                let row = state.tables.get(&collection).and_then(|t| t.get(&existing));
                return Ok(Value::Object(row.cloned().unwrap_or_default()));
            }
            state.next_id += 1;
            let id = format!("srv-{}", state.next_id);
            let mut row = data;
            row.insert("id".into(), Value::String(id.clone()));
            state
                .tables
                .entry(collection)
                .or_default()
                .insert(id.clone(), row.clone());
            if let Some(key) = idempotency_key {
                state.idempotency.insert(key, id);
            }
            Ok(Value::Object(row))
        });
        Box::pin(async move { result })
    }

    fn update(
        &self,
        collection: Collection,
        id: String,
        patch: Map<String, Value>,
    ) -> RemoteFuture<'_, Value> {
        let result = self.call(format!("update {collection} {id}"), |state| {
            let row = state
                .tables
                .get_mut(&collection)
                .and_then(|t| t.get_mut(&id))
                .ok_or_else(|| not_found(collection, &id))?;
            row.extend(patch);
            Ok(Value::Object(row.clone()))
        });
        Box::pin(async move { result })
    }

    fn delete(&self, collection: Collection, id: String) -> RemoteFuture<'_, ()> {
        let result = self.call(format!("delete {collection} {id}"), |state| {
            state
                .tables
                .get_mut(&collection)
                .and_then(|t| t.remove(&id))
                .map(|_| ())
                .ok_or_else(|| not_found(collection, &id))
        });
        Box::pin(async move { result })
    }

    fn select(&self, collection: Collection, query: Query) -> RemoteFuture<'_, Vec<Value>> {
        let result = self.call(format!("select {collection}"), |state| {
            let mut rows: Vec<Map<String, Value>> = state
                .tables
                .get(&collection)
                .map(|t| t.values().cloned().collect())
                .unwrap_or_default();
            rows.retain(|row| {
                query.filters.iter().all(|(field, value)| {
                    compare_values(row.get(field).unwrap_or(&Value::Null), value).is_eq()
                })
            });
            if let Some(order) = &query.order {
                rows.sort_by(|a, b| {
                    let ord = compare_values(
                        a.get(&order.field).unwrap_or(&Value::Null),
                        b.get(&order.field).unwrap_or(&Value::Null),
                    );
                    if order.ascending {
                        ord
                    } else {
                        ord.reverse()
                    }
                });
            }
            if let Some(limit) = query.limit {
                rows.truncate(limit);
            }
            Ok(rows.into_iter().map(Value::Object).collect())
        });
        Box::pin(async move { result })
    }
}

/// Context over an in-memory store and a fresh [`MemoryRemote`].
pub async fn memory_context(online: bool) -> (Arc<SyncContext>, MemoryRemote) {
    let store = Store::open_in_memory().await.unwrap();
    let remote = MemoryRemote::new();
    let ctx = SyncContext::new(
        Some(store),
        Arc::new(remote.clone()),
        ConnectivityMonitor::new(online),
        SyncSettings::default(),
    );
    (Arc::new(ctx), remote)
}
