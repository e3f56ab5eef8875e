// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Offline-aware data access.
//!
//! [`DataAccess`] is the single entry point for business callers. Online,
//! calls go to the remote and the result is mirrored locally. Offline, or
//! when the remote turns out to be unreachable, mutations are applied to the
//! store and queued, and reads are served from the store. Expected offline
//! conditions are reported through [`Outcome`] flags, not as errors.
//!
//! A record that still has queued changes, or that only exists under a
//! Temp ID, is always handled through the queue so its mutations reach the
//! remote in the order they were made.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use fl_core::record::as_object;
use fl_core::{generate_temp_id, is_temp_id, Collection, Error, Record, Store};

use crate::query::Query;
use crate::reconciler::SyncContext;
use crate::remote::{RemoteError, RemoteErrorKind};

/// Uniform result of a facade call.
#[derive(Debug)]
pub struct Outcome<T> {
    pub data: Option<T>,
    pub error: Option<Error>,
    /// The data was read from the local store.
    pub from_cache: bool,
    /// The mutation was applied locally and awaits reconciliation.
    pub queued: bool,
}

impl<T> Outcome<T> {
    fn ok(data: T) -> Self {
        Outcome {
            data: Some(data),
            error: None,
            from_cache: false,
            queued: false,
        }
    }

    fn cached(data: T) -> Self {
        Outcome {
            from_cache: true,
            ..Self::ok(data)
        }
    }

    fn queued(data: T) -> Self {
        Outcome {
            queued: true,
            ..Self::ok(data)
        }
    }

    fn failed(error: Error) -> Self {
        Outcome {
            data: None,
            error: Some(error),
            from_cache: false,
            queued: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a plain result, dropping the flags.
    pub fn into_result(self) -> fl_core::Result<Option<T>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.data),
        }
    }
}

impl<T> From<fl_core::Result<Outcome<T>>> for Outcome<T> {
    fn from(result: fl_core::Result<Outcome<T>>) -> Self {
        result.unwrap_or_else(Outcome::failed)
    }
}

/// Offline-aware CRUD over one [`SyncContext`].
#[derive(Debug, Clone)]
pub struct DataAccess {
    ctx: Arc<SyncContext>,
}

impl DataAccess {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        DataAccess { ctx }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Create a record. Offline, the record gets a Temp ID and a queued create.
    pub async fn insert(&self, collection: Collection, data: Value) -> Outcome<Record> {
        let fields = match as_object(data) {
            Ok(fields) => fields,
            Err(e) => return Outcome::failed(e),
        };

        if self.ctx.monitor().is_online() {
            match self
                .ctx
                .remote()
                .insert(collection, fields.clone(), None)
                .await
            {
                Ok(row) => return self.mirror(collection, row).await,
                Err(e) if self.went_offline(&e) => {}
                Err(e) => return Outcome::failed(e.into_error(collection, None)),
            }
        }
        self.insert_offline(collection, fields).await.into()
    }

    /// Shallow-merge `patch` into a record.
    pub async fn update(&self, collection: Collection, id: &str, patch: Value) -> Outcome<Record> {
        let patch = match as_object(patch) {
            Ok(patch) => patch,
            Err(e) => return Outcome::failed(e),
        };

        if self.can_call_remote(collection, id).await {
            match self
                .ctx
                .remote()
                .update(collection, id.to_string(), patch.clone())
                .await
            {
                Ok(row) => return self.mirror(collection, row).await,
                Err(e) if self.went_offline(&e) => {}
                Err(e) => return Outcome::failed(e.into_error(collection, Some(id))),
            }
        }
        self.update_offline(collection, id, patch).await.into()
    }

    /// Delete a record.
    ///
    /// Offline, a record the remote has never seen is simply dropped along
    /// with its queued create; anything else gets a queued delete.
    pub async fn delete(&self, collection: Collection, id: &str) -> Outcome<()> {
        if self.can_call_remote(collection, id).await {
            match self.ctx.remote().delete(collection, id.to_string()).await {
                Ok(()) => {}
                Err(e) if e.kind == RemoteErrorKind::NotFound => {}
                Err(e) if self.went_offline(&e) => {
                    return self.delete_offline(collection, id).await.into();
                }
                Err(e) => return Outcome::failed(e.into_error(collection, Some(id))),
            }
            if let Some(store) = self.ctx.store() {
                if let Err(e) = store.delete(collection, id).await {
                    tracing::warn!(%collection, id, error = %e, "failed to drop local copy");
                }
            }
            return Outcome::ok(());
        }
        self.delete_offline(collection, id).await.into()
    }

    /// Fetch records matching `query`.
    pub async fn select(&self, collection: Collection, query: &Query) -> Outcome<Vec<Record>> {
        if self.ctx.monitor().is_online() {
            match self.ctx.remote().select(collection, query.clone()).await {
                Ok(rows) => return self.mirror_rows(collection, rows).await.into(),
                Err(e) if self.went_offline(&e) => {}
                Err(e) => return Outcome::failed(e.into_error(collection, None)),
            }
        }
        self.select_offline(collection, query).await.into()
    }

    /// Fetch one record by id.
    pub async fn get_by_id(&self, collection: Collection, id: &str) -> Outcome<Record> {
        if self.ctx.monitor().is_online() && !is_temp_id(id) {
            let query = Query::new().eq("id", id).limit(1);
            match self.ctx.remote().select(collection, query).await {
                Ok(rows) => {
                    let outcome: Outcome<Vec<Record>> =
                        self.mirror_rows(collection, rows).await.into();
                    return match outcome.into_result() {
                        Ok(records) => match records.and_then(|r| r.into_iter().next()) {
                            Some(record) => Outcome::ok(record),
                            None => Outcome::failed(Error::not_found(collection.as_str(), id)),
                        },
                        Err(e) => Outcome::failed(e),
                    };
                }
                Err(e) if self.went_offline(&e) => {}
                Err(e) => return Outcome::failed(e.into_error(collection, Some(id))),
            }
        }

        let (store, _) = match self.ctx.require_store() {
            Ok(pair) => pair,
            Err(e) => return Outcome::failed(e),
        };
        match store.get(collection, id).await {
            Ok(Some(record)) => Outcome::cached(record),
            Ok(None) => Outcome {
                from_cache: true,
                ..Outcome::failed(Error::not_found(collection.as_str(), id))
            },
            Err(e) => Outcome::failed(e),
        }
    }

    /// Mark the monitor offline if `e` is a connectivity failure.
    fn went_offline(&self, e: &RemoteError) -> bool {
        if !e.is_network() {
            return false;
        }
        tracing::warn!(error = %e, "remote unreachable, switching to offline mode");
        self.ctx.monitor().set_online(false);
        true
    }

    /// Online, server-addressed and with nothing queued for the record.
    async fn can_call_remote(&self, collection: Collection, id: &str) -> bool {
        if !self.ctx.monitor().is_online() || is_temp_id(id) {
            return false;
        }
        let Some(queue) = self.ctx.queue() else {
            return true;
        };
        match queue.entries_for(collection, id).await {
            Ok(entries) => entries.is_empty(),
            Err(e) => {
                tracing::warn!(%collection, id, error = %e, "cannot inspect queue, using offline path");
                false
            }
        }
    }

    async fn mirror(&self, collection: Collection, row: Value) -> Outcome<Record> {
        let record = match Record::from_remote(row, Utc::now()) {
            Ok(record) => record,
            Err(e) => return Outcome::failed(e),
        };
        if let Some(store) = self.ctx.store() {
            if let Err(e) = store.put(collection, record.clone()).await {
                tracing::warn!(%collection, id = %record.id, error = %e, "failed to mirror record");
            }
        }
        Outcome::ok(record)
    }

    /// Convert remote rows and upsert them locally. Local copies with
    /// queued changes are left alone until those changes are reconciled.
    async fn mirror_rows(
        &self,
        collection: Collection,
        rows: Vec<Value>,
    ) -> fl_core::Result<Outcome<Vec<Record>>> {
        let now = Utc::now();
        let records = rows
            .into_iter()
            .map(|row| Record::from_remote(row, now))
            .collect::<fl_core::Result<Vec<_>>>()?;

        if let Some(store) = self.ctx.store() {
            for record in &records {
                if let Err(e) = upsert_remote(store, collection, record).await {
                    tracing::warn!(%collection, id = %record.id, error = %e, "failed to cache record");
                }
            }
        }
        Ok(Outcome::ok(records))
    }

    async fn insert_offline(
        &self,
        collection: Collection,
        fields: Map<String, Value>,
    ) -> fl_core::Result<Outcome<Record>> {
        let (_, queue) = self.ctx.require_store()?;
        let now = Utc::now();
        let record = Record::new(generate_temp_id(&now), fields, false, now);

        queue.stage_create(collection, record.clone()).await?;
        self.ctx.refresh_pending().await;
        Ok(Outcome::queued(record))
    }

    async fn update_offline(
        &self,
        collection: Collection,
        id: &str,
        patch: Map<String, Value>,
    ) -> fl_core::Result<Outcome<Record>> {
        let (_, queue) = self.ctx.require_store()?;
        let record = queue.stage_update(collection, id, patch, Utc::now()).await?;
        self.ctx.refresh_pending().await;
        Ok(Outcome::queued(record))
    }

    async fn delete_offline(&self, collection: Collection, id: &str) -> fl_core::Result<Outcome<()>> {
        let (_, queue) = self.ctx.require_store()?;
        let staged = queue.stage_delete(collection, id).await?;
        self.ctx.refresh_pending().await;
        match staged {
            Some(_) => Ok(Outcome::queued(())),
            None => Ok(Outcome::ok(())),
        }
    }

    async fn select_offline(
        &self,
        collection: Collection,
        query: &Query,
    ) -> fl_core::Result<Outcome<Vec<Record>>> {
        let (store, _) = self.ctx.require_store()?;
        let candidates = match query.index_filter(collection) {
            Some((index, value)) => {
                store
                    .query_by_index(collection, index.name, value.clone())
                    .await?
            }
            None => store.get_all(collection).await?,
        };
        Ok(Outcome::cached(query.apply(candidates)))
    }
}

/// Store a remote copy unless the local one has unreconciled changes.
async fn upsert_remote(store: &Store, collection: Collection, record: &Record) -> fl_core::Result<()> {
    if let Some(local) = store.get(collection, &record.id).await? {
        if !local.synced {
            return Ok(());
        }
    }
    store.put(collection, record.clone()).await
}

#[cfg(test)]
#[path = "facade_tests.rs"]
mod tests;
