// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Durable queue of mutations awaiting remote confirmation.
//!
//! Entries live in the store's reserved `sync_queue` table, so completing an
//! entry and remapping the record it created commit in one transaction. The
//! queue is FIFO by `seq`; it never drops an entry on its own. Entries that
//! exhaust their retry budget stay in the `failed` state until an operator
//! retries or discards them, and rows that no longer decode are moved to
//! `quarantined`.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::id::{generate_entry_id, is_temp_id};
use crate::record::Record;
use crate::store::{delete_record, get_record, put_record, refresh_synced, Store};

const ENTRY_COLUMNS: &str =
    "seq, id, operation, collection, record_id, payload, enqueued_at, retry_count, last_error, state";

/// Kind of mutation carried by a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Create,
    Update,
    Delete,
}

impl OpKind {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create" | "insert" => Ok(OpKind::Create),
            "update" => Ok(OpKind::Update),
            "delete" => Ok(OpKind::Delete),
            _ => Err(Error::InvalidInput(format!("invalid operation: '{s}'"))),
        }
    }
}

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Waiting to be dispatched.
    Pending,
    /// Retry budget exhausted or rejected by the remote. Kept for manual review.
    Failed,
    /// Stored form could not be decoded. Never dispatched.
    Quarantined,
}

impl EntryState {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Pending => "pending",
            EntryState::Failed => "failed",
            EntryState::Quarantined => "quarantined",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(EntryState::Pending),
            "failed" => Ok(EntryState::Failed),
            "quarantined" => Ok(EntryState::Quarantined),
            _ => Err(Error::InvalidInput(format!("invalid entry state: '{s}'"))),
        }
    }
}

/// One pending mutation not yet confirmed against the remote collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    /// FIFO position. Strictly increasing in enqueue order.
    pub seq: i64,
    pub operation: OpKind,
    pub collection: Collection,
    /// Id of the record the mutation applies to (a Temp ID for creates).
    pub record_id: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub state: EntryState,
}

impl QueueEntry {
    /// Returns true if the entry still targets a client placeholder id.
    pub fn targets_temp_id(&self) -> bool {
        is_temp_id(&self.record_id)
    }
}

/// A stored entry that failed to decode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorruptEntry {
    pub id: String,
    pub reason: String,
}

impl From<CorruptEntry> for Error {
    fn from(c: CorruptEntry) -> Self {
        Error::QueueCorrupt {
            id: c.id,
            reason: c.reason,
        }
    }
}

/// Pending entries in FIFO order, plus any rows quarantined while loading them.
#[derive(Debug, Default)]
pub struct PendingBatch {
    pub entries: Vec<QueueEntry>,
    pub corrupt: Vec<CorruptEntry>,
}

/// Entry counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub failed: usize,
    pub quarantined: usize,
}

impl QueueCounts {
    /// Every retained entry. Failed and quarantined entries still count as
    /// outstanding work.
    pub fn total(&self) -> usize {
        self.pending + self.failed + self.quarantined
    }
}

/// Durable FIFO log of mutations, backed by the store's `sync_queue` table.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    store: Store,
}

impl SyncQueue {
    /// Create a queue view over an open store.
    pub fn new(store: Store) -> Self {
        SyncQueue { store }
    }

    /// The store this queue persists into.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Persist a new entry and mark the referenced record unsynced.
    ///
    /// A Temp-ID record accepts a single create; updates and deletes for a
    /// Temp ID are only accepted after its create has been enqueued.
    pub async fn enqueue(
        &self,
        operation: OpKind,
        collection: Collection,
        record_id: &str,
        payload: Value,
    ) -> Result<QueueEntry> {
        let record_id = record_id.to_string();
        self.store
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let entry = insert_entry(&tx, operation, collection, &record_id, payload)?;
                tx.commit()?;
                Ok(entry)
            })
            .await
    }

    /// Store a record created offline and queue its create, atomically.
    pub async fn stage_create(&self, collection: Collection, record: Record) -> Result<QueueEntry> {
        self.store
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                put_record(&tx, collection, &record)?;
                let payload = Value::Object(record.fields.clone());
                let entry = insert_entry(&tx, OpKind::Create, collection, &record.id, payload)?;
                tx.commit()?;
                Ok(entry)
            })
            .await
    }

    /// Merge `patch` into a stored record and queue the update, atomically.
    ///
    /// Fails with [`Error::NotFound`] when the record is not stored locally.
    pub async fn stage_update(
        &self,
        collection: Collection,
        id: &str,
        patch: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Record> {
        let id = id.to_string();
        self.store
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let mut record = get_record(&tx, collection, &id)?
                    .ok_or_else(|| Error::not_found(collection.as_str(), &id))?;
                record.apply_patch(&patch, now);
                put_record(&tx, collection, &record)?;
                insert_entry(&tx, OpKind::Update, collection, &id, Value::Object(patch))?;
                tx.commit()?;
                Ok(record)
            })
            .await
    }

    /// Remove a record locally and queue its delete, atomically.
    ///
    /// A Temp-ID record the remote has never seen is dropped together with
    /// every entry for it and nothing is queued. Returns the queued entry.
    pub async fn stage_delete(&self, collection: Collection, id: &str) -> Result<Option<QueueEntry>> {
        let id = id.to_string();
        self.store
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                delete_record(&tx, collection, &id)?;
                let entry = if is_temp_id(&id) {
                    let cancelled = tx.execute(
                        "DELETE FROM sync_queue WHERE collection = ?1 AND record_id = ?2",
                        params![collection.as_str(), id],
                    )?;
                    tracing::debug!(%collection, id = %id, cancelled, "dropped unsent record");
                    None
                } else {
                    Some(insert_entry(&tx, OpKind::Delete, collection, &id, Value::Null)?)
                };
                tx.commit()?;
                Ok(entry)
            })
            .await
    }

    /// Load pending entries in FIFO order, quarantining rows that do not decode.
    pub async fn load_pending(&self) -> Result<PendingBatch> {
        self.store
            .with_conn(|conn| {
                let rows = select_rows(conn, "WHERE state = 'pending'", &[])?;
                let mut batch = PendingBatch::default();
                for row in rows {
                    match row.decode() {
                        Ok(entry) => batch.entries.push(entry),
                        Err(reason) => {
                            tracing::error!(entry = %row.id, %reason, "quarantining corrupt queue entry");
                            quarantine_row(conn, &row.id, &reason)?;
                            batch.corrupt.push(CorruptEntry { id: row.id, reason });
                        }
                    }
                }
                Ok(batch)
            })
            .await
    }

    /// Pending entries in FIFO order.
    pub async fn pending(&self) -> Result<Vec<QueueEntry>> {
        Ok(self.load_pending().await?.entries)
    }

    /// Entries in the failed-terminal state, oldest first.
    pub async fn failed(&self) -> Result<Vec<QueueEntry>> {
        self.decoded_where("WHERE state = 'failed'").await
    }

    /// Every decodable entry regardless of state, in FIFO order.
    pub async fn all(&self) -> Result<Vec<QueueEntry>> {
        self.decoded_where("WHERE state != 'quarantined'").await
    }

    /// Quarantined rows with the reason they were set aside.
    pub async fn quarantined(&self) -> Result<Vec<CorruptEntry>> {
        self.store
            .with_conn(|conn| {
                let rows = select_rows(conn, "WHERE state = 'quarantined'", &[])?;
                Ok(rows
                    .into_iter()
                    .map(|row| CorruptEntry {
                        reason: row.last_error.unwrap_or_default(),
                        id: row.id,
                    })
                    .collect())
            })
            .await
    }

    /// Fetch one entry by id.
    pub async fn get(&self, id: &str) -> Result<Option<QueueEntry>> {
        let id = id.to_string();
        self.store
            .with_conn(move |conn| {
                let rows = select_rows(conn, "WHERE id = ?1", &[&id])?;
                match rows.into_iter().next() {
                    Some(row) => row
                        .decode()
                        .map(Some)
                        .map_err(|reason| Error::QueueCorrupt { id: row.id, reason }),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Entries referencing one record, in FIFO order.
    pub async fn entries_for(&self, collection: Collection, record_id: &str) -> Result<Vec<QueueEntry>> {
        let record_id = record_id.to_string();
        self.store
            .with_conn(move |conn| {
                let rows = select_rows(
                    conn,
                    "WHERE collection = ?1 AND record_id = ?2",
                    &[&collection.as_str(), &record_id],
                )?;
                rows.into_iter()
                    .map(|row| {
                        row.decode()
                            .map_err(|reason| Error::QueueCorrupt { id: row.id, reason })
                    })
                    .collect()
            })
            .await
    }

    /// Entry counts by state.
    pub async fn counts(&self) -> Result<QueueCounts> {
        self.store
            .with_conn(|conn| {
                let mut stmt =
                    conn.prepare("SELECT state, COUNT(*) FROM sync_queue GROUP BY state")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                let mut counts = QueueCounts::default();
                for row in rows {
                    let (state, n) = row?;
                    let n = usize::try_from(n).unwrap_or(0);
                    match state.as_str() {
                        "pending" => counts.pending += n,
                        "failed" => counts.failed += n,
                        _ => counts.quarantined += n,
                    }
                }
                Ok(counts)
            })
            .await
    }

    /// Number of retained entries (pending, failed and quarantined).
    pub async fn len(&self) -> Result<usize> {
        Ok(self.counts().await?.total())
    }

    /// Check if the queue holds no entries at all.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Finish a successful create: move the record from its Temp ID to the
    /// server id, point later entries at the server id and remove the entry.
    ///
    /// When later entries for the record remain, the local body (which
    /// already reflects those edits) is kept over the server copy and the
    /// record stays unsynced. Returns the stored record.
    ///
    /// If the entry was cancelled while the create was in flight (the record
    /// was deleted locally), nothing is stored and a delete of the server id
    /// is queued instead; `None` is returned.
    pub async fn complete_create(&self, entry: &QueueEntry, server: Record) -> Result<Option<Record>> {
        let entry = entry.clone();
        self.store
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let collection = entry.collection;
                let temp_id = entry.record_id.as_str();
                let server_id = server.id.clone();

                let removed = tx.execute("DELETE FROM sync_queue WHERE id = ?1", [&entry.id])?;
                if removed == 0 {
                    delete_record(&tx, collection, temp_id)?;
                    insert_entry(&tx, OpKind::Delete, collection, &server_id, Value::Null)?;
                    tx.commit()?;
                    tracing::info!(%collection, temp_id = %entry.record_id, %server_id, "create confirmed after local delete, queued remote delete");
                    return Ok(None);
                }

                let local = get_record(&tx, collection, temp_id)?;
                if temp_id != server_id {
                    delete_record(&tx, collection, temp_id)?;
                    tx.execute(
                        "UPDATE sync_queue SET record_id = ?1
                         WHERE collection = ?2 AND record_id = ?3",
                        params![server_id, collection.as_str(), temp_id],
                    )?;
                }

                let stored = merge_for_store(&tx, collection, server, local)?;
                if let Some(stored) = &stored {
                    put_record(&tx, collection, stored)?;
                    refresh_synced(&tx, collection, &server_id)?;
                }
                let stored = match get_record(&tx, collection, &server_id)? {
                    Some(record) => Some(record),
                    None => stored,
                };
                tx.commit()?;

                tracing::debug!(%collection, temp_id = %entry.record_id, %server_id, "remapped record");
                Ok(stored)
            })
            .await
    }

    /// Finish a successful update or delete.
    ///
    /// A server copy, when given, is mirrored locally only if no later entry
    /// still references the record.
    pub async fn complete(&self, entry: &QueueEntry, server: Option<Record>) -> Result<()> {
        let entry = entry.clone();
        self.store
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let collection = entry.collection;
                tx.execute("DELETE FROM sync_queue WHERE id = ?1", [&entry.id])?;

                match (entry.operation, server) {
                    (OpKind::Delete, _) => {
                        delete_record(&tx, collection, &entry.record_id)?;
                    }
                    (_, Some(server)) => {
                        let local = get_record(&tx, collection, &entry.record_id)?;
                        if let Some(stored) = merge_for_store(&tx, collection, server, local)? {
                            put_record(&tx, collection, &stored)?;
                        }
                    }
                    (_, None) => {}
                }
                refresh_synced(&tx, collection, &entry.record_id)?;
                tx.commit()?;
                Ok(())
            })
            .await
    }

    /// Record a failed dispatch.
    ///
    /// Every failure counts against the retry budget. A retryable failure
    /// leaves the entry pending until `retry_count` exceeds `max_retries`;
    /// a terminal failure marks it failed at once. Returns the new state.
    pub async fn record_failure(
        &self,
        entry_id: &str,
        error: &str,
        retryable: bool,
        max_retries: u32,
    ) -> Result<EntryState> {
        let entry_id = entry_id.to_string();
        let error = error.to_string();
        self.store
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let retry_count: u32 = tx
                    .query_row(
                        "SELECT retry_count FROM sync_queue WHERE id = ?1",
                        [&entry_id],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or_else(|| Error::EntryNotFound(entry_id.clone()))?;

                let retry_count = retry_count.saturating_add(1);
                let state = if retryable && retry_count <= max_retries {
                    EntryState::Pending
                } else {
                    EntryState::Failed
                };
                tx.execute(
                    "UPDATE sync_queue SET retry_count = ?1, last_error = ?2, state = ?3 WHERE id = ?4",
                    params![retry_count, error, state.as_str(), entry_id],
                )?;
                tx.commit()?;
                Ok(state)
            })
            .await
    }

    /// Return a failed entry to the pending state with a fresh retry budget.
    pub async fn retry_failed(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.store
            .with_conn(move |conn| {
                let n = conn.execute(
                    "UPDATE sync_queue SET state = 'pending', retry_count = 0
                     WHERE id = ?1 AND state = 'failed'",
                    [&id],
                )?;
                if n == 0 {
                    return Err(Error::EntryNotFound(id));
                }
                Ok(())
            })
            .await
    }

    /// Return every failed entry to the pending state. Returns how many moved.
    pub async fn retry_all_failed(&self) -> Result<usize> {
        self.store
            .with_conn(|conn| {
                Ok(conn.execute(
                    "UPDATE sync_queue SET state = 'pending', retry_count = 0 WHERE state = 'failed'",
                    [],
                )?)
            })
            .await
    }

    /// Explicitly remove a failed or quarantined entry after manual review.
    ///
    /// Pending entries cannot be discarded. The referenced record's synced
    /// flag is recomputed.
    pub async fn discard(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.store
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let target: Option<(String, String)> = tx
                    .query_row(
                        "SELECT collection, record_id FROM sync_queue
                         WHERE id = ?1 AND state != 'pending'",
                        [&id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                let Some((collection, record_id)) = target else {
                    return Err(Error::EntryNotFound(id));
                };
                tx.execute("DELETE FROM sync_queue WHERE id = ?1", [&id])?;
                if let Ok(collection) = collection.parse::<Collection>() {
                    refresh_synced(&tx, collection, &record_id)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    async fn decoded_where(&self, clause: &'static str) -> Result<Vec<QueueEntry>> {
        self.store
            .with_conn(move |conn| {
                let rows = select_rows(conn, clause, &[])?;
                Ok(rows.into_iter().filter_map(|row| row.decode().ok()).collect())
            })
            .await
    }
}

/// Pick the body to store once the remote confirmed a mutation.
///
/// With no dependent entries left the server copy wins. Otherwise the local
/// fields are laid over the server fields so queued edits stay visible. A
/// record removed locally while entries remain (a queued delete) is not
/// brought back.
fn merge_for_store(
    conn: &Connection,
    collection: Collection,
    server: Record,
    local: Option<Record>,
) -> Result<Option<Record>> {
    let dependents: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sync_queue WHERE collection = ?1 AND record_id = ?2",
        params![collection.as_str(), server.id],
        |row| row.get(0),
    )?;
    if dependents == 0 {
        return Ok(Some(Record {
            synced: true,
            ..server
        }));
    }

    let Some(local) = local else {
        return Ok(None);
    };
    let mut merged = server;
    merged.fields.extend(local.fields);
    merged.updated_at = local.updated_at;
    merged.synced = false;
    Ok(Some(merged))
}

/// Insert a pending entry and mark the referenced record unsynced.
fn insert_entry(
    conn: &Connection,
    operation: OpKind,
    collection: Collection,
    record_id: &str,
    payload: Value,
) -> Result<QueueEntry> {
    if is_temp_id(record_id) {
        let creates: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue
             WHERE collection = ?1 AND record_id = ?2 AND operation = 'create'",
            params![collection.as_str(), record_id],
            |row| row.get(0),
        )?;
        match (operation, creates) {
            (OpKind::Create, n) if n > 0 => {
                return Err(Error::InvalidInput(format!(
                    "{collection}/{record_id} already has a pending create"
                )))
            }
            (OpKind::Update | OpKind::Delete, 0) => {
                return Err(Error::InvalidInput(format!(
                    "cannot {operation} {collection}/{record_id} before its create is queued"
                )))
            }
            _ => {}
        }
    }

    let id = generate_entry_id();
    let enqueued_at = Utc::now().trunc_subsecs(3);
    conn.execute(
        "INSERT INTO sync_queue
         (id, operation, collection, record_id, payload, enqueued_at, retry_count, state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 'pending')",
        params![
            id,
            operation.as_str(),
            collection.as_str(),
            record_id,
            serde_json::to_string(&payload)?,
            enqueued_at.timestamp_millis(),
        ],
    )?;
    let seq = conn.last_insert_rowid();
    conn.execute(
        &format!("UPDATE {} SET synced = 0 WHERE id = ?1", collection.as_str()),
        [record_id],
    )?;

    tracing::debug!(%operation, %collection, record_id, seq, "enqueued");
    Ok(QueueEntry {
        id,
        seq,
        operation,
        collection,
        record_id: record_id.to_string(),
        payload,
        enqueued_at,
        retry_count: 0,
        last_error: None,
        state: EntryState::Pending,
    })
}

fn quarantine_row(conn: &Connection, id: &str, reason: &str) -> Result<()> {
    conn.execute(
        "UPDATE sync_queue SET state = 'quarantined', last_error = ?1 WHERE id = ?2",
        params![reason, id],
    )?;
    Ok(())
}

/// A queue row as stored, before interpretation.
struct RawEntry {
    seq: i64,
    id: String,
    operation: String,
    collection: String,
    record_id: String,
    payload: String,
    enqueued_at: i64,
    retry_count: u32,
    last_error: Option<String>,
    state: String,
}

impl RawEntry {
    fn decode(&self) -> std::result::Result<QueueEntry, String> {
        let operation: OpKind = self.operation.parse().map_err(|e: Error| e.to_string())?;
        let collection: Collection = self.collection.parse().map_err(|e: Error| e.to_string())?;
        let state: EntryState = self.state.parse().map_err(|e: Error| e.to_string())?;
        let payload: Value = serde_json::from_str(&self.payload)
            .map_err(|e| format!("invalid payload: {e}"))?;
        let enqueued_at = Utc
            .timestamp_millis_opt(self.enqueued_at)
            .single()
            .ok_or_else(|| format!("invalid enqueued_at {}", self.enqueued_at))?;

        Ok(QueueEntry {
            id: self.id.clone(),
            seq: self.seq,
            operation,
            collection,
            record_id: self.record_id.clone(),
            payload,
            enqueued_at,
            retry_count: self.retry_count,
            last_error: self.last_error.clone(),
            state,
        })
    }
}

fn select_rows(
    conn: &Connection,
    clause: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<RawEntry>> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM sync_queue {clause} ORDER BY seq");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, |row| {
        Ok(RawEntry {
            seq: row.get(0)?,
            id: row.get(1)?,
            operation: row.get(2)?,
            collection: row.get(3)?,
            record_id: row.get(4)?,
            payload: row.get(5)?,
            enqueued_at: row.get(6)?,
            retry_count: row.get(7)?,
            last_error: row.get(8)?,
            state: row.get(9)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
