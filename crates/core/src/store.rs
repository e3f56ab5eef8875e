// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! SQLite-backed local durable store.
//!
//! The [`Store`] keeps one table per [`Collection`] plus the reserved
//! `sync_queue` table. Domain fields live in a JSON `body` column; secondary
//! indexes are SQLite expression indexes over `json_extract(body, ...)`, so
//! adding an index never rewrites existing rows.
//!
//! All public operations are async. The connection is shared behind a mutex
//! and the blocking SQLite work runs on tokio's blocking pool.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::collection::{field_expr, Collection, IndexSpec, SCHEMA_VERSION, SYNC_QUEUE_TABLE};
use crate::error::{Error, Result};
use crate::record::Record;

/// Default number of rows fetched per page by an [`IndexScan`].
pub const DEFAULT_SCAN_BATCH: usize = 256;

const RECORD_COLUMNS: &str = "id, body, synced, updated_at, deleted_at";

/// Local durable store over a single SQLite database.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Open the store at the given path, creating and migrating if needed.
    ///
    /// Fails with [`Error::StorageUnavailable`] when no database can be
    /// created at `path`. Callers treat that as "offline capability
    /// disabled", not as a fatal error.
    pub async fn open(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let opened = path.clone();
        let conn = tokio::task::spawn_blocking(move || open_connection(&opened))
            .await
            .map_err(|e| Error::StorageUnavailable(format!("open task failed: {e}")))??;

        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Open an in-memory store (for testing).
    pub async fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().map_err(unavailable)?;
        run_migrations(&mut conn)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Path of the backing database file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure against the connection on the blocking pool.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::StorageUnavailable("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::StorageUnavailable(format!("storage task failed: {e}")))?
    }

    /// Schema version recorded in the database.
    pub async fn schema_version(&self) -> Result<u32> {
        self.with_conn(|conn| Ok(read_user_version(conn)?)).await
    }

    /// Insert or replace a record by id.
    pub async fn put(&self, collection: Collection, record: Record) -> Result<()> {
        self.with_conn(move |conn| put_record(conn, collection, &record))
            .await
    }

    /// Fetch a record by id.
    pub async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let id = id.to_string();
        self.with_conn(move |conn| get_record(conn, collection, &id))
            .await
    }

    /// Fetch every record of a collection, ordered by id.
    pub async fn get_all(&self, collection: Collection) -> Result<Vec<Record>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM {} ORDER BY id",
                collection.as_str()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_record)?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Equality lookup through a declared secondary index.
    ///
    /// Composite indexes take a JSON array with one value per indexed field.
    pub async fn query_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: Value,
    ) -> Result<Vec<Record>> {
        let spec = collection.index(index)?;
        let values = match (spec.is_composite(), value) {
            (true, Value::Array(values)) if values.len() == spec.fields.len() => values,
            (true, other) => {
                return Err(Error::InvalidInput(format!(
                    "index '{}' expects an array of {} values, got {other}",
                    spec.name,
                    spec.fields.len()
                )))
            }
            (false, value) => vec![value],
        };

        self.with_conn(move |conn| {
            let mut clauses = Vec::new();
            let mut args = Vec::new();
            for (expr, value) in spec.key_exprs().into_iter().zip(values.iter()) {
                if value.is_null() {
                    clauses.push(format!("{expr} IS NULL"));
                } else {
                    args.push(to_sql_value(value));
                    clauses.push(format!("{expr} = ?{}", args.len()));
                }
            }
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM {} WHERE {} ORDER BY id",
                collection.as_str(),
                clauses.join(" AND ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args), row_to_record)?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Records not yet confirmed against the remote collaborator.
    pub async fn unsynced(&self, collection: Collection) -> Result<Vec<Record>> {
        self.query_by_index(collection, "synced", Value::Bool(false))
            .await
    }

    /// Lazily iterate records ordered by a single-field index.
    pub fn scan_by_index(
        &self,
        collection: Collection,
        index: &str,
        range: ScanRange,
    ) -> Result<IndexScan> {
        let spec = collection.index(index)?;
        if spec.is_composite() {
            return Err(Error::InvalidInput(format!(
                "cannot range-scan composite index '{}'",
                spec.name
            )));
        }
        Ok(IndexScan {
            store: self.clone(),
            collection,
            spec,
            range,
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
            batch_size: DEFAULT_SCAN_BATCH,
        })
    }

    /// Delete a record by id. Returns true if a record was removed.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| delete_record(conn, collection, &id))
            .await
    }

    /// Delete a record only if it is synced and was last updated at or
    /// before `cutoff`. The check and the delete are one statement, so a
    /// record changed in the meantime is kept. Returns true if it was removed.
    pub async fn evict_if_stale(
        &self,
        collection: Collection,
        id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let n = conn.execute(
                &format!(
                    "DELETE FROM {} WHERE id = ?1 AND synced = 1 AND updated_at <= ?2",
                    collection.as_str()
                ),
                params![id, cutoff.timestamp_millis()],
            )?;
            Ok(n > 0)
        })
        .await
    }

    /// Remove every record of a collection.
    pub async fn clear(&self, collection: Collection) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(&format!("DELETE FROM {}", collection.as_str()), [])?;
            Ok(())
        })
        .await
    }

    /// Number of records in a collection.
    pub async fn count(&self, collection: Collection) -> Result<usize> {
        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", collection.as_str()),
                [],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(n).unwrap_or(0))
        })
        .await
    }
}

/// Inclusive bounds for an index scan. `None` leaves the side open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRange {
    pub lower: Option<Value>,
    pub upper: Option<Value>,
}

impl ScanRange {
    /// Every non-null key.
    pub fn all() -> Self {
        Self::default()
    }

    /// Keys less than or equal to `upper`.
    pub fn up_to(upper: Value) -> Self {
        ScanRange {
            lower: None,
            upper: Some(upper),
        }
    }

    /// Keys between `lower` and `upper`, both inclusive.
    pub fn between(lower: Value, upper: Value) -> Self {
        ScanRange {
            lower: Some(lower),
            upper: Some(upper),
        }
    }
}

/// Position of an [`IndexScan`]: the last `(key, id)` pair yielded.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanCursor {
    key: SqlValue,
    id: String,
}

/// Lazy, restartable sequence of records ordered by an index key.
///
/// Pages are fetched with keyset pagination on `(key, id)`, so records may
/// be deleted while the scan is in progress. Records whose key is null are
/// not visited.
pub struct IndexScan {
    store: Store,
    collection: Collection,
    spec: &'static IndexSpec,
    range: ScanRange,
    cursor: Option<ScanCursor>,
    buffer: VecDeque<(Record, ScanCursor)>,
    exhausted: bool,
    batch_size: usize,
}

impl IndexScan {
    /// Set the page size used when fetching from the store.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Continue from a previously saved cursor.
    pub fn resume_from(mut self, cursor: ScanCursor) -> Self {
        self.cursor = Some(cursor);
        self.buffer.clear();
        self.exhausted = false;
        self
    }

    /// Cursor after the last yielded record.
    pub fn cursor(&self) -> Option<ScanCursor> {
        self.cursor.clone()
    }

    /// Start the scan over from the beginning of the range.
    pub fn rewind(&mut self) {
        self.cursor = None;
        self.buffer.clear();
        self.exhausted = false;
    }

    /// Yield the next record, fetching a new page when needed.
    pub async fn next(&mut self) -> Result<Option<Record>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }
        match self.buffer.pop_front() {
            Some((record, cursor)) => {
                self.cursor = Some(cursor);
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn fill(&mut self) -> Result<()> {
        let table = self.collection.as_str();
        let expr = field_expr(self.spec.fields[0]);
        let range = self.range.clone();
        let cursor = self.cursor.clone();
        let limit = self.batch_size;

        let page = self
            .store
            .with_conn(move |conn| {
                let mut clauses = vec![format!("{expr} IS NOT NULL")];
                let mut args: Vec<SqlValue> = Vec::new();
                if let Some(lower) = &range.lower {
                    args.push(to_sql_value(lower));
                    clauses.push(format!("{expr} >= ?{}", args.len()));
                }
                if let Some(upper) = &range.upper {
                    args.push(to_sql_value(upper));
                    clauses.push(format!("{expr} <= ?{}", args.len()));
                }
                if let Some(c) = cursor {
                    args.push(c.key);
                    let k = args.len();
                    args.push(SqlValue::Text(c.id));
                    let i = args.len();
                    clauses.push(format!("({expr} > ?{k} OR ({expr} = ?{k} AND id > ?{i}))"));
                }
                let sql = format!(
                    "SELECT {RECORD_COLUMNS}, {expr} FROM {table} WHERE {} ORDER BY {expr}, id LIMIT {limit}",
                    clauses.join(" AND ")
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
                    let record = row_to_record(row)?;
                    let key: SqlValue = row.get(5)?;
                    let id = record.id.clone();
                    Ok((record, ScanCursor { key, id }))
                })?;
                Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
            })
            .await?;

        if page.len() < self.batch_size {
            self.exhausted = true;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

/// Open (creating if needed) and migrate a database file.
fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::StorageUnavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
    }

    let mut conn = Connection::open(path).map_err(unavailable)?;
    conn.execute_batch(
        "PRAGMA busy_timeout = 5000;
         PRAGMA journal_mode = WAL;",
    )
    .map_err(unavailable)?;

    run_migrations(&mut conn)?;
    Ok(conn)
}

/// Map errors that mean "there is no usable durable storage here".
fn unavailable(e: rusqlite::Error) -> Error {
    use rusqlite::ErrorCode;
    match e.sqlite_error_code() {
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::ReadOnly
            | ErrorCode::PermissionDenied
            | ErrorCode::NotADatabase
            | ErrorCode::SystemIoFailure
            | ErrorCode::DiskFull,
        ) => Error::StorageUnavailable(e.to_string()),
        _ => Error::Database(e),
    }
}

fn read_user_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Apply every migration above the stored schema version.
///
/// Migrations are additive only: they create tables and indexes and never
/// drop or rename anything. The version is re-read inside an IMMEDIATE
/// transaction so concurrent openers of one file apply each step once.
/// Returns the version the database is at afterwards.
pub fn run_migrations(conn: &mut Connection) -> Result<u32> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(unavailable)?;
    let current = read_user_version(&tx)?;

    if current > SCHEMA_VERSION {
        tracing::warn!(
            current,
            declared = SCHEMA_VERSION,
            "store schema is newer than this build; leaving it untouched"
        );
        return Ok(current);
    }

    for version in (current + 1)..=SCHEMA_VERSION {
        tracing::debug!(version, "applying store migration");
        apply_version(&tx, version)?;
    }
    if current < SCHEMA_VERSION {
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    tx.commit()?;
    Ok(SCHEMA_VERSION.max(current))
}

fn apply_version(conn: &Connection, version: u32) -> Result<()> {
    if version == 1 {
        conn.execute_batch(SYNC_QUEUE_SCHEMA)?;
    }

    for collection in Collection::ALL {
        if collection.since_version() == version {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    body TEXT NOT NULL,
                    synced INTEGER NOT NULL DEFAULT 0,
                    updated_at INTEGER NOT NULL,
                    deleted_at INTEGER
                );",
                collection.as_str()
            ))?;
        }
        for index in collection.indexes().iter().filter(|i| i.since == version) {
            let table = collection.as_str();
            conn.execute_batch(&format!(
                "CREATE {unique}INDEX IF NOT EXISTS idx_{table}_{name} ON {table}({exprs});",
                unique = if index.unique { "UNIQUE " } else { "" },
                name = index.name,
                exprs = index.key_exprs().join(", "),
            ))?;
        }
    }
    Ok(())
}

/// SQL schema for the reserved sync queue table.
const SYNC_QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_queue (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    operation TEXT NOT NULL,
    collection TEXT NOT NULL,
    record_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    enqueued_at INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    state TEXT NOT NULL DEFAULT 'pending'
);

CREATE INDEX IF NOT EXISTS idx_sync_queue_enqueued_at ON sync_queue(enqueued_at);
CREATE INDEX IF NOT EXISTS idx_sync_queue_retry_count ON sync_queue(retry_count);
CREATE INDEX IF NOT EXISTS idx_sync_queue_collection ON sync_queue(collection);
CREATE INDEX IF NOT EXISTS idx_sync_queue_record ON sync_queue(collection, record_id);
CREATE INDEX IF NOT EXISTS idx_sync_queue_state ON sync_queue(state);
"#;

/// Convert a JSON scalar into the SQLite value `json_extract` would yield.
pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(Error::InvalidInput(message)),
    )
}

fn millis_to_datetime(ms: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| conversion_error(column, format!("invalid timestamp {ms}")))
}

/// Build a record from a row selected with `RECORD_COLUMNS`.
pub(crate) fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let id: String = row.get(0)?;
    let body: String = row.get(1)?;
    let fields: Map<String, Value> = serde_json::from_str(&body)
        .map_err(|e| conversion_error(1, format!("invalid body for record '{id}': {e}")))?;
    let synced: bool = row.get(2)?;
    let updated_at = millis_to_datetime(row.get(3)?, 3)?;
    let deleted_at = match row.get::<_, Option<i64>>(4)? {
        Some(ms) => Some(millis_to_datetime(ms, 4)?),
        None => None,
    };

    Ok(Record {
        id,
        fields,
        synced,
        updated_at,
        deleted_at,
    })
}

pub(crate) fn put_record(conn: &Connection, collection: Collection, record: &Record) -> Result<()> {
    let body = serde_json::to_string(&record.fields)?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {} ({RECORD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)",
            collection.as_str()
        ),
        params![
            record.id,
            body,
            record.synced,
            record.updated_at.timestamp_millis(),
            record.deleted_at.map(|t| t.timestamp_millis()),
        ],
    )?;
    Ok(())
}

pub(crate) fn get_record(
    conn: &Connection,
    collection: Collection,
    id: &str,
) -> Result<Option<Record>> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM {} WHERE id = ?1",
                collection.as_str()
            ),
            [id],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

pub(crate) fn delete_record(conn: &Connection, collection: Collection, id: &str) -> Result<bool> {
    let n = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", collection.as_str()),
        [id],
    )?;
    Ok(n > 0)
}

/// Set a record's synced flag from whether any queue entry still references it.
pub(crate) fn refresh_synced(conn: &Connection, collection: Collection, id: &str) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE {table} SET synced = NOT EXISTS (
                 SELECT 1 FROM {SYNC_QUEUE_TABLE} q
                 WHERE q.collection = ?1 AND q.record_id = ?2
             )
             WHERE id = ?2",
            table = collection.as_str()
        ),
        params![collection.as_str(), id],
    )?;
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
