// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Remote collaborator abstraction.
//!
//! Provides a trait-based seam over the source of truth that enables:
//! - A REST client for production ([`HttpRemote`])
//! - In-memory doubles for unit testing

mod http;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use fl_core::{Collection, Error};
use serde_json::{Map, Value};

use crate::query::Query;

pub use http::HttpRemote;

/// Classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The request never reached the remote.
    Network,
    /// The request was sent but no answer arrived in time.
    Timeout,
    /// The remote answered with a transient server-side failure.
    Server,
    /// The remote refused the request as invalid. Retrying will not help.
    Rejected,
    /// The target record does not exist remotely.
    NotFound,
    /// Credentials are missing or expired.
    AuthExpired,
}

/// Failure reported by a [`Remote`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteErrorKind::Network => "network error",
            RemoteErrorKind::Timeout => "timed out",
            RemoteErrorKind::Server => "server error",
            RemoteErrorKind::Rejected => "rejected",
            RemoteErrorKind::NotFound => "not found",
            RemoteErrorKind::AuthExpired => "authentication expired",
        };
        write!(f, "{s}")
    }
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        RemoteError {
            kind,
            message: message.into(),
        }
    }

    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::Network | RemoteErrorKind::Timeout | RemoteErrorKind::Server
        )
    }

    /// Whether the failure means the device lost connectivity.
    pub fn is_network(&self) -> bool {
        matches!(self.kind, RemoteErrorKind::Network | RemoteErrorKind::Timeout)
    }

    /// Convert into the core error taxonomy.
    pub fn into_error(self, collection: Collection, id: Option<&str>) -> Error {
        match (self.kind, id) {
            (RemoteErrorKind::AuthExpired, _) => Error::AuthExpired(self.message),
            (RemoteErrorKind::NotFound, Some(id)) => Error::not_found(collection.as_str(), id),
            _ => Error::RemoteError(self.to_string()),
        }
    }
}

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Boxed future returned by [`Remote`] methods.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

/// CRUD surface of the remote source of truth.
///
/// Rows travel as JSON objects. Every successful mutation returns the row as
/// the remote stored it, including any server-assigned `id`.
pub trait Remote: Send + Sync {
    /// Create a row. `idempotency_key` lets the remote collapse replays of
    /// the same create into one row.
    fn insert(
        &self,
        collection: Collection,
        data: Map<String, Value>,
        idempotency_key: Option<String>,
    ) -> RemoteFuture<'_, Value>;

    /// Shallow-merge `patch` into the row with `id`.
    fn update(
        &self,
        collection: Collection,
        id: String,
        patch: Map<String, Value>,
    ) -> RemoteFuture<'_, Value>;

    /// Delete the row with `id`.
    fn delete(&self, collection: Collection, id: String) -> RemoteFuture<'_, ()>;

    /// Fetch rows matching `query`.
    fn select(&self, collection: Collection, query: Query) -> RemoteFuture<'_, Vec<Value>>;
}
