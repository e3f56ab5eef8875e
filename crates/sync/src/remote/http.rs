// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! REST client for a PostgREST-style endpoint.
//!
//! Each collection maps to `<base>/rest/v1/<collection>`. Rows are selected
//! with `field=eq.value` filters, mutations ask for the stored row back with
//! `Prefer: return=representation`.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Map, Value};

use fl_core::Collection;

use super::{Remote, RemoteError, RemoteErrorKind, RemoteFuture, RemoteResult};
use crate::config::RemoteConfig;
use crate::error::{Result, SyncError};
use crate::query::Query;

const REST_PREFIX: &str = "rest/v1";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// [`Remote`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRemote {
    /// Build a client from the `[remote]` configuration section.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        if let Some(msg) = config.validate_url() {
            return Err(SyncError::Config(msg));
        }
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpRemote {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn table_url(&self, collection: Collection) -> String {
        format!("{}/{REST_PREFIX}/{}", self.base_url, collection.as_str())
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("apikey", key).bearer_auth(key),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> RemoteResult<Response> {
        let response = self.authorize(req).send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }

    async fn rows(response: Response) -> RemoteResult<Vec<Value>> {
        let body: Value = response.json().await.map_err(|e| {
            RemoteError::new(RemoteErrorKind::Server, format!("invalid response body: {e}"))
        })?;
        Ok(match body {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            row => vec![row],
        })
    }

    async fn single_row(response: Response, what: &str) -> RemoteResult<Value> {
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::new(RemoteErrorKind::NotFound, format!("{what} returned no row")))
    }
}

impl Remote for HttpRemote {
    fn insert(
        &self,
        collection: Collection,
        data: Map<String, Value>,
        idempotency_key: Option<String>,
    ) -> RemoteFuture<'_, Value> {
        Box::pin(async move {
            let mut req = self
                .client
                .post(self.table_url(collection))
                .header("Prefer", "return=representation")
                .json(&data);
            if let Some(key) = idempotency_key {
                req = req.header(IDEMPOTENCY_HEADER, key);
            }
            let response = self.send(req).await?;
            Self::single_row(response, &format!("insert into {collection}")).await
        })
    }

    fn update(
        &self,
        collection: Collection,
        id: String,
        patch: Map<String, Value>,
    ) -> RemoteFuture<'_, Value> {
        Box::pin(async move {
            let req = self
                .client
                .patch(self.table_url(collection))
                .query(&[("id", eq_filter(&Value::String(id.clone())))])
                .header("Prefer", "return=representation")
                .json(&patch);
            let response = self.send(req).await?;
            Self::single_row(response, &format!("update of {collection}/{id}")).await
        })
    }

    fn delete(&self, collection: Collection, id: String) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let req = self
                .client
                .delete(self.table_url(collection))
                .query(&[("id", eq_filter(&Value::String(id)))]);
            self.send(req).await?;
            Ok(())
        })
    }

    fn select(&self, collection: Collection, query: Query) -> RemoteFuture<'_, Vec<Value>> {
        Box::pin(async move {
            let mut params: Vec<(String, String)> = vec![("select".into(), "*".into())];
            for (field, value) in &query.filters {
                params.push((field.clone(), eq_filter(value)));
            }
            if let Some(order) = &query.order {
                let dir = if order.ascending { "asc" } else { "desc" };
                params.push(("order".into(), format!("{}.{dir}", order.field)));
            }
            if let Some(limit) = query.limit {
                params.push(("limit".into(), limit.to_string()));
            }

            let req = self.client.get(self.table_url(collection)).query(&params);
            let response = self.send(req).await?;
            Self::rows(response).await
        })
    }
}

/// Encode an equality filter value in PostgREST syntax.
fn eq_filter(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{s}"),
        other => format!("eq.{other}"),
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    let kind = if e.is_timeout() {
        RemoteErrorKind::Timeout
    } else if e.is_connect() || e.is_request() {
        RemoteErrorKind::Network
    } else {
        RemoteErrorKind::Server
    };
    RemoteError::new(kind, e.to_string())
}

fn status_error(status: StatusCode, body: String) -> RemoteError {
    let kind = match status {
        StatusCode::UNAUTHORIZED => RemoteErrorKind::AuthExpired,
        StatusCode::NOT_FOUND => RemoteErrorKind::NotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => RemoteErrorKind::Server,
        s if s.is_server_error() => RemoteErrorKind::Server,
        _ => RemoteErrorKind::Rejected,
    };
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    RemoteError::new(kind, message)
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
