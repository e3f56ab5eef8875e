// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Registry of the entity collections mirrored in the local store.
//!
//! The set of collections is closed: every supported entity type is a
//! [`Collection`] variant, and each variant declares the secondary indexes
//! its table carries and the schema version that introduced them. The
//! migration runner in [`crate::store`] is driven entirely by these
//! descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Current schema version of the local store.
pub const SCHEMA_VERSION: u32 = 2;

/// Name of the reserved table holding the sync queue.
pub const SYNC_QUEUE_TABLE: &str = "sync_queue";

/// A secondary index declared on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name, used by callers of `query_by_index`.
    pub name: &'static str,
    /// Indexed fields. More than one field makes a composite index.
    pub fields: &'static [&'static str],
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Schema version that introduced the index.
    pub since: u32,
}

impl IndexSpec {
    const fn new(name: &'static str, fields: &'static [&'static str], since: u32) -> Self {
        IndexSpec {
            name,
            fields,
            unique: false,
            since,
        }
    }

    const fn unique(name: &'static str, fields: &'static [&'static str], since: u32) -> Self {
        IndexSpec {
            name,
            fields,
            unique: true,
            since,
        }
    }

    /// Returns true if the index spans more than one field.
    pub fn is_composite(&self) -> bool {
        self.fields.len() > 1
    }

    /// SQL expressions for the indexed fields, in declaration order.
    ///
    /// `synced` and `updated_at` live in real columns; every other field is
    /// extracted from the JSON body.
    pub fn key_exprs(&self) -> Vec<String> {
        self.fields.iter().map(|f| field_expr(f)).collect()
    }
}

/// SQL expression selecting a record field.
pub(crate) fn field_expr(field: &str) -> String {
    match field {
        "id" | "synced" | "updated_at" | "deleted_at" => field.to_string(),
        other => format!("json_extract(body, '$.{other}')"),
    }
}

const SYNCED: IndexSpec = IndexSpec::new("synced", &["synced"], 1);
const UPDATED_AT: IndexSpec = IndexSpec::new("updated_at", &["updated_at"], 1);
const COMPANY: IndexSpec = IndexSpec::new("company_id", &["company_id"], 1);

const JOB_INDEXES: &[IndexSpec] = &[SYNCED, UPDATED_AT, COMPANY];

const INVOICE_INDEXES: &[IndexSpec] = &[SYNCED, UPDATED_AT, COMPANY];

const CUSTOMER_INDEXES: &[IndexSpec] = &[
    UPDATED_AT,
    IndexSpec::new("email", &["email"], 1),
    IndexSpec::new("phone", &["phone"], 1),
    IndexSpec::new("synced", &["synced"], 2),
    IndexSpec::new("company_id", &["company_id"], 2),
    IndexSpec::new("status", &["status"], 2),
];

const COMMUNICATION_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("synced", &["synced"], 2),
    IndexSpec::new("updated_at", &["updated_at"], 2),
    IndexSpec::new("company_id", &["company_id"], 2),
    IndexSpec::new("customer_id", &["customer_id"], 2),
    IndexSpec::new("type", &["type"], 2),
    IndexSpec::new("thread_id", &["thread_id"], 2),
    IndexSpec::new("created_at", &["created_at"], 2),
];

const PAYMENT_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("synced", &["synced"], 2),
    IndexSpec::new("updated_at", &["updated_at"], 2),
    IndexSpec::new("company_id", &["company_id"], 2),
    IndexSpec::new("customer_id", &["customer_id"], 2),
    IndexSpec::new("invoice_id", &["invoice_id"], 2),
    IndexSpec::unique("payment_number", &["payment_number"], 2),
    IndexSpec::new("status", &["status"], 2),
];

const EQUIPMENT_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("synced", &["synced"], 2),
    IndexSpec::new("updated_at", &["updated_at"], 2),
    IndexSpec::new("company_id", &["company_id"], 2),
    IndexSpec::new("customer_id", &["customer_id"], 2),
    IndexSpec::unique("equipment_number", &["equipment_number"], 2),
    IndexSpec::new("type", &["type"], 2),
    IndexSpec::new("status", &["status"], 2),
];

const SCHEDULE_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("synced", &["synced"], 2),
    IndexSpec::new("updated_at", &["updated_at"], 2),
    IndexSpec::new("company_id", &["company_id"], 2),
    IndexSpec::new("customer_id", &["customer_id"], 2),
    IndexSpec::new("job_id", &["job_id"], 2),
    IndexSpec::new("assigned_to", &["assigned_to"], 2),
    IndexSpec::new("start_time", &["start_time"], 2),
    IndexSpec::new("status", &["status"], 2),
];

const TAG_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("synced", &["synced"], 2),
    IndexSpec::new("updated_at", &["updated_at"], 2),
    IndexSpec::new("company_id", &["company_id"], 2),
    IndexSpec::new("slug", &["slug"], 2),
    IndexSpec::new("category", &["category"], 2),
];

const ATTACHMENT_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("synced", &["synced"], 2),
    IndexSpec::new("updated_at", &["updated_at"], 2),
    IndexSpec::new("company_id", &["company_id"], 2),
    IndexSpec::new("entity_type", &["entity_type"], 2),
    IndexSpec::new("entity_id", &["entity_id"], 2),
    IndexSpec::new("entity", &["entity_type", "entity_id"], 2),
];

/// Entity collections mirrored in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Jobs,
    Invoices,
    Customers,
    Communications,
    Payments,
    Equipment,
    Schedules,
    Tags,
    Attachments,
}

impl Collection {
    /// Every registered collection, in migration order.
    pub const ALL: [Collection; 9] = [
        Collection::Jobs,
        Collection::Invoices,
        Collection::Customers,
        Collection::Communications,
        Collection::Payments,
        Collection::Equipment,
        Collection::Schedules,
        Collection::Tags,
        Collection::Attachments,
    ];

    /// Returns the collection name used in storage and by the remote API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Jobs => "jobs",
            Collection::Invoices => "invoices",
            Collection::Customers => "customers",
            Collection::Communications => "communications",
            Collection::Payments => "payments",
            Collection::Equipment => "equipment",
            Collection::Schedules => "schedules",
            Collection::Tags => "tags",
            Collection::Attachments => "attachments",
        }
    }

    /// All collection names, for help text.
    pub fn names() -> Vec<&'static str> {
        Collection::ALL.iter().map(Collection::as_str).collect()
    }

    /// Schema version in which the collection's table was created.
    pub fn since_version(&self) -> u32 {
        match self {
            Collection::Jobs | Collection::Invoices | Collection::Customers => 1,
            _ => 2,
        }
    }

    /// Secondary indexes declared on this collection.
    pub fn indexes(&self) -> &'static [IndexSpec] {
        match self {
            Collection::Jobs => JOB_INDEXES,
            Collection::Invoices => INVOICE_INDEXES,
            Collection::Customers => CUSTOMER_INDEXES,
            Collection::Communications => COMMUNICATION_INDEXES,
            Collection::Payments => PAYMENT_INDEXES,
            Collection::Equipment => EQUIPMENT_INDEXES,
            Collection::Schedules => SCHEDULE_INDEXES,
            Collection::Tags => TAG_INDEXES,
            Collection::Attachments => ATTACHMENT_INDEXES,
        }
    }

    /// Looks up a declared index by name.
    pub fn index(&self, name: &str) -> Result<&'static IndexSpec> {
        self.indexes()
            .iter()
            .find(|idx| idx.name == name)
            .ok_or_else(|| Error::UnknownIndex {
                collection: self.as_str().to_string(),
                index: name.to_string(),
            })
    }

    /// Finds a single-field index over `field`, if one is declared.
    pub fn index_on(&self, field: &str) -> Option<&'static IndexSpec> {
        self.indexes()
            .iter()
            .find(|idx| idx.fields == [field].as_slice())
    }

    /// Whether synced records of this collection are subject to age-based
    /// eviction. Jobs and invoices are kept for the lifetime of the install.
    pub fn evictable(&self) -> bool {
        !matches!(self, Collection::Jobs | Collection::Invoices)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        Collection::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| Error::UnknownCollection(s.to_string()))
    }
}

#[cfg(test)]
#[path = "collection_tests.rs"]
mod tests;
