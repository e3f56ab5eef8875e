// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fl_core::{Collection, QueueCounts, SyncQueue};
use serde::Serialize;

use super::{load_config, open_store, print_json};
use crate::cli::OutputFormat;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct CollectionStatus {
    cached: usize,
    unsynced: usize,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    config: PathBuf,
    database: PathBuf,
    schema_version: u32,
    remote: Option<String>,
    queue: QueueCounts,
    collections: BTreeMap<&'static str, CollectionStatus>,
}

pub async fn run(config_path: &Path, output: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;

    let mut collections = BTreeMap::new();
    for collection in Collection::ALL {
        collections.insert(
            collection.as_str(),
            CollectionStatus {
                cached: store.count(collection).await?,
                unsynced: store.unsynced(collection).await?.len(),
            },
        );
    }
    let report = StatusReport {
        config: config_path.to_path_buf(),
        database: config.database.clone(),
        schema_version: store.schema_version().await?,
        remote: config.remote.as_ref().map(|r| r.url.clone()),
        queue: SyncQueue::new(store).counts().await?,
        collections,
    };

    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            print_text(&report);
            Ok(())
        }
    }
}

fn print_text(report: &StatusReport) {
    println!("Config:   {}", report.config.display());
    println!(
        "Database: {} (schema v{})",
        report.database.display(),
        report.schema_version
    );
    println!("Remote:   {}", report.remote.as_deref().unwrap_or("none"));
    println!(
        "Queue:    {} pending, {} failed, {} quarantined",
        report.queue.pending, report.queue.failed, report.queue.quarantined
    );
    println!();
    for (name, status) in &report.collections {
        if status.cached == 0 {
            continue;
        }
        println!(
            "  {:<15} {:>6} cached  {:>4} unsynced",
            name, status.cached, status.unsynced
        );
    }
}
