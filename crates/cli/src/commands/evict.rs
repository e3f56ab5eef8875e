// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

use std::path::Path;

use chrono::Utc;

use super::{load_config, open_store};
use crate::error::Result;

pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;
    let report = fl_sync::evict_stale(&store, &config.sync, Utc::now()).await?;

    println!(
        "Evicted {} records last updated before {}",
        report.total(),
        report.cutoff.format("%Y-%m-%d %H:%M")
    );
    for (collection, count) in &report.evicted {
        println!("  {collection}: {count}");
    }
    if report.retained_unsynced > 0 {
        println!(
            "Kept {} stale records with unsynced changes",
            report.retained_unsynced
        );
    }
    Ok(())
}
