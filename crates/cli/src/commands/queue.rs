// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

use std::path::Path;

use fl_core::{CorruptEntry, QueueEntry};
use serde::Serialize;

use super::{open_queue, print_json};
use crate::cli::OutputFormat;
use crate::display::{format_corrupt, format_entry};
use crate::error::Result;

#[derive(Serialize)]
struct QueueListing {
    entries: Vec<QueueEntry>,
    quarantined: Vec<CorruptEntry>,
}

pub async fn run(config_path: &Path, failed_only: bool, output: OutputFormat) -> Result<()> {
    let queue = open_queue(config_path).await?;
    let listing = if failed_only {
        QueueListing {
            entries: queue.failed().await?,
            quarantined: Vec::new(),
        }
    } else {
        QueueListing {
            entries: queue.all().await?,
            quarantined: queue.quarantined().await?,
        }
    };

    if output == OutputFormat::Json {
        return print_json(&listing);
    }
    if listing.entries.is_empty() && listing.quarantined.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }
    for entry in &listing.entries {
        println!("{}", format_entry(entry));
    }
    for corrupt in &listing.quarantined {
        println!("{}", format_corrupt(corrupt));
    }
    Ok(())
}
