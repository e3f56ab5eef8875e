// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

use std::path::Path;

use super::open_queue;
use crate::error::Result;

/// Move one failed entry, or all of them, back to pending.
pub async fn run(config_path: &Path, id: Option<String>, all: bool) -> Result<()> {
    let queue = open_queue(config_path).await?;
    match id {
        Some(id) if !all => {
            queue.retry_failed(&id).await?;
            println!("Requeued {id}");
        }
        _ => {
            let count = queue.retry_all_failed().await?;
            println!("Requeued {count} failed entries");
        }
    }
    Ok(())
}

pub async fn discard(config_path: &Path, id: &str) -> Result<()> {
    let queue = open_queue(config_path).await?;
    queue.discard(id).await?;
    println!("Discarded {id}");
    Ok(())
}
