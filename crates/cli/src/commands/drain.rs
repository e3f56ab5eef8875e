// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

use std::path::Path;
use std::sync::Arc;

use fl_sync::{ConnectivityMonitor, HttpRemote, SyncContext};

use super::load_config;
use crate::error::{Error, Result};

/// Run one drain pass against the configured remote.
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let remote = HttpRemote::new(config.require_remote()?)?;
    let ctx = SyncContext::open(&config, Arc::new(remote), ConnectivityMonitor::new(true)).await?;
    if ctx.store().is_none() {
        return Err(Error::StoreUnavailable(config.database.display().to_string()));
    }

    let report = ctx.drain().await;
    println!(
        "Sent {} entries, {} failed",
        report.success_count, report.failed_count
    );
    for err in &report.errors {
        println!("  {err}");
    }
    let pending = ctx.monitor().status().pending_operations;
    if pending > 0 {
        println!("{pending} entries remain queued");
    }

    if report.aborted {
        let reason = report
            .errors
            .last()
            .map(ToString::to_string)
            .unwrap_or_else(|| "authentication expired".to_string());
        return Err(Error::DrainAborted(reason));
    }
    Ok(())
}
