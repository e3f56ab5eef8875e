// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

pub mod drain;
pub mod evict;
pub mod init;
pub mod queue;
pub mod records;
pub mod retry;
pub mod status;

use std::path::Path;

use fl_core::{Error as CoreError, Store, SyncQueue};
use fl_sync::Config;

use crate::error::{Error, Result};

/// Load and validate the config at `path`.
pub(crate) fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load(path)?;
    tracing::debug!(config = %path.display(), database = %config.database.display(), "loaded config");
    Ok(config)
}

/// Open the configured store. Commands here need it, so an unavailable
/// store is an error rather than a fallback.
pub(crate) async fn open_store(config: &Config) -> Result<Store> {
    match Store::open(&config.database).await {
        Ok(store) => Ok(store),
        Err(CoreError::StorageUnavailable(reason)) => Err(Error::StoreUnavailable(reason)),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn open_queue(config_path: &Path) -> Result<SyncQueue> {
    let config = load_config(config_path)?;
    Ok(SyncQueue::new(open_store(&config).await?))
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
