// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

use std::path::{Path, PathBuf};

use fl_sync::{Config, RemoteConfig};

use super::{load_config, open_store};
use crate::error::{Error, Result};

pub async fn run(
    config_path: &Path,
    database: Option<PathBuf>,
    remote: Option<String>,
    api_key: Option<String>,
) -> Result<()> {
    if config_path.exists() {
        return Err(Error::AlreadyInitialized(config_path.to_path_buf()));
    }

    let mut config = Config::default();
    if let Some(database) = database {
        config.database = database;
    }
    config.remote = remote.map(|url| RemoteConfig {
        api_key,
        ..RemoteConfig::new(url)
    });
    config.validate()?;
    config.save(config_path)?;

    // Reload so a relative database path resolves like it will later.
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;
    let version = store.schema_version().await?;

    println!("Initialized {}", config_path.display());
    println!("Database: {} (schema v{})", config.database.display(), version);
    match &config.remote {
        Some(remote) => println!("Remote: {}", remote.url),
        None => println!("Remote: none (local commands only)"),
    }
    Ok(())
}
