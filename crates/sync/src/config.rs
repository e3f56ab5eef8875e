// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! Installation configuration.
//!
//! Configuration is stored in `fieldline.toml` and includes:
//! - `database`: path of the local store (relative paths resolve against the
//!   config file's directory)
//! - `[sync]`: retry budget, retention window and loop intervals
//! - `[remote]`: optional REST endpoint; absent means local-only

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SyncError};

const APP_DIR_NAME: &str = "fieldline";
const CONFIG_FILE_NAME: &str = "fieldline.toml";
const DB_FILE_NAME: &str = "offline.db";

/// Installation configuration stored in `fieldline.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path of the SQLite database backing the local store.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub sync: SyncSettings,
    /// Remote collaborator (optional - if absent, only local commands work).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
}

/// Tunables for the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Failed attempts an entry may accumulate before it is parked as failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Synced records untouched for this many days are evicted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_pending_poll_interval_secs")]
    pub pending_poll_interval_secs: u64,
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
}

/// REST endpoint of the remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL, e.g. `https://project.example.com`. Tables live under `/rest/v1/`.
    pub url: String,
    /// Sent as both `apikey` and bearer token when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_database() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(DB_FILE_NAME)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retention_days() -> u32 {
    7
}

fn default_pending_poll_interval_secs() -> u64 {
    5
}

fn default_eviction_interval_secs() -> u64 {
    3600
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: default_database(),
            sync: SyncSettings::default(),
            remote: None,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            max_retries: default_max_retries(),
            retention_days: default_retention_days(),
            pending_poll_interval_secs: default_pending_poll_interval_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
        }
    }
}

impl SyncSettings {
    pub fn pending_poll_interval(&self) -> Duration {
        Duration::from_secs(self.pending_poll_interval_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

impl RemoteConfig {
    /// Remote at `url` with no api key and the default timeout.
    pub fn new(url: impl Into<String>) -> Self {
        RemoteConfig {
            url: url.into(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns an error message if the URL is not an http(s) URL.
    pub fn validate_url(&self) -> Option<String> {
        if self.url.starts_with("http://") || self.url.starts_with("https://") {
            None
        } else {
            Some(format!(
                "invalid remote URL '{}': must start with http:// or https://",
                self.url
            ))
        }
    }
}

impl Config {
    /// Loads configuration from `path`.
    ///
    /// A missing file yields the defaults. A relative `database` is resolved
    /// against the directory holding the config file.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match fs::read_to_string(path) {
            Ok(content) => toml::from_str::<Config>(&content)
                .map_err(|e| SyncError::Config(format!("failed to parse {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Config::default()
            }
            Err(e) => {
                return Err(SyncError::Config(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        if config.database.is_relative() {
            if let Some(dir) = path.parent() {
                config.database = dir.join(&config.database);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Writes configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let sync = &self.sync;
        if sync.retention_days == 0 {
            return Err(SyncError::Config(
                "sync.retention_days must be at least 1".to_string(),
            ));
        }
        if sync.pending_poll_interval_secs == 0 {
            return Err(SyncError::Config(
                "sync.pending_poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if sync.eviction_interval_secs == 0 {
            return Err(SyncError::Config(
                "sync.eviction_interval_secs must be at least 1".to_string(),
            ));
        }
        if let Some(remote) = &self.remote {
            if let Some(msg) = remote.validate_url() {
                return Err(SyncError::Config(msg));
            }
            if remote.timeout_secs == 0 {
                return Err(SyncError::Config(
                    "remote.timeout_secs must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the remote section, or [`SyncError::NoRemote`].
    pub fn require_remote(&self) -> Result<&RemoteConfig> {
        self.remote.as_ref().ok_or(SyncError::NoRemote)
    }
}

/// Default location of `fieldline.toml` under the user config directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
