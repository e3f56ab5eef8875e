// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

//! fieldline - operator tooling for the Fieldline offline store.
//!
//! The binary wraps [`fl_core`] and [`fl_sync`]: it creates the config and
//! database, shows what is waiting in the sync queue, retries or discards
//! failed entries, runs eviction sweeps and replays the queue against the
//! remote API.
//!
//! ```rust,ignore
//! use clap::Parser;
//!
//! let cli = fieldline::Cli::parse_from(["fieldline", "queue", "--failed"]);
//! fieldline::run(cli).await?;
//! ```

mod cli;
mod commands;
mod display;
pub mod error;

use std::path::PathBuf;

pub use cli::{Cli, Command, OutputFormat};
pub use error::{Error, Result};

/// Config file named on the command line, or the per-user default.
pub fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(fl_sync::default_config_path)
}

/// Execute a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config_path = config_path(&cli);
    match cli.command {
        Command::Init {
            database,
            remote,
            api_key,
        } => commands::init::run(&config_path, database, remote, api_key).await,
        Command::Status { output } => commands::status::run(&config_path, output).await,
        Command::Queue { failed, output } => {
            commands::queue::run(&config_path, failed, output).await
        }
        Command::Retry { id, all } => commands::retry::run(&config_path, id, all).await,
        Command::Discard { id } => commands::retry::discard(&config_path, &id).await,
        Command::Evict => commands::evict::run(&config_path).await,
        Command::Drain => commands::drain::run(&config_path).await,
        Command::Records {
            collection,
            unsynced,
            output,
        } => commands::records::run(&config_path, &collection, unsynced, output).await,
    }
}
