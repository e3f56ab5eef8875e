// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "fieldline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and reconcile the Fieldline offline store")]
#[command(
    long_about = "Inspect and reconcile the Fieldline offline store.\n\n\
    Mutations made while offline are kept in a durable queue and replayed \
    against the remote API once it is reachable."
)]
pub struct Cli {
    /// Path of the configuration file
    #[arg(short = 'c', long, global = true, env = "FIELDLINE_CONFIG", value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a configuration file and create the local database
    #[command(after_help = "\
Examples:
  fieldline init                                   Use the default locations
  fieldline init --database ./offline.db           Keep the database next to the config
  fieldline init --remote https://api.example.com  Configure the remote API")]
    Init {
        /// Database path (relative paths resolve against the config directory)
        #[arg(long, value_name = "path")]
        database: Option<PathBuf>,

        /// Base URL of the remote API
        #[arg(long, value_name = "url")]
        remote: Option<String>,

        /// API key sent with every remote request
        #[arg(long, value_name = "key", requires = "remote")]
        api_key: Option<String>,
    },

    /// Show store, queue and remote configuration
    Status {
        #[arg(long = "output", short = 'o', value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// List queued mutations
    Queue {
        /// Only show entries that exhausted their retries
        #[arg(long)]
        failed: bool,

        #[arg(long = "output", short = 'o', value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Put failed entries back on the pending queue
    Retry {
        /// Entry id (see `fieldline queue --failed`)
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,

        /// Retry every failed entry
        #[arg(long)]
        all: bool,
    },

    /// Drop a failed or quarantined entry without sending it
    Discard {
        /// Entry id
        id: String,
    },

    /// Remove synced records older than the retention window
    Evict,

    /// Replay pending mutations against the remote API
    Drain,

    /// List cached records of one collection
    Records {
        /// Collection name (jobs, invoices, customers, ...)
        collection: String,

        /// Only show records with local changes not yet reconciled
        #[arg(long)]
        unsynced: bool,

        #[arg(long = "output", short = 'o', value_enum, default_value = "text")]
        output: OutputFormat,
    },
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
