// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::Parser;
use fieldline::Cli;

fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging();
    if let Err(e) = fieldline::run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
