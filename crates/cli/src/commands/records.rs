// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

use std::path::Path;

use fl_core::Collection;

use super::{load_config, open_store, print_json};
use crate::cli::OutputFormat;
use crate::display::format_record;
use crate::error::Result;

pub async fn run(
    config_path: &Path,
    collection: &str,
    unsynced: bool,
    output: OutputFormat,
) -> Result<()> {
    let collection: Collection = collection.parse()?;
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;

    let records = if unsynced {
        store.unsynced(collection).await?
    } else {
        store.get_all(collection).await?
    };

    match output {
        OutputFormat::Json => print_json(&records),
        OutputFormat::Text => {
            for record in &records {
                println!("{}", format_record(record));
            }
            Ok(())
        }
    }
}
