//! Alias override table: exact exchange spelling → canonical name.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use super::schema::ColumnSchema;
use crate::config::SchemaConfig;
use crate::resolver::AliasTable;

pub const ALIAS_REQUIRED_COLUMNS: [&str; 2] = ["alias", "full_name"];

pub fn load_alias_table(path: &Path, schema: &SchemaConfig) -> Result<AliasTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open alias table {}", path.display()))?;
    let aliases = read_alias_table(file, schema)
        .with_context(|| format!("Failed to load alias table {}", path.display()))?;
    info!("Loaded {} aliases from {}", aliases.len(), path.display());
    Ok(aliases)
}

pub fn read_alias_table<R: Read>(reader: R, schema: &SchemaConfig) -> Result<AliasTable> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let columns =
        ColumnSchema::new(&schema.aliases).resolve(&headers, &ALIAS_REQUIRED_COLUMNS, "alias table")?;

    let mut aliases = AliasTable::new();
    for record in csv_reader.records() {
        let record = record?;
        match (columns.get(&record, "alias"), columns.get(&record, "full_name")) {
            (Some(alias), Some(full_name)) => {
                if aliases.contains_key(alias) {
                    debug!("Duplicate alias {:?}, keeping first mapping", alias);
                    continue;
                }
                aliases.insert(alias.to_string(), full_name.to_string());
            }
            _ => debug!("Skipping incomplete alias row: {:?}", record),
        }
    }
    Ok(aliases)
}
