//! CSV persistence for decoder output and assembled matches.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::decoder::MarketSnapshot;
use crate::error::PipelineError;

/// Columns the assembler needs from a snapshot CSV
pub const SNAPSHOT_REQUIRED_COLUMNS: [&str; 5] =
    ["market_id", "selection_id", "ltp", "timestamp", "runner_name"];

/// Write rows with a header derived from the row type
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(rows.len())
}

/// Typed rows plus the number of rows that failed to deserialize
#[derive(Debug, Clone)]
pub struct CsvRows<T> {
    pub rows: Vec<T>,
    pub skipped: usize,
}

/// Read typed rows after checking `required` headers are present. Rows that
/// fail to deserialize are skipped and their total is logged.
pub fn read_csv<T: DeserializeOwned>(path: &Path, required: &[&str], context: &str) -> Result<Vec<T>> {
    read_csv_counted(path, required, context).map(|read| read.rows)
}

pub fn read_csv_counted<T: DeserializeOwned>(
    path: &Path,
    required: &[&str],
    context: &str,
) -> Result<CsvRows<T>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let missing: Vec<String> = required
        .iter()
        .filter(|col| !headers.iter().any(|h| h.trim() == **col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::missing_columns(context, missing).into());
    }

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (line, row) in reader.deserialize().enumerate() {
        match row {
            Ok(row) => rows.push(row),
            Err(e) => {
                skipped += 1;
                debug!("Skipping {} row {}: {}", context, line + 2, e);
            }
        }
    }

    if skipped > 0 {
        warn!(
            "Skipped {} unreadable {} rows in {}",
            skipped,
            context,
            path.display()
        );
    }
    Ok(CsvRows { rows, skipped })
}

pub fn read_snapshots(path: &Path) -> Result<Vec<MarketSnapshot>> {
    read_csv(path, &SNAPSHOT_REQUIRED_COLUMNS, "snapshot table")
}
