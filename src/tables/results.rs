//! Canonical match results table.
//!
//! Independently sourced record of who beat whom, used only for lookup.
//! Rows keep their load order; every "first match" rule downstream depends
//! on it.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use super::schema::ColumnSchema;
use crate::archive::DateWindow;
use crate::config::SchemaConfig;

pub const RESULTS_REQUIRED_COLUMNS: [&str; 4] =
    ["winner_name", "loser_name", "tourney_name", "tourney_date"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMatchResult {
    pub winner_name: String,
    pub loser_name: String,
    pub tourney_name: String,
    pub match_date: NaiveDate,
    pub round: Option<String>,
    pub score: Option<String>,
}

impl CanonicalMatchResult {
    /// True when {winner, loser} equals {a, b} in either order
    pub fn involves_pair(&self, a: &str, b: &str) -> bool {
        (self.winner_name == a && self.loser_name == b)
            || (self.winner_name == b && self.loser_name == a)
    }
}

/// Caller-supplied tournament/date slice of the results table
#[derive(Debug, Clone, Default)]
pub struct ResultsWindow {
    /// Case-insensitive substring of the tournament name
    pub tournament: Option<String>,
    pub dates: Option<DateWindow>,
}

#[derive(Debug, Clone, Default)]
pub struct CanonicalResults {
    rows: Vec<CanonicalMatchResult>,
}

/// `YYYYMMDD` or `YYYY-MM-DD`
pub fn parse_result_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let raw = raw.strip_suffix(".0").unwrap_or(raw);
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

impl CanonicalResults {
    pub fn from_rows(rows: Vec<CanonicalMatchResult>) -> Self {
        Self { rows }
    }

    pub fn load(path: &Path, schema: &SchemaConfig) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open results table {}", path.display()))?;
        let results = Self::from_reader(file, schema)
            .with_context(|| format!("Failed to load results table {}", path.display()))?;
        info!("Loaded {} canonical results from {}", results.len(), path.display());
        Ok(results)
    }

    pub fn from_reader<R: Read>(reader: R, schema: &SchemaConfig) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        let columns = ColumnSchema::new(&schema.results).resolve(
            &headers,
            &RESULTS_REQUIRED_COLUMNS,
            "canonical results table",
        )?;

        let mut rows = Vec::new();
        let mut skipped = 0usize;

        for (line, record) in csv_reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    skipped += 1;
                    debug!("Skipping unreadable results row {}: {}", line + 2, e);
                    continue;
                }
            };

            let winner = columns.get(&record, "winner_name");
            let loser = columns.get(&record, "loser_name");
            let date = columns
                .get(&record, "tourney_date")
                .and_then(parse_result_date);

            let (Some(winner), Some(loser), Some(match_date)) = (winner, loser, date) else {
                skipped += 1;
                debug!(
                    "Skipping results row {}: missing names or unparsable date {:?}",
                    line + 2,
                    columns.get(&record, "tourney_date")
                );
                continue;
            };

            rows.push(CanonicalMatchResult {
                winner_name: winner.to_string(),
                loser_name: loser.to_string(),
                tourney_name: columns
                    .get(&record, "tourney_name")
                    .unwrap_or_default()
                    .to_string(),
                match_date,
                round: columns.get(&record, "round").map(str::to_string),
                score: columns.get(&record, "score").map(str::to_string),
            });
        }

        if skipped > 0 {
            warn!("Skipped {} results rows with missing names or dates", skipped);
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[CanonicalMatchResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows inside the caller's tournament/date window, load order preserved
    pub fn filter_window(&self, window: &ResultsWindow) -> Self {
        let needle = window.tournament.as_ref().map(|t| t.to_lowercase());
        let rows = self
            .rows
            .iter()
            .filter(|row| {
                needle
                    .as_ref()
                    .map(|n| row.tourney_name.to_lowercase().contains(n.as_str()))
                    .unwrap_or(true)
            })
            .filter(|row| {
                window
                    .dates
                    .map(|w| w.contains(row.match_date))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        Self { rows }
    }

    /// First row (load order) whose winner/loser pair equals {a, b}
    pub fn find_pair(&self, a: &str, b: &str) -> Option<&CanonicalMatchResult> {
        self.rows.iter().find(|row| row.involves_pair(a, b))
    }
}
