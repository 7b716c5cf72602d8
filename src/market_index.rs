//! Metadata index helpers.
//!
//! A metadata-mode decode gives one row per market. These helpers pick the
//! markets scheduled on given days and narrow a snapshot table to them.

use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::debug;

use crate::decoder::{MarketMetadata, MarketSnapshot};

/// Distinct market ids whose scheduled start falls on one of `dates` (UTC),
/// in first-seen order. Markets without a start time never match.
pub fn market_ids_for_dates(metadata: &[MarketMetadata], dates: &[NaiveDate]) -> Vec<String> {
    let wanted: HashSet<NaiveDate> = dates.iter().copied().collect();
    let mut seen = HashSet::new();

    let ids: Vec<String> = metadata
        .iter()
        .filter(|m| {
            m.market_time
                .map(|t| wanted.contains(&t.date_naive()))
                .unwrap_or(false)
        })
        .filter(|m| seen.insert(m.market_id.as_str()))
        .map(|m| m.market_id.clone())
        .collect();

    debug!("{} of {} markets scheduled on {} dates", ids.len(), metadata.len(), dates.len());
    ids
}

pub fn filter_snapshots(rows: Vec<MarketSnapshot>, ids: &HashSet<String>) -> Vec<MarketSnapshot> {
    rows.into_iter()
        .filter(|row| ids.contains(&row.market_id))
        .collect()
}
