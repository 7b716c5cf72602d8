//! Exchange Stream Decoder
//!
//! Converts one line-delimited (optionally bzip2-compressed) stream file into
//! records for one of three modes:
//!
//! - `metadata`: the first qualifying market definition in the file
//! - `prices-only`: every last-traded-price tick, in file order
//! - `full`: one row per (market, runner) carrying the final price
//!
//! Decoding a file is a pure reduction over its lines. Callers aggregate
//! across files (see [`batch`]).

pub mod batch;
pub mod reduce;
pub mod stream;

use anyhow::{Context, Result};
use bzip2::read::MultiBzDecoder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::DecoderConfig;
use crate::error::PipelineError;
use stream::{MarketChange, RawEvent, RawMarketDefinition, OP_MARKET_CHANGE};

pub use batch::{decode_archive, decode_files, BatchDecode, DecodeBatchStats};

// ============================================================================
// OUTPUT RECORDS
// ============================================================================

/// Decode mode selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Metadata,
    PricesOnly,
    Full,
}

impl DecodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::PricesOnly => "prices-only",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for DecodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecodeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "metadata" => Ok(Self::Metadata),
            "prices-only" | "prices_only" | "ltp_only" => Ok(Self::PricesOnly),
            "full" => Ok(Self::Full),
            other => anyhow::bail!("unknown decode mode: {}", other),
        }
    }
}

/// Metadata-mode record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMetadata {
    pub market_id: String,
    pub market_time: Option<DateTime<Utc>>,
    pub market_name: String,
    pub runner_1: String,
    pub runner_2: String,
}

/// Full-mode record: final state of one runner in one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market_id: String,
    pub selection_id: u64,
    /// Final last-traded price; `None` if the runner never traded
    pub ltp: Option<f64>,
    /// Publish time (epoch ms) of the final tick, or of the definition if untraded
    pub timestamp: i64,
    pub market_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub market_name: String,
    pub runner_name: String,
    #[serde(default)]
    pub runner_1: String,
    #[serde(default)]
    pub runner_2: String,
}

/// Prices-only record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTickRow {
    pub market_id: String,
    pub selection_id: u64,
    pub ltp: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRecord {
    Metadata(MarketMetadata),
    Snapshot(MarketSnapshot),
    Tick(PriceTickRow),
}

/// Per-file decode counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileStats {
    pub lines: u64,
    pub malformed_lines: u64,
    pub lines_without_time: u64,
    pub ticks: u64,
    pub ticks_without_price: u64,
    pub markets_seen: u64,
    pub markets_rejected: u64,
}

#[derive(Debug, Clone, Default)]
pub struct FileDecode {
    pub records: Vec<DecodedRecord>,
    pub stats: FileStats,
}

// ============================================================================
// PER-FILE STATE
// ============================================================================

/// First definition seen for a market, immutable thereafter
#[derive(Debug, Clone)]
struct MarketDefinition {
    market_time: Option<DateTime<Utc>>,
    name: String,
    /// Exactly two runners: (selection id, display name)
    runners: [(u64, String); 2],
    published_at: i64,
}

#[derive(Debug, Clone)]
enum DefinitionState {
    Qualified(MarketDefinition),
    Rejected,
}

#[derive(Debug, Clone)]
struct PriceTick {
    market_id: String,
    selection_id: u64,
    ltp: f64,
    publish_time: i64,
    seq: u64,
}

#[derive(Default)]
struct FileState {
    definitions: HashMap<String, DefinitionState>,
    /// Market ids in order of first definition
    market_order: Vec<String>,
    ticks: Vec<PriceTick>,
}

fn parse_market_time(raw: Option<&str>, market_id: &str) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            debug!("Unparsable marketTime {:?} for market {}: {}", raw, market_id, e);
            None
        }
    }
}

// ============================================================================
// DECODER
// ============================================================================

/// Stream file decoder. Stateless between files and safe to share across threads.
#[derive(Debug, Clone)]
pub struct Decoder {
    mode: DecodeMode,
    market_type: String,
    time_budget: Option<Duration>,
}

impl Decoder {
    pub fn new(mode: DecodeMode, config: &DecoderConfig) -> Self {
        Self {
            mode,
            market_type: config.market_type.clone(),
            time_budget: config.file_time_budget_ms.map(Duration::from_millis),
        }
    }

    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Decode one file; `.bz2` files are decompressed on the fly
    pub fn decode_file(&self, path: &Path) -> Result<FileDecode> {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

        let is_bz2 = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("bz2"))
            .unwrap_or(false);

        let result = if is_bz2 {
            self.decode_reader(BufReader::new(MultiBzDecoder::new(file)))
        } else {
            self.decode_reader(BufReader::new(file))
        };

        result.with_context(|| format!("Failed to decode {}", path.display()))
    }

    /// Decode a line-delimited stream from any buffered reader.
    ///
    /// The time budget is checked after each line is read; a read that
    /// blocks inside the decompressor is not interrupted.
    pub fn decode_reader<R: BufRead>(&self, mut reader: R) -> Result<FileDecode> {
        let started = Instant::now();
        let mut state = FileState::default();
        let mut stats = FileStats::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .context("stream read failed")?;
            if read == 0 {
                break;
            }
            stats.lines += 1;

            if let Some(budget) = self.time_budget {
                if started.elapsed() > budget {
                    return Err(PipelineError::TimeBudgetExceeded {
                        budget_ms: budget.as_millis() as u64,
                        lines: stats.lines,
                    }
                    .into());
                }
            }

            if buf.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            let event: RawEvent = match serde_json::from_slice(&buf) {
                Ok(event) => event,
                Err(e) => {
                    stats.malformed_lines += 1;
                    debug!("Skipping malformed line {}: {}", stats.lines, e);
                    continue;
                }
            };

            if event.op != OP_MARKET_CHANGE {
                continue;
            }

            let Some(publish_time) = event.pt else {
                stats.lines_without_time += 1;
                debug!("Skipping line {} without publish time", stats.lines);
                continue;
            };

            for change in &event.mc {
                if let Some(metadata) =
                    self.observe_change(&mut state, &mut stats, change, publish_time)
                {
                    // Metadata mode stops at the first qualifying definition
                    return Ok(FileDecode {
                        records: vec![DecodedRecord::Metadata(metadata)],
                        stats,
                    });
                }
            }
        }

        let records = match self.mode {
            DecodeMode::Metadata => Vec::new(),
            DecodeMode::PricesOnly => emit_ticks(&state),
            DecodeMode::Full => emit_snapshots(state),
        };

        Ok(FileDecode { records, stats })
    }

    /// Fold one market change into the file state. Returns a metadata record
    /// when running in metadata mode and this change established a
    /// qualifying definition.
    fn observe_change(
        &self,
        state: &mut FileState,
        stats: &mut FileStats,
        change: &MarketChange,
        publish_time: i64,
    ) -> Option<MarketMetadata> {
        let mut newly_qualified = None;

        if let Some(raw_def) = &change.market_definition {
            if !state.definitions.contains_key(&change.id) {
                stats.markets_seen += 1;
                let def_state = match self.qualify(&change.id, raw_def, publish_time) {
                    Some(def) => {
                        newly_qualified = Some(def.clone());
                        DefinitionState::Qualified(def)
                    }
                    None => {
                        stats.markets_rejected += 1;
                        DefinitionState::Rejected
                    }
                };
                state.definitions.insert(change.id.clone(), def_state);
                state.market_order.push(change.id.clone());
            }
        }

        if self.mode == DecodeMode::Metadata {
            return newly_qualified.map(|def| MarketMetadata {
                market_id: change.id.clone(),
                market_time: def.market_time,
                market_name: def.name,
                runner_1: def.runners[0].1.clone(),
                runner_2: def.runners[1].1.clone(),
            });
        }

        for rc in &change.rc {
            match rc.ltp {
                Some(ltp) if ltp.is_finite() && ltp > 0.0 => {
                    stats.ticks += 1;
                    let seq = state.ticks.len() as u64;
                    state.ticks.push(PriceTick {
                        market_id: change.id.clone(),
                        selection_id: rc.id,
                        ltp,
                        publish_time,
                        seq,
                    });
                }
                _ => stats.ticks_without_price += 1,
            }
        }

        None
    }

    fn qualify(
        &self,
        market_id: &str,
        raw: &RawMarketDefinition,
        publish_time: i64,
    ) -> Option<MarketDefinition> {
        if raw.market_type.as_deref() != Some(self.market_type.as_str()) {
            debug!(
                "Market {} has type {:?}, not {}",
                market_id, raw.market_type, self.market_type
            );
            return None;
        }

        if raw.runners.len() != 2 || raw.runners[0].id == raw.runners[1].id {
            debug!(
                "Market {} declares {} runners, dropping",
                market_id,
                raw.runners.len()
            );
            return None;
        }

        let runner = |idx: usize| {
            let r = &raw.runners[idx];
            (r.id, r.name.clone().unwrap_or_default())
        };

        Some(MarketDefinition {
            market_time: parse_market_time(raw.market_time.as_deref(), market_id),
            name: raw.name.clone().unwrap_or_default(),
            runners: [runner(0), runner(1)],
            published_at: publish_time,
        })
    }
}

fn qualified<'a>(state: &'a FileState, market_id: &str) -> Option<&'a MarketDefinition> {
    match state.definitions.get(market_id) {
        Some(DefinitionState::Qualified(def)) => Some(def),
        _ => None,
    }
}

fn declares_runner(def: &MarketDefinition, selection_id: u64) -> bool {
    def.runners.iter().any(|(id, _)| *id == selection_id)
}

fn emit_ticks(state: &FileState) -> Vec<DecodedRecord> {
    state
        .ticks
        .iter()
        .filter(|tick| {
            qualified(state, &tick.market_id)
                .map(|def| declares_runner(def, tick.selection_id))
                .unwrap_or(false)
        })
        .map(|tick| {
            DecodedRecord::Tick(PriceTickRow {
                market_id: tick.market_id.clone(),
                selection_id: tick.selection_id,
                ltp: tick.ltp,
                timestamp: tick.publish_time,
            })
        })
        .collect()
}

fn emit_snapshots(state: FileState) -> Vec<DecodedRecord> {
    let FileState {
        definitions,
        market_order,
        ticks,
    } = state;

    let in_scope: HashSet<&str> = market_order
        .iter()
        .filter(|id| matches!(definitions.get(*id), Some(DefinitionState::Qualified(_))))
        .map(|id| id.as_str())
        .collect();

    let ticks: Vec<PriceTick> = ticks
        .into_iter()
        .filter(|t| in_scope.contains(t.market_id.as_str()))
        .collect();

    let latest: HashMap<(String, u64), PriceTick> = reduce::latest_by_key(
        ticks,
        |t| (t.market_id.clone(), t.selection_id),
        |t| (t.publish_time, t.seq),
    )
    .into_iter()
    .map(|t| ((t.market_id.clone(), t.selection_id), t))
    .collect();

    let mut records = Vec::new();
    for market_id in &market_order {
        let Some(DefinitionState::Qualified(def)) = definitions.get(market_id) else {
            continue;
        };
        let (runner_1, runner_2) = (&def.runners[0].1, &def.runners[1].1);

        for (selection_id, runner_name) in &def.runners {
            let tick = latest.get(&(market_id.clone(), *selection_id));
            records.push(DecodedRecord::Snapshot(MarketSnapshot {
                market_id: market_id.clone(),
                selection_id: *selection_id,
                ltp: tick.map(|t| t.ltp),
                timestamp: tick.map(|t| t.publish_time).unwrap_or(def.published_at),
                market_time: def.market_time,
                market_name: def.name.clone(),
                runner_name: runner_name.clone(),
                runner_1: runner_1.clone(),
                runner_2: runner_2.clone(),
            }));
        }
    }
    records
}

impl DecodedRecord {
    pub fn as_snapshot(&self) -> Option<&MarketSnapshot> {
        match self {
            Self::Snapshot(s) => Some(s),
            _ => None,
        }
    }
}

/// Split decoded records into their mode-specific vectors
pub fn partition_records(
    records: Vec<DecodedRecord>,
) -> (Vec<MarketMetadata>, Vec<MarketSnapshot>, Vec<PriceTickRow>) {
    let mut metadata = Vec::new();
    let mut snapshots = Vec::new();
    let mut ticks = Vec::new();
    for record in records {
        match record {
            DecodedRecord::Metadata(m) => metadata.push(m),
            DecodedRecord::Snapshot(s) => snapshots.push(s),
            DecodedRecord::Tick(t) => ticks.push(t),
        }
    }
    (metadata, snapshots, ticks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn definition_line(market_id: &str, pt: i64, runners: &[(u64, &str)]) -> String {
        let runners: Vec<String> = runners
            .iter()
            .map(|(id, name)| format!(r#"{{"id":{},"name":"{}"}}"#, id, name))
            .collect();
        format!(
            r#"{{"op":"mcm","pt":{},"mc":[{{"id":"{}","marketDefinition":{{"marketType":"MATCH_ODDS","marketTime":"2023-01-16T08:00:00.000Z","name":"Match Odds","runners":[{}]}}}}]}}"#,
            pt,
            market_id,
            runners.join(",")
        )
    }

    fn price_line(market_id: &str, pt: i64, selection_id: u64, ltp: f64) -> String {
        format!(
            r#"{{"op":"mcm","pt":{},"mc":[{{"id":"{}","rc":[{{"id":{},"ltp":{}}}]}}]}}"#,
            pt, market_id, selection_id, ltp
        )
    }

    fn decode(mode: DecodeMode, lines: &[String]) -> FileDecode {
        let decoder = Decoder::new(mode, &DecoderConfig::default());
        decoder
            .decode_reader(Cursor::new(lines.join("\n")))
            .unwrap()
    }

    fn snapshots(decoded: &FileDecode) -> Vec<&MarketSnapshot> {
        decoded.records.iter().filter_map(|r| r.as_snapshot()).collect()
    }

    #[test]
    fn test_final_price_is_latest_publish_time() {
        // Ticks arrive out of publish-time order
        let lines = vec![
            definition_line("m1", 5, &[(1, "Player One"), (2, "Player Two")]),
            price_line("m1", 20, 1, 1.95),
            price_line("m1", 10, 1, 1.80),
            price_line("m1", 15, 2, 2.10),
        ];
        let decoded = decode(DecodeMode::Full, &lines);
        let rows = snapshots(&decoded);

        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].selection_id, rows[0].ltp, rows[0].timestamp), (1, Some(1.95), 20));
        assert_eq!((rows[1].selection_id, rows[1].ltp, rows[1].timestamp), (2, Some(2.10), 15));
        assert_eq!(rows[0].runner_name, "Player One");
        assert_eq!(rows[1].runner_1, "Player One");
        assert_eq!(rows[1].runner_2, "Player Two");
        assert_eq!(rows[0].market_time.unwrap().to_rfc3339(), "2023-01-16T08:00:00+00:00");
    }

    #[test]
    fn test_markets_without_two_runners_are_dropped() {
        let lines = vec![
            definition_line("m3", 1, &[(1, "A"), (2, "B"), (3, "C")]),
            definition_line("m1", 1, &[(1, "Solo")]),
            price_line("m3", 2, 1, 3.0),
            price_line("m1", 2, 1, 1.1),
        ];
        let decoded = decode(DecodeMode::Full, &lines);
        assert!(decoded.records.is_empty());
        assert_eq!(decoded.stats.markets_seen, 2);
        assert_eq!(decoded.stats.markets_rejected, 2);
    }

    #[test]
    fn test_first_definition_is_immutable() {
        let lines = vec![
            definition_line("m1", 1, &[(1, "A"), (2, "B")]),
            definition_line("m1", 2, &[(1, "A"), (2, "B"), (3, "C")]),
            price_line("m1", 3, 1, 1.5),
            price_line("m1", 4, 3, 9.0),
        ];
        let decoded = decode(DecodeMode::Full, &lines);
        let rows = snapshots(&decoded);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.selection_id != 3));
    }

    #[test]
    fn test_other_market_types_are_ignored() {
        let line = r#"{"op":"mcm","pt":1,"mc":[{"id":"m9","marketDefinition":{"marketType":"SET_BETTING","runners":[{"id":1,"name":"A"},{"id":2,"name":"B"}]}}]}"#;
        let decoded = decode(DecodeMode::Full, &[line.to_string()]);
        assert!(decoded.records.is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let lines = vec![
            "{not json".to_string(),
            definition_line("m1", 1, &[(1, "A"), (2, "B")]),
            r#"{"op":"mcm","mc":[]}"#.to_string(),
            String::new(),
            price_line("m1", 2, 2, 1.7),
        ];
        let decoded = decode(DecodeMode::Full, &lines);
        assert_eq!(decoded.stats.malformed_lines, 1);
        assert_eq!(decoded.stats.lines_without_time, 1);
        let rows = snapshots(&decoded);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ltp, None);
        assert_eq!(rows[0].timestamp, 1);
        assert_eq!(rows[1].ltp, Some(1.7));
    }

    #[test]
    fn test_ticks_before_definition_are_kept() {
        let lines = vec![
            price_line("m1", 1, 1, 2.5),
            definition_line("m1", 2, &[(1, "A"), (2, "B")]),
        ];
        let decoded = decode(DecodeMode::Full, &lines);
        assert_eq!(snapshots(&decoded)[0].ltp, Some(2.5));
    }

    #[test]
    fn test_metadata_mode_returns_first_definition_only() {
        let lines = vec![
            definition_line("m0", 1, &[(1, "A"), (2, "B"), (3, "C")]),
            definition_line("m1", 2, &[(1, "Novak Djokovic"), (2, "Rafael Nadal")]),
            definition_line("m2", 3, &[(5, "X"), (6, "Y")]),
        ];
        let decoded = decode(DecodeMode::Metadata, &lines);
        assert_eq!(decoded.records.len(), 1);
        match &decoded.records[0] {
            DecodedRecord::Metadata(m) => {
                assert_eq!(m.market_id, "m1");
                assert_eq!(m.market_name, "Match Odds");
                assert_eq!(m.runner_1, "Novak Djokovic");
                assert_eq!(m.runner_2, "Rafael Nadal");
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_prices_only_mode_keeps_every_tick_in_scope() {
        let lines = vec![
            definition_line("m1", 1, &[(1, "A"), (2, "B")]),
            price_line("m1", 2, 1, 1.8),
            price_line("m1", 3, 1, 1.9),
            price_line("m1", 4, 7, 5.0),
            price_line("m2", 5, 1, 1.1),
        ];
        let decoded = decode(DecodeMode::PricesOnly, &lines);
        let (_, _, ticks) = partition_records(decoded.records);
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[1].ltp, 1.9);
        assert_eq!(ticks[1].timestamp, 3);
    }

    #[test]
    fn test_decode_bz2_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.209.bz2");
        let body = [
            definition_line("1.209", 1, &[(1, "A"), (2, "B")]),
            price_line("1.209", 2, 1, 1.4),
            price_line("1.209", 3, 2, 3.2),
        ]
        .join("\n");
        let file = File::create(&path).unwrap();
        let mut encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
        encoder.write_all(body.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let decoder = Decoder::new(DecodeMode::Full, &DecoderConfig::default());
        let decoded = decoder.decode_file(&path).unwrap();
        assert_eq!(decoded.records.len(), 2);
    }

    #[test]
    fn test_corrupt_bz2_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.bad.bz2");
        std::fs::write(&path, b"BZh9 definitely not bzip2").unwrap();

        let decoder = Decoder::new(DecodeMode::Full, &DecoderConfig::default());
        assert!(decoder.decode_file(&path).is_err());
    }

    #[test]
    fn test_time_budget_abandons_file_between_lines() {
        let body = format!(
            "{}\n{}\n",
            definition_line("1.1", 1, &[(1, "A"), (2, "B")]),
            price_line("1.1", 2, 1, 1.5)
        );

        let tight = Decoder::new(
            DecodeMode::Full,
            &DecoderConfig {
                file_time_budget_ms: Some(0),
                ..DecoderConfig::default()
            },
        );
        let err = tight.decode_reader(Cursor::new(body.clone())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::TimeBudgetExceeded { budget_ms: 0, lines: 1 })
        ));

        let relaxed = Decoder::new(
            DecodeMode::Full,
            &DecoderConfig {
                file_time_budget_ms: Some(60_000),
                ..DecoderConfig::default()
            },
        );
        assert_eq!(relaxed.decode_reader(Cursor::new(body)).unwrap().records.len(), 2);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("full".parse::<DecodeMode>().unwrap(), DecodeMode::Full);
        assert_eq!("prices-only".parse::<DecodeMode>().unwrap(), DecodeMode::PricesOnly);
        assert_eq!(DecodeMode::Metadata.to_string(), "metadata");
        assert!("final".parse::<DecodeMode>().is_err());
    }
}
