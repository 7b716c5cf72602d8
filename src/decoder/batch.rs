//! Batch decode across many files.
//!
//! Each file is decoded independently on the rayon pool; a failing file is
//! logged with its path and skipped. Results are concatenated in input file
//! order so output is reproducible regardless of scheduling.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{DecodeMode, DecodedRecord, Decoder, FileDecode};
use crate::archive::{self, DateWindow};
use crate::config::DecoderConfig;
use crate::error::PipelineError;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DecodeBatchStats {
    pub files_total: usize,
    pub files_ok: usize,
    pub files_failed: usize,
    pub files_empty: usize,
    pub lines: u64,
    pub malformed_lines: u64,
    pub markets_seen: u64,
    pub markets_rejected: u64,
    pub records: usize,
    pub failed_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchDecode {
    pub records: Vec<DecodedRecord>,
    pub stats: DecodeBatchStats,
}

/// Decode `files` in parallel. Fails only if the whole batch yields nothing.
pub fn decode_files(
    decoder: &Decoder,
    files: &[PathBuf],
    threads: Option<usize>,
) -> Result<BatchDecode> {
    let run = || -> Vec<Result<FileDecode>> {
        files.par_iter().map(|path| decoder.decode_file(path)).collect()
    };

    let results = match threads {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .context("Failed to build decode thread pool")?
            .install(run),
        None => run(),
    };

    let mut batch = BatchDecode::default();
    batch.stats.files_total = files.len();

    for (path, result) in files.iter().zip(results) {
        match result {
            Ok(decoded) => {
                batch.stats.files_ok += 1;
                batch.stats.lines += decoded.stats.lines;
                batch.stats.malformed_lines += decoded.stats.malformed_lines;
                batch.stats.markets_seen += decoded.stats.markets_seen;
                batch.stats.markets_rejected += decoded.stats.markets_rejected;
                if decoded.records.is_empty() {
                    batch.stats.files_empty += 1;
                }
                batch.records.extend(decoded.records);
            }
            Err(e) => {
                warn!("Skipping unreadable file {}: {:#}", path.display(), e);
                batch.stats.files_failed += 1;
                batch.stats.failed_files.push(path.clone());
            }
        }
    }
    batch.stats.records = batch.records.len();

    info!(
        "Decoded {} records ({} mode) from {} files: {} ok, {} empty, {} failed, {} malformed lines",
        batch.stats.records,
        decoder.mode(),
        batch.stats.files_total,
        batch.stats.files_ok,
        batch.stats.files_empty,
        batch.stats.files_failed,
        batch.stats.malformed_lines,
    );

    if batch.records.is_empty() {
        return Err(PipelineError::EmptyBatch { files: files.len() }.into());
    }

    Ok(batch)
}

/// Discover in-window files under `root` and decode them
pub fn decode_archive(
    root: &Path,
    window: &DateWindow,
    mode: DecodeMode,
    config: &DecoderConfig,
) -> Result<BatchDecode> {
    let files = archive::files_in_window(root, window)?;
    info!(
        "Found {} archive files in {}..={} under {}",
        files.len(),
        window.start,
        window.end,
        root.display()
    );

    let decoder = Decoder::new(mode, config);
    decode_files(&decoder, &files, config.threads)
}
