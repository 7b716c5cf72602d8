//! Courtline CLI
//!
//! Batch front-end for the exchange archive pipeline.
//!
//! Usage:
//!   courtline decode --input-dir ./archive --output-csv ./out/snapshots.csv \
//!       --start-date 2023-01-16 --end-date 2023-01-29 --mode full
//!   courtline assemble --snapshots-csv ./out/snapshots.csv --results-csv ./atp_2023.csv \
//!       --tournament ausopen --year 2023 --output-csv ./out/matches.csv --fuzzy
//!   courtline index --metadata-csv ./out/metadata.csv --dates 2023-01-16,2023-01-17 \
//!       --output-csv ./out/markets.csv

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use courtline::archive::DateWindow;
use courtline::assembler::{AssemblyContext, AssemblyPolicy, Assembler};
use courtline::decoder::{decode_archive, partition_records, DecodeMode, MarketMetadata};
use courtline::market_index::{filter_snapshots, market_ids_for_dates};
use courtline::resolver::{AliasTable, Resolver};
use courtline::tables::{
    load_alias_table, output_gate, read_csv, read_snapshots, write_csv, CanonicalResults,
    OutputGate, ResultsWindow,
};
use courtline::PipelineConfig;

#[derive(Parser, Debug)]
#[command(name = "courtline")]
#[command(about = "Decode exchange archives and assemble tennis match tables")]
struct Cli {
    /// Pipeline config (TOML); defaults to $COURTLINE_CONFIG or ./courtline.toml
    #[arg(long, global = true, env = "COURTLINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode archive files in a date window to CSV
    Decode {
        #[arg(long)]
        input_dir: PathBuf,

        #[arg(long)]
        output_csv: PathBuf,

        /// First archive day (YYYY-MM-DD), inclusive
        #[arg(long)]
        start_date: String,

        /// Last archive day (YYYY-MM-DD), inclusive
        #[arg(long)]
        end_date: String,

        /// metadata | prices-only | full
        #[arg(long, default_value = "full")]
        mode: DecodeMode,

        #[arg(long)]
        overwrite: bool,

        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve snapshot runners and assemble the match table
    Assemble {
        #[arg(long)]
        snapshots_csv: PathBuf,

        #[arg(long)]
        output_csv: PathBuf,

        /// Tournament key used in match ids
        #[arg(long)]
        tournament: String,

        #[arg(long)]
        year: i32,

        /// Canonical results table; omit for snapshot-only output
        #[arg(long)]
        results_csv: Option<PathBuf>,

        /// Raw name → canonical name overrides
        #[arg(long)]
        alias_csv: Option<PathBuf>,

        /// Keep results whose tournament name contains this (case-insensitive)
        #[arg(long)]
        tourney_filter: Option<String>,

        /// Keep results dated on or after this day (needs --end-date)
        #[arg(long, requires = "end_date")]
        start_date: Option<String>,

        /// Keep results dated on or before this day (needs --start-date)
        #[arg(long, requires = "start_date")]
        end_date: Option<String>,

        /// Enable fuzzy name matching
        #[arg(long)]
        fuzzy: bool,

        /// Fuzzy acceptance score (0-100); overrides config
        #[arg(long)]
        threshold: Option<f64>,

        /// Drop markets without a resolved canonical result
        #[arg(long)]
        strict: bool,

        #[arg(long)]
        overwrite: bool,

        #[arg(long)]
        dry_run: bool,
    },

    /// List market ids scheduled on given days from a metadata CSV
    Index {
        #[arg(long)]
        metadata_csv: PathBuf,

        /// Comma-separated days (YYYY-MM-DD)
        #[arg(long, value_delimiter = ',', required = true)]
        dates: Vec<NaiveDate>,

        #[arg(long)]
        output_csv: PathBuf,

        /// Also narrow this snapshot CSV to the indexed markets
        #[arg(long, requires = "filtered_csv")]
        snapshots_csv: Option<PathBuf>,

        #[arg(long)]
        filtered_csv: Option<PathBuf>,

        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Serialize)]
struct MarketIdRow<'a> {
    market_id: &'a str,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("courtline=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::from_env(),
    };

    match cli.command {
        Commands::Decode {
            input_dir,
            output_csv,
            start_date,
            end_date,
            mode,
            overwrite,
            dry_run,
        } => {
            let window = DateWindow::parse(&start_date, &end_date)?;
            run_decode(&config, &input_dir, &output_csv, &window, mode, overwrite, dry_run)
        }
        Commands::Assemble {
            snapshots_csv,
            output_csv,
            tournament,
            year,
            results_csv,
            alias_csv,
            tourney_filter,
            start_date,
            end_date,
            fuzzy,
            threshold,
            strict,
            overwrite,
            dry_run,
        } => {
            let dates = match (start_date, end_date) {
                (Some(start), Some(end)) => Some(DateWindow::parse(&start, &end)?),
                _ => None,
            };
            let mut config = config;
            config.resolver.fuzzy |= fuzzy;
            if let Some(threshold) = threshold {
                config.resolver.fuzzy_threshold = threshold;
            }
            config.assembler.strict |= strict;

            let args = AssembleArgs {
                snapshots_csv,
                output_csv,
                results_csv,
                alias_csv,
                window: ResultsWindow {
                    tournament: tourney_filter,
                    dates,
                },
                ctx: AssemblyContext {
                    tournament,
                    year,
                    policy: if config.assembler.strict {
                        AssemblyPolicy::Strict
                    } else {
                        AssemblyPolicy::SnapshotOnly
                    },
                },
                overwrite,
                dry_run,
            };
            run_assemble(&config, args)
        }
        Commands::Index {
            metadata_csv,
            dates,
            output_csv,
            snapshots_csv,
            filtered_csv,
            overwrite,
        } => run_index(
            &metadata_csv,
            &dates,
            &output_csv,
            snapshots_csv.as_deref().zip(filtered_csv.as_deref()),
            overwrite,
        ),
    }
}

// ============================================================================
// DECODE
// ============================================================================

fn run_decode(
    config: &PipelineConfig,
    input_dir: &Path,
    output_csv: &Path,
    window: &DateWindow,
    mode: DecodeMode,
    overwrite: bool,
    dry_run: bool,
) -> Result<()> {
    let gate = output_gate(output_csv, overwrite, dry_run);
    if gate == OutputGate::SkipExisting {
        return Ok(());
    }

    let batch = decode_archive(input_dir, window, mode, &config.decoder)?;
    let (metadata, snapshots, ticks) = partition_records(batch.records);

    if gate == OutputGate::DryRun {
        info!(
            "Dry run: would write {} rows to {}",
            batch.stats.records,
            output_csv.display()
        );
        return Ok(());
    }

    let written = match mode {
        DecodeMode::Metadata => write_csv(output_csv, &metadata)?,
        DecodeMode::PricesOnly => write_csv(output_csv, &ticks)?,
        DecodeMode::Full => write_csv(output_csv, &snapshots)?,
    };
    info!("Wrote {} {} rows to {}", written, mode, output_csv.display());
    Ok(())
}

// ============================================================================
// ASSEMBLE
// ============================================================================

struct AssembleArgs {
    snapshots_csv: PathBuf,
    output_csv: PathBuf,
    results_csv: Option<PathBuf>,
    alias_csv: Option<PathBuf>,
    window: ResultsWindow,
    ctx: AssemblyContext,
    overwrite: bool,
    dry_run: bool,
}

fn run_assemble(config: &PipelineConfig, args: AssembleArgs) -> Result<()> {
    let gate = output_gate(&args.output_csv, args.overwrite, args.dry_run);
    if gate == OutputGate::SkipExisting {
        return Ok(());
    }

    let snapshots = read_snapshots(&args.snapshots_csv)?;
    info!("Loaded {} snapshot rows from {}", snapshots.len(), args.snapshots_csv.display());

    let results = match &args.results_csv {
        Some(path) => {
            let all = CanonicalResults::load(path, &config.schema)?;
            let sliced = all.filter_window(&args.window);
            info!("Using {} of {} canonical results", sliced.len(), all.len());
            sliced
        }
        None => CanonicalResults::default(),
    };

    let aliases = match &args.alias_csv {
        Some(path) => load_alias_table(path, &config.schema)?,
        None => AliasTable::new(),
    };

    let resolver = Resolver::from_results(&results, aliases, &config.resolver);
    let output = Assembler::new(&resolver, &results).assemble(snapshots, &args.ctx)?;

    if gate == OutputGate::DryRun {
        info!(
            "Dry run: would write {} matches to {}",
            output.matches.len(),
            args.output_csv.display()
        );
        return Ok(());
    }

    let written = write_csv(&args.output_csv, &output.matches)?;
    info!("Wrote {} matches to {}", written, args.output_csv.display());
    Ok(())
}

// ============================================================================
// INDEX
// ============================================================================

fn run_index(
    metadata_csv: &Path,
    dates: &[NaiveDate],
    output_csv: &Path,
    filter: Option<(&Path, &Path)>,
    overwrite: bool,
) -> Result<()> {
    let metadata: Vec<MarketMetadata> = read_csv(
        metadata_csv,
        &["market_id", "market_time"],
        "metadata table",
    )?;
    let ids = market_ids_for_dates(&metadata, dates);
    info!("{} markets scheduled on {} days", ids.len(), dates.len());

    if output_gate(output_csv, overwrite, false) == OutputGate::Write {
        let rows: Vec<MarketIdRow> = ids.iter().map(|id| MarketIdRow { market_id: id }).collect();
        write_csv(output_csv, &rows)?;
    }

    if let Some((snapshots_csv, filtered_csv)) = filter {
        if output_gate(filtered_csv, overwrite, false) == OutputGate::Write {
            let wanted: HashSet<String> = ids.into_iter().collect();
            let kept = filter_snapshots(read_snapshots(snapshots_csv)?, &wanted);
            let written = write_csv(filtered_csv, &kept)?;
            info!("Wrote {} snapshot rows to {}", written, filtered_csv.display());
        }
    }

    Ok(())
}
