//! Courtline Library
//!
//! Batch pipeline that turns archived exchange stream files for tennis
//! match-odds markets into a validated, uniquely-keyed match table.
//!
//! ```text
//! archive files
//!    ↓  archive (date window)
//! decoder (per-file pure reduction, parallel)
//!    ↓  MarketSnapshot rows
//! assembler ──► resolver (alias → substring → fuzzy)
//!    ↓
//! AssembledMatch table (unique match_id)
//! ```

pub mod archive;
pub mod assembler;
pub mod config;
pub mod decoder;
pub mod error;
pub mod market_index;
pub mod resolver;
pub mod tables;

pub use assembler::{AssembledMatch, Assembler, AssemblyContext, AssemblyOutput, AssemblyPolicy};
pub use config::PipelineConfig;
pub use decoder::{DecodeMode, DecodedRecord, MarketMetadata, MarketSnapshot, PriceTickRow};
pub use error::PipelineError;
pub use resolver::{Resolution, ResolutionStrategy, Resolver};
