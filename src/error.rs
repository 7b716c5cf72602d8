//! Hard validation failures.
//!
//! Per-record and per-file problems are logged and skipped where they occur;
//! only broken contracts surface here and must stop the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required columns in {context}: {}", missing.join(", "))]
    MissingColumns {
        context: String,
        missing: Vec<String>,
    },

    #[error("duplicate match_ids in assembled output: {}", ids.join(", "))]
    DuplicateMatchIds { ids: Vec<String> },

    #[error("no records extracted from {files} file(s) in batch")]
    EmptyBatch { files: usize },

    #[error("file exceeded decode time budget of {budget_ms}ms after {lines} lines")]
    TimeBudgetExceeded { budget_ms: u64, lines: u64 },
}

impl PipelineError {
    pub fn missing_columns(context: impl Into<String>, missing: Vec<String>) -> Self {
        Self::MissingColumns {
            context: context.into(),
            missing,
        }
    }
}
