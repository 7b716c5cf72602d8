//! Pipeline configuration
//!
//! Decoder, resolver and assembler knobs plus the column-alias table used to
//! resolve input CSV headers. Loaded from TOML; every field has a default so
//! a partial file (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub assembler: AssemblerConfig,

    #[serde(default)]
    pub schema: SchemaConfig,
}

impl PipelineConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `COURTLINE_CONFIG` or the default path, falling back to defaults
    pub fn from_env() -> Self {
        let path =
            std::env::var("COURTLINE_CONFIG").unwrap_or_else(|_| "courtline.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default pipeline config ({}): {}", path, e);
            Self::default()
        })
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Stream decoding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Market type that qualifies a market for decoding
    #[serde(default = "default_market_type")]
    pub market_type: String,

    /// Per-file wall-clock budget; a file exceeding it is abandoned. Checked
    /// between lines only, so a single read that blocks is not interrupted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_time_budget_ms: Option<u64>,

    /// Worker threads for batch decode (None = rayon default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

fn default_market_type() -> String {
    "MATCH_ODDS".to_string()
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            market_type: default_market_type(),
            file_time_budget_ms: None,
            threads: None,
        }
    }
}

/// Name resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Enable the fuzzy token-sort strategy
    #[serde(default)]
    pub fuzzy: bool,

    /// Minimum fuzzy score (0-100) to accept a match
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

fn default_fuzzy_threshold() -> f64 {
    80.0
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy: false,
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

/// Match assembly settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Drop markets that cannot be resolved and joined to a result
    #[serde(default)]
    pub strict: bool,
}

/// Accepted header spellings per expected column, resolved once at load time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_results_columns")]
    pub results: BTreeMap<String, Vec<String>>,

    #[serde(default = "default_alias_columns")]
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            results: default_results_columns(),
            aliases: default_alias_columns(),
        }
    }
}

fn column_table(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(name, aliases)| {
            (
                name.to_string(),
                aliases.iter().map(|a| a.to_string()).collect(),
            )
        })
        .collect()
}

fn default_results_columns() -> BTreeMap<String, Vec<String>> {
    column_table(&[
        ("winner_name", &["winner", "winner_full_name"]),
        ("loser_name", &["loser", "loser_full_name"]),
        ("tourney_name", &["tournament", "tourney"]),
        ("tourney_date", &["match_date", "date"]),
        ("round", &[]),
        ("score", &[]),
    ])
}

fn default_alias_columns() -> BTreeMap<String, Vec<String>> {
    column_table(&[
        ("alias", &["raw_name"]),
        ("full_name", &["standard", "canonical_name"]),
    ])
}
