//! Raw exchange stream message types.
//!
//! One JSON object per line. Only the fields the decoder reads are modelled;
//! everything else in the payload is ignored by serde.

use serde::Deserialize;

/// Operation tag for market change messages
pub const OP_MARKET_CHANGE: &str = "mcm";

/// One decoded line
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub op: String,
    /// Publish time, epoch milliseconds
    #[serde(default)]
    pub pt: Option<i64>,
    #[serde(default)]
    pub mc: Vec<MarketChange>,
}

/// Per-market change block
#[derive(Debug, Clone, Deserialize)]
pub struct MarketChange {
    pub id: String,
    #[serde(default, rename = "marketDefinition")]
    pub market_definition: Option<RawMarketDefinition>,
    #[serde(default)]
    pub rc: Vec<RunnerChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMarketDefinition {
    #[serde(default, rename = "marketType")]
    pub market_type: Option<String>,
    #[serde(default, rename = "marketTime")]
    pub market_time: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub runners: Vec<RawRunner>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRunner {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Price-bearing runner update
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerChange {
    pub id: u64,
    #[serde(default)]
    pub ltp: Option<f64>,
}
