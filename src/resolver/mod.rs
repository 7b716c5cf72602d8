//! Player Identity Resolver
//!
//! Maps free-text exchange runner names onto canonical player names from the
//! results table. Strategies run in a fixed precedence order:
//!
//! 1. `Alias`: exact raw-name override table
//! 2. `Substring`: normalized containment against the roster
//! 3. `Fuzzy`: token-sort similarity above a threshold (opt-in)
//!
//! The resolver is immutable once built and can be shared across threads.
//! Lookups never fail; an unresolved name is `None`.

pub mod normalize;
pub mod roster;
pub mod strategy;

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::ResolverConfig;
use crate::tables::CanonicalResults;

pub use normalize::normalize_name;
pub use roster::{Roster, RosterEntry};
pub use strategy::{AliasTable, ResolutionStrategy};

/// A successful lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub canonical: String,
    pub strategy: ResolutionStrategy,
    /// Similarity score for fuzzy hits
    pub score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Resolver {
    roster: Roster,
    aliases: AliasTable,
    strategies: Vec<ResolutionStrategy>,
    fuzzy_threshold: f64,
}

impl Resolver {
    pub fn new(roster: Roster, aliases: AliasTable, config: &ResolverConfig) -> Self {
        let mut strategies = vec![ResolutionStrategy::Alias, ResolutionStrategy::Substring];
        if config.fuzzy {
            strategies.push(ResolutionStrategy::Fuzzy);
        }
        Self {
            roster,
            aliases,
            strategies,
            fuzzy_threshold: config.fuzzy_threshold,
        }
    }

    pub fn from_results(
        results: &CanonicalResults,
        aliases: AliasTable,
        config: &ResolverConfig,
    ) -> Self {
        Self::new(Roster::from_results(results), aliases, config)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn strategies(&self) -> &[ResolutionStrategy] {
        &self.strategies
    }

    /// Resolve one runner name; first strategy with a hit wins
    pub fn resolve(&self, raw: &str) -> Option<Resolution> {
        let normalized = normalize_name(raw);

        self.strategies.iter().find_map(|strategy| {
            let hit = match strategy {
                ResolutionStrategy::Alias => {
                    strategy::resolve_alias(raw, &self.aliases).map(|name| (name, None))
                }
                ResolutionStrategy::Substring => {
                    strategy::resolve_substring(&normalized, &self.roster).map(|name| (name, None))
                }
                ResolutionStrategy::Fuzzy => {
                    strategy::resolve_fuzzy(&normalized, &self.roster, self.fuzzy_threshold)
                        .map(|(name, score)| (name, Some(score)))
                }
            };
            hit.map(|(canonical, score)| Resolution {
                canonical,
                strategy: *strategy,
                score,
            })
        })
    }
}

/// Resolution outcome counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionStats {
    pub lookups: u64,
    pub unresolved: u64,
    pub by_strategy: BTreeMap<ResolutionStrategy, u64>,
}

impl ResolutionStats {
    pub fn record(&mut self, outcome: Option<&Resolution>) {
        self.lookups += 1;
        match outcome {
            Some(resolution) => *self.by_strategy.entry(resolution.strategy).or_insert(0) += 1,
            None => self.unresolved += 1,
        }
    }

    pub fn resolved(&self) -> u64 {
        self.lookups - self.unresolved
    }

    pub fn resolution_rate(&self) -> f64 {
        if self.lookups == 0 {
            return 0.0;
        }
        self.resolved() as f64 / self.lookups as f64
    }
}
