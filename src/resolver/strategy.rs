//! Resolution strategies.
//!
//! Each strategy is a pure lookup from a runner name to a canonical name.
//! The resolver tries them in a fixed precedence order and the first hit
//! wins.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::normalize::token_sorted;
use super::roster::Roster;

/// Exact raw spelling → canonical name
pub type AliasTable = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResolutionStrategy {
    Alias,
    Substring,
    Fuzzy,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alias => "alias",
            Self::Substring => "substring",
            Self::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal key lookup on the raw name, no normalization
pub fn resolve_alias(raw: &str, aliases: &AliasTable) -> Option<String> {
    aliases.get(raw).cloned()
}

/// Exact normalized hit first, then the first roster entry (load order) that
/// contains, or is contained by, the normalized name. Initialled forms only
/// match on whole tokens, so `mischa zverev` never hits `a zverev`.
pub fn resolve_substring(normalized: &str, roster: &Roster) -> Option<String> {
    if normalized.is_empty() {
        return None;
    }
    if let Some(canonical) = roster.get(normalized) {
        return Some(canonical.to_string());
    }

    let overlaps = |candidate: &str| candidate.contains(normalized) || normalized.contains(candidate);
    let padded_query = format!(" {} ", normalized);
    let token_overlaps = |candidate: &str| {
        let padded = format!(" {} ", candidate);
        padded.contains(&padded_query) || padded_query.contains(&padded)
    };

    roster
        .entries()
        .iter()
        .find(|entry| {
            overlaps(&entry.key)
                || entry.initialled.as_deref().map(token_overlaps).unwrap_or(false)
        })
        .map(|entry| entry.canonical.clone())
}

/// Token-order-insensitive similarity on a 0-100 scale
pub fn token_sort_score(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&token_sorted(a), &token_sorted(b)) * 100.0
}

/// Best-scoring roster entry at or above `threshold`. Ties keep the earliest
/// entry in load order.
pub fn resolve_fuzzy(normalized: &str, roster: &Roster, threshold: f64) -> Option<(String, f64)> {
    if normalized.is_empty() {
        return None;
    }

    let query = token_sorted(normalized);
    let mut best: Option<(&str, f64)> = None;

    for entry in roster.entries() {
        let score = strsim::normalized_levenshtein(&query, &entry.sorted) * 100.0;
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((entry.canonical.as_str(), score));
        }
    }

    best.filter(|(_, score)| *score >= threshold)
        .map(|(name, score)| (name.to_string(), score))
}
