//! Canonical player roster.
//!
//! Normalized name → original-cased canonical name, kept in load order so
//! every scan over the roster is deterministic.

use std::collections::HashMap;
use tracing::debug;

use super::normalize::{initialled, normalize_name, token_sorted};
use crate::tables::CanonicalResults;

#[derive(Debug, Clone)]
pub struct RosterEntry {
    /// Normalized canonical name
    pub key: String,
    /// First-initial form of `key`, when it has one
    pub initialled: Option<String>,
    /// `key` with tokens sorted, for fuzzy scoring
    pub sorted: String,
    /// Original-cased canonical name
    pub canonical: String,
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
    index: HashMap<String, usize>,
    /// Distinct spellings that collapsed onto an existing key
    collisions: usize,
}

impl Roster {
    /// Build from canonical names in load order; first spelling per key wins
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roster = Self::default();
        for name in names {
            roster.insert(name.as_ref());
        }
        roster
    }

    /// Every distinct winner and loser name, row by row (winner first)
    pub fn from_results(results: &CanonicalResults) -> Self {
        let roster = Self::from_names(
            results
                .rows()
                .iter()
                .flat_map(|row| [row.winner_name.as_str(), row.loser_name.as_str()]),
        );
        if roster.collisions > 0 {
            debug!(
                "{} canonical spellings collapsed onto existing roster keys",
                roster.collisions
            );
        }
        roster
    }

    fn insert(&mut self, name: &str) {
        let canonical = name.trim();
        let key = normalize_name(canonical);
        if key.is_empty() {
            return;
        }
        if let Some(&idx) = self.index.get(&key) {
            if self.entries[idx].canonical != canonical {
                self.collisions += 1;
            }
            return;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(RosterEntry {
            initialled: initialled(&key),
            sorted: token_sorted(&key),
            canonical: canonical.to_string(),
            key,
        });
    }

    /// Canonical name for an already-normalized key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .map(|&idx| self.entries[idx].canonical.as_str())
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }
}
