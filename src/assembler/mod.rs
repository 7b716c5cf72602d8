//! Match Assembler
//!
//! Turns final-price snapshot rows into one validated row per logical match:
//!
//! 1. Reduce rows to the latest price per (market, runner) and keep markets
//!    with exactly two priced runners
//! 2. Resolve both runner names against the canonical roster
//! 3. Join the resolved pair to the first canonical result in load order
//! 4. Hash a deterministic `match_id`
//! 5. Reject the whole batch if any `match_id` repeats
//!
//! Runner order is the market definition's order (`runner_1` first), falling
//! back to selection id when the definition names are missing. Prices stay
//! aligned to that raw order, never to the canonical winner/loser order.

pub mod match_id;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::decoder::reduce::latest_by_key;
use crate::decoder::MarketSnapshot;
use crate::error::PipelineError;
use crate::resolver::{Resolution, ResolutionStats, Resolver};
use crate::tables::{CanonicalMatchResult, CanonicalResults};

pub use match_id::match_id;

// ============================================================================
// TYPES
// ============================================================================

/// What to do with a market that cannot be resolved and joined to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssemblyPolicy {
    /// Emit with raw names and no outcome
    SnapshotOnly,
    /// Drop the market
    Strict,
}

/// Caller-supplied identity of the batch being assembled
#[derive(Debug, Clone)]
pub struct AssemblyContext {
    pub tournament: String,
    pub year: i32,
    pub policy: AssemblyPolicy,
}

/// One output row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledMatch {
    pub market_id: String,
    pub player_1: String,
    pub player_2: String,
    pub odds_player_1: f64,
    pub odds_player_2: f64,
    pub match_id: String,
    pub actual_winner: Option<String>,
    pub winner_name: Option<String>,
    pub loser_name: Option<String>,
    pub match_date: Option<NaiveDate>,
    pub selection_id_1: u64,
    pub selection_id_2: u64,
    pub player_1_won: Option<u8>,
    pub round: Option<String>,
    pub score: Option<String>,
    pub market_time: Option<DateTime<Utc>>,
}

impl AssembledMatch {
    pub fn has_outcome(&self) -> bool {
        self.actual_winner.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AssemblyStats {
    pub markets: usize,
    pub unpriced_rows: usize,
    pub malformed_markets: usize,
    pub unresolved_markets: usize,
    pub unmatched_markets: usize,
    pub dropped_markets: usize,
    pub emitted: usize,
    pub with_outcome: usize,
    /// Results table was empty, so no outcomes were attempted
    pub snapshot_only_fallback: bool,
    pub resolution: ResolutionStats,
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyOutput {
    pub matches: Vec<AssembledMatch>,
    pub stats: AssemblyStats,
}

/// The two priced runners of one market, in selection id order
#[derive(Debug, Clone)]
struct MarketPair {
    market_id: String,
    market_time: Option<DateTime<Utc>>,
    runners: [MarketSnapshot; 2],
}

struct Evaluated<'a> {
    pair: MarketPair,
    resolved: [Option<Resolution>; 2],
    result: Option<&'a CanonicalMatchResult>,
}

// ============================================================================
// ASSEMBLER
// ============================================================================

pub struct Assembler<'a> {
    resolver: &'a Resolver,
    results: &'a CanonicalResults,
}

impl<'a> Assembler<'a> {
    /// `results` should already be filtered to the caller's tournament/date window
    pub fn new(resolver: &'a Resolver, results: &'a CanonicalResults) -> Self {
        Self { resolver, results }
    }

    pub fn assemble(
        &self,
        snapshots: Vec<MarketSnapshot>,
        ctx: &AssemblyContext,
    ) -> Result<AssemblyOutput> {
        let mut stats = AssemblyStats::default();
        let pairs = group_markets(snapshots, &mut stats);

        stats.snapshot_only_fallback = self.results.is_empty();
        if stats.snapshot_only_fallback {
            info!(
                "Results table is empty, assembling {} markets snapshot-only",
                pairs.len()
            );
        }

        let fallback = stats.snapshot_only_fallback;
        let evaluated: Vec<Evaluated<'a>> = pairs
            .into_par_iter()
            .map(|pair| self.evaluate(pair, fallback))
            .collect();

        let mut matches = Vec::with_capacity(evaluated.len());
        for item in evaluated {
            if let Some(row) = self.finish(item, ctx, &mut stats) {
                matches.push(row);
            }
        }

        stats.emitted = matches.len();
        stats.with_outcome = matches.iter().filter(|m| m.has_outcome()).count();

        validate_unique_match_ids(&matches)?;

        if !fallback {
            info!(
                "Resolution rate {:.1}% ({} of {} names; {:?})",
                stats.resolution.resolution_rate() * 100.0,
                stats.resolution.resolved(),
                stats.resolution.lookups,
                stats.resolution.by_strategy,
            );
        }
        info!(
            "Assembled {} matches for {} {} ({} with outcome, {} dropped, {} malformed markets)",
            stats.emitted,
            ctx.tournament,
            ctx.year,
            stats.with_outcome,
            stats.dropped_markets,
            stats.malformed_markets,
        );

        Ok(AssemblyOutput { matches, stats })
    }

    /// Resolution and result lookup; read-only, runs on the rayon pool
    fn evaluate(&self, pair: MarketPair, fallback: bool) -> Evaluated<'a> {
        if fallback {
            return Evaluated {
                pair,
                resolved: [None, None],
                result: None,
            };
        }

        let resolved = [
            self.resolver.resolve(&pair.runners[0].runner_name),
            self.resolver.resolve(&pair.runners[1].runner_name),
        ];
        let result = match &resolved {
            [Some(a), Some(b)] => self.results.find_pair(&a.canonical, &b.canonical),
            _ => None,
        };

        Evaluated {
            pair,
            resolved,
            result,
        }
    }

    /// Apply the policy and build the output row
    fn finish(
        &self,
        item: Evaluated<'a>,
        ctx: &AssemblyContext,
        stats: &mut AssemblyStats,
    ) -> Option<AssembledMatch> {
        let Evaluated {
            pair,
            resolved,
            result,
        } = item;
        let fallback = stats.snapshot_only_fallback;

        if !fallback {
            for outcome in &resolved {
                stats.resolution.record(outcome.as_ref());
            }

            if resolved.iter().any(Option::is_none) {
                stats.unresolved_markets += 1;
                warn!(
                    "Market {}: unresolved runner(s) {:?} / {:?}",
                    pair.market_id,
                    resolved[0].as_ref().map_or(pair.runners[0].runner_name.as_str(), |_| "-"),
                    resolved[1].as_ref().map_or(pair.runners[1].runner_name.as_str(), |_| "-"),
                );
            } else if result.is_none() {
                stats.unmatched_markets += 1;
                warn!(
                    "Market {}: no canonical result for {} vs {}",
                    pair.market_id,
                    resolved[0].as_ref().map_or("", |r| r.canonical.as_str()),
                    resolved[1].as_ref().map_or("", |r| r.canonical.as_str()),
                );
            }

            if result.is_none() && ctx.policy == AssemblyPolicy::Strict {
                stats.dropped_markets += 1;
                return None;
            }
        }

        let [first, second] = &pair.runners;
        // Canonical names only when both runners resolved
        let (player_1, player_2) = match &resolved {
            [Some(a), Some(b)] => (a.canonical.clone(), b.canonical.clone()),
            _ => (first.runner_name.clone(), second.runner_name.clone()),
        };

        let mut row = AssembledMatch {
            match_id: match_id(
                &ctx.tournament,
                ctx.year,
                &first.runner_name,
                &second.runner_name,
                &pair.market_id,
            ),
            market_id: pair.market_id.clone(),
            odds_player_1: first.ltp.unwrap_or_default(),
            odds_player_2: second.ltp.unwrap_or_default(),
            selection_id_1: first.selection_id,
            selection_id_2: second.selection_id,
            actual_winner: None,
            winner_name: None,
            loser_name: None,
            match_date: None,
            player_1_won: None,
            round: None,
            score: None,
            market_time: pair.market_time,
            player_1,
            player_2,
        };

        if let Some(result) = result {
            row.actual_winner = Some(result.winner_name.clone());
            row.winner_name = Some(result.winner_name.clone());
            row.loser_name = Some(result.loser_name.clone());
            row.match_date = Some(result.match_date);
            row.player_1_won = Some(u8::from(result.winner_name == row.player_1));
            row.round = result.round.clone();
            row.score = result.score.clone();
        }

        Some(row)
    }
}

/// Latest priced row per (market, runner), grouped into two-runner markets
fn group_markets(snapshots: Vec<MarketSnapshot>, stats: &mut AssemblyStats) -> Vec<MarketPair> {
    let total = snapshots.len();
    let priced: Vec<MarketSnapshot> = snapshots.into_iter().filter(|s| s.ltp.is_some()).collect();
    stats.unpriced_rows = total - priced.len();
    if stats.unpriced_rows > 0 {
        debug!("Ignoring {} snapshot rows without a price", stats.unpriced_rows);
    }

    let latest = latest_by_key(
        priced,
        |s| (s.market_id.clone(), s.selection_id),
        |s| s.timestamp,
    );

    let mut markets: Vec<Vec<MarketSnapshot>> = Vec::new();
    for row in latest {
        match markets.last_mut() {
            Some(group) if group[0].market_id == row.market_id => group.push(row),
            _ => markets.push(vec![row]),
        }
    }
    stats.markets = markets.len();

    markets
        .into_iter()
        .filter_map(|group| {
            let market_id = group[0].market_id.clone();
            match <[MarketSnapshot; 2]>::try_from(group) {
                Ok(runners) => Some(MarketPair {
                    market_time: runners[0].market_time.or(runners[1].market_time),
                    runners: in_definition_order(runners),
                    market_id,
                }),
                Err(group) => {
                    stats.malformed_markets += 1;
                    warn!(
                        "Market {}: {} priced runners, expected 2, skipping",
                        market_id,
                        group.len()
                    );
                    None
                }
            }
        })
        .collect()
}

/// Put the definition's first runner first. Rows without definition names
/// keep selection id order.
fn in_definition_order(runners: [MarketSnapshot; 2]) -> [MarketSnapshot; 2] {
    let [a, b] = runners;
    let declared_first = a.runner_1.as_str();
    if !declared_first.is_empty() && b.runner_name == declared_first && a.runner_name != declared_first {
        [b, a]
    } else {
        [a, b]
    }
}

/// Every `match_id` must be unique; any repeat fails the batch
pub fn validate_unique_match_ids(matches: &[AssembledMatch]) -> Result<(), PipelineError> {
    let mut seen = HashSet::with_capacity(matches.len());
    let duplicates: BTreeSet<&str> = matches
        .iter()
        .filter(|m| !seen.insert(m.match_id.as_str()))
        .map(|m| m.match_id.as_str())
        .collect();

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::DuplicateMatchIds {
            ids: duplicates.into_iter().map(str::to_string).collect(),
        })
    }
}

/// Concatenate separately assembled batches and re-check uniqueness
pub fn merge_outputs(outputs: Vec<AssemblyOutput>) -> Result<Vec<AssembledMatch>, PipelineError> {
    let matches: Vec<AssembledMatch> = outputs.into_iter().flat_map(|o| o.matches).collect();
    validate_unique_match_ids(&matches)?;
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::resolver::{AliasTable, Roster};
    use crate::tables::CanonicalMatchResult;

    fn snap(market: &str, sel: u64, name: &str, ltp: Option<f64>, ts: i64) -> MarketSnapshot {
        MarketSnapshot {
            market_id: market.into(),
            selection_id: sel,
            ltp,
            timestamp: ts,
            market_time: None,
            market_name: "Match Odds".into(),
            runner_name: name.into(),
            runner_1: String::new(),
            runner_2: String::new(),
        }
    }

    fn result(winner: &str, loser: &str) -> CanonicalMatchResult {
        CanonicalMatchResult {
            winner_name: winner.into(),
            loser_name: loser.into(),
            tourney_name: "Australian Open".into(),
            match_date: NaiveDate::from_ymd_opt(2023, 1, 16).unwrap(),
            round: Some("R128".into()),
            score: Some("6-1 6-2 6-3".into()),
        }
    }

    fn ctx(policy: AssemblyPolicy) -> AssemblyContext {
        AssemblyContext {
            tournament: "ausopen".into(),
            year: 2023,
            policy,
        }
    }

    fn resolver_for(results: &CanonicalResults, fuzzy: bool) -> Resolver {
        Resolver::new(
            Roster::from_results(results),
            AliasTable::new(),
            &ResolverConfig {
                fuzzy,
                ..ResolverConfig::default()
            },
        )
    }

    fn sample_snapshots() -> Vec<MarketSnapshot> {
        vec![
            snap("1.2", 20, "T. Paul", Some(2.4), 5),
            snap("1.1", 11, "N. DJOKOVIC", Some(1.10), 10),
            snap("1.1", 12, "Roberto Carballes Baena", Some(7.5), 10),
            snap("1.1", 11, "N. DJOKOVIC", Some(1.05), 20),
            snap("1.2", 21, "Jahn Millman", Some(1.7), 5),
            snap("1.3", 30, "Lonely Runner", Some(1.3), 5),
            snap("1.4", 40, "Nobody Known", Some(1.9), 5),
            snap("1.4", 41, "Also Unknown", None, 5),
        ]
    }

    #[test]
    fn test_assembles_resolved_matches_with_outcomes() {
        let results = CanonicalResults::from_rows(vec![
            result("Novak Djokovic", "Roberto Carballes Baena"),
            result("John Millman", "Tommy Paul"),
        ]);
        let resolver = resolver_for(&results, true);
        let output = Assembler::new(&resolver, &results)
            .assemble(sample_snapshots(), &ctx(AssemblyPolicy::SnapshotOnly))
            .unwrap();

        assert_eq!(output.stats.markets, 4);
        assert_eq!(output.stats.malformed_markets, 2);
        assert_eq!(output.matches.len(), 2);

        let djokovic = &output.matches[0];
        assert_eq!(djokovic.market_id, "1.1");
        assert_eq!(djokovic.player_1, "Novak Djokovic");
        assert_eq!(djokovic.odds_player_1, 1.05);
        assert_eq!(djokovic.odds_player_2, 7.5);
        assert_eq!(djokovic.actual_winner.as_deref(), Some("Novak Djokovic"));
        assert_eq!(djokovic.player_1_won, Some(1));
        assert_eq!(djokovic.round.as_deref(), Some("R128"));

        // Prices follow raw runner order even though player 2 won
        let millman = &output.matches[1];
        assert_eq!(millman.player_1, "Tommy Paul");
        assert_eq!(millman.player_2, "John Millman");
        assert_eq!(millman.odds_player_1, 2.4);
        assert_eq!(millman.odds_player_2, 1.7);
        assert_eq!(millman.winner_name.as_deref(), Some("John Millman"));
        assert_eq!(millman.player_1_won, Some(0));
        assert_eq!(millman.selection_id_1, 20);
    }

    #[test]
    fn test_snapshot_only_keeps_unresolved_and_strict_drops() {
        let results = CanonicalResults::from_rows(vec![
            result("Novak Djokovic", "Roberto Carballes Baena"),
            result("Someone Else", "Another Player"),
        ]);
        let resolver = resolver_for(&results, false);
        let assembler = Assembler::new(&resolver, &results);
        let snapshots = vec![
            snap("1.1", 11, "N. DJOKOVIC", Some(1.05), 1),
            snap("1.1", 12, "Roberto Carballes Baena", Some(7.5), 1),
            snap("1.5", 50, "Mystery Qualifier", Some(1.5), 1),
            snap("1.5", 51, "Lucky Loser", Some(2.5), 1),
            snap("1.6", 60, "N. DJOKOVIC", Some(1.2), 1),
            snap("1.6", 61, "Mystery Q", Some(4.5), 1),
        ];

        let relaxed = assembler
            .assemble(snapshots.clone(), &ctx(AssemblyPolicy::SnapshotOnly))
            .unwrap();
        assert_eq!(relaxed.matches.len(), 3);
        let unresolved = &relaxed.matches[1];
        assert_eq!(unresolved.player_1, "Mystery Qualifier");
        assert!(!unresolved.has_outcome());

        // One resolved runner is not enough: both names stay raw
        let half = &relaxed.matches[2];
        assert_eq!(half.player_1, "N. DJOKOVIC");
        assert_eq!(half.player_2, "Mystery Q");
        assert!(!half.has_outcome());

        assert_eq!(relaxed.stats.unresolved_markets, 2);
        assert_eq!(relaxed.stats.resolution.lookups, 6);
        assert_eq!(relaxed.stats.resolution.unresolved, 3);

        let strict = assembler
            .assemble(snapshots, &ctx(AssemblyPolicy::Strict))
            .unwrap();
        assert_eq!(strict.matches.len(), 1);
        assert_eq!(strict.matches[0].market_id, "1.1");
        assert_eq!(strict.stats.dropped_markets, 2);
    }

    #[test]
    fn test_runner_order_follows_market_definition() {
        let results = CanonicalResults::from_rows(vec![result("Novak Djokovic", "Rafael Nadal")]);
        let resolver = resolver_for(&results, false);
        let declared = |sel: u64, name: &str, ltp: f64| MarketSnapshot {
            runner_1: "Rafael Nadal".into(),
            runner_2: "Novak Djokovic".into(),
            ..snap("1.7", sel, name, Some(ltp), 1)
        };
        // First declared runner carries the larger selection id
        let snapshots = vec![declared(202, "Rafael Nadal", 3.2), declared(101, "Novak Djokovic", 1.4)];

        let output = Assembler::new(&resolver, &results)
            .assemble(snapshots, &ctx(AssemblyPolicy::SnapshotOnly))
            .unwrap();
        let row = &output.matches[0];
        assert_eq!(row.player_1, "Rafael Nadal");
        assert_eq!(row.player_2, "Novak Djokovic");
        assert_eq!(row.odds_player_1, 3.2);
        assert_eq!(row.odds_player_2, 1.4);
        assert_eq!((row.selection_id_1, row.selection_id_2), (202, 101));
        assert_eq!(row.player_1_won, Some(0));
        assert_eq!(
            row.match_id,
            match_id("ausopen", 2023, "Rafael Nadal", "Novak Djokovic", "1.7")
        );
    }

    #[test]
    fn test_resolved_pair_without_result_respects_policy() {
        let results = CanonicalResults::from_rows(vec![
            result("Novak Djokovic", "Rafael Nadal"),
            result("Roberto Carballes Baena", "Casper Ruud"),
        ]);
        let resolver = resolver_for(&results, false);
        let snapshots = vec![
            snap("1.1", 11, "Novak Djokovic", Some(1.05), 1),
            snap("1.1", 12, "Roberto Carballes Baena", Some(7.5), 1),
        ];
        let assembler = Assembler::new(&resolver, &results);

        let relaxed = assembler
            .assemble(snapshots.clone(), &ctx(AssemblyPolicy::SnapshotOnly))
            .unwrap();
        assert_eq!(relaxed.stats.unmatched_markets, 1);
        assert_eq!(relaxed.matches.len(), 1);
        assert!(!relaxed.matches[0].has_outcome());

        let strict = assembler.assemble(snapshots, &ctx(AssemblyPolicy::Strict)).unwrap();
        assert!(strict.matches.is_empty());
    }

    #[test]
    fn test_empty_results_falls_back_to_snapshot_only() {
        let results = CanonicalResults::default();
        let resolver = resolver_for(&results, true);
        let output = Assembler::new(&resolver, &results)
            .assemble(sample_snapshots(), &ctx(AssemblyPolicy::Strict))
            .unwrap();

        assert!(output.stats.snapshot_only_fallback);
        assert_eq!(output.matches.len(), 2);
        assert!(output.matches.iter().all(|m| m.actual_winner.is_none()));
        assert_eq!(output.matches[0].player_1, "N. DJOKOVIC");
        assert_eq!(output.stats.resolution.lookups, 0);
    }

    #[test]
    fn test_match_ids_are_reproducible() {
        let results = CanonicalResults::from_rows(vec![result("Novak Djokovic", "Roberto Carballes Baena")]);
        let resolver = resolver_for(&results, true);
        let assembler = Assembler::new(&resolver, &results);
        let first = assembler
            .assemble(sample_snapshots(), &ctx(AssemblyPolicy::SnapshotOnly))
            .unwrap();
        let second = assembler
            .assemble(sample_snapshots(), &ctx(AssemblyPolicy::SnapshotOnly))
            .unwrap();

        let ids = |o: &AssemblyOutput| o.matches.iter().map(|m| m.match_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(
            first.matches[0].match_id,
            match_id("ausopen", 2023, "N. DJOKOVIC", "Roberto Carballes Baena", "1.1")
        );
    }

    #[test]
    fn test_duplicate_match_ids_are_rejected() {
        let results = CanonicalResults::default();
        let resolver = resolver_for(&results, false);
        let assembler = Assembler::new(&resolver, &results);
        let batch = vec![
            snap("1.1", 11, "A", Some(1.5), 1),
            snap("1.1", 12, "B", Some(2.5), 1),
        ];

        let first = assembler
            .assemble(batch.clone(), &ctx(AssemblyPolicy::SnapshotOnly))
            .unwrap();
        let second = assembler
            .assemble(batch, &ctx(AssemblyPolicy::SnapshotOnly))
            .unwrap();

        let err = merge_outputs(vec![first, second]).unwrap_err();
        match err {
            PipelineError::DuplicateMatchIds { ids } => {
                assert_eq!(ids, vec![match_id("ausopen", 2023, "A", "B", "1.1")]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
