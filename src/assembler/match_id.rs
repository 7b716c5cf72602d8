//! Deterministic match identifiers.
//!
//! `sha256("{tournament}_{year}_{player_1}_{player_2}_{market_id}")`, hex
//! encoded, over the raw exchange runner names. Player order is part of the
//! key: swapping the players yields a different id.

use sha2::{Digest, Sha256};

pub fn match_id(
    tournament: &str,
    year: i32,
    player_1: &str,
    player_2: &str,
    market_id: &str,
) -> String {
    let key = format!(
        "{}_{}_{}_{}_{}",
        tournament, year, player_1, player_2, market_id
    );
    hex::encode(Sha256::digest(key.as_bytes()))
}
