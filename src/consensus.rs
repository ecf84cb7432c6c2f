use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::normalize::median;

/// Sign convention a spread value is expressed in. Home-minus-away is the
/// working frame everywhere in this crate; favorite-centric values must be
/// converted at the boundary and never mixed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadFrame {
    HomeMinusAway,
    FavoriteCentric,
}

/// One raw book quote, already normalized to the home-minus-away frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadQuote {
    pub game_id: u64,
    pub book: String,
    pub home_spread: f64,
    pub fetched_at: String,
}

/// A favorite-centric quote is negative for the favorite. In the
/// home-minus-away frame a positive value favors the home side.
pub fn hma_from_favorite(spread: f64, favorite_is_home: bool) -> f64 {
    if favorite_is_home { -spread } else { spread }
}

/// Minimum distinct books required before a consensus is trusted.
pub const MIN_BOOKS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusLine {
    pub game_id: u64,
    pub frame: SpreadFrame,
    pub value: f64,
    pub book_count: usize,
}

/// Median-of-medians consensus for one game: collapse each book to its
/// median quote first, then take the median across books. Returns None
/// below the book threshold.
pub fn consensus_spread(game_id: u64, quotes: &[SpreadQuote]) -> Option<ConsensusLine> {
    let mut per_book: HashMap<&str, Vec<f64>> = HashMap::new();
    for q in quotes {
        if q.game_id != game_id || !q.home_spread.is_finite() {
            continue;
        }
        per_book.entry(q.book.as_str()).or_default().push(q.home_spread);
    }

    let book_medians: Vec<f64> = per_book
        .values()
        .filter_map(|values| median(values))
        .collect();
    if book_medians.len() < MIN_BOOKS {
        return None;
    }

    Some(ConsensusLine {
        game_id,
        frame: SpreadFrame::HomeMinusAway,
        value: median(&book_medians)?,
        book_count: book_medians.len(),
    })
}

/// Consensus for every game with enough book depth.
pub fn consensus_lines(quotes: &[SpreadQuote]) -> HashMap<u64, ConsensusLine> {
    let mut by_game: HashMap<u64, Vec<SpreadQuote>> = HashMap::new();
    for q in quotes {
        by_game.entry(q.game_id).or_default().push(q.clone());
    }

    by_game
        .into_iter()
        .filter_map(|(game_id, quotes)| {
            consensus_spread(game_id, &quotes).map(|line| (game_id, line))
        })
        .collect()
}
