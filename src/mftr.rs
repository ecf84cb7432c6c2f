use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibrate::pearson;
use crate::consensus::ConsensusLine;
use crate::games::Game;
use crate::linalg::{ols_line, solve_gaussian};

/// Ridge term added to the normal-equation diagonal. Keeps the system
/// uniquely solvable even when the schedule graph is thin.
pub const DEFAULT_RIDGE_LAMBDA: f64 = 0.01;
/// Below this many training games the solution is not worth trusting.
pub const MIN_TRAINING_GAMES: usize = 50;

#[derive(Debug, Clone, Error)]
pub enum MftrError {
    #[error("only {games} qualifying games in the training window, need at least {required}")]
    InsufficientGames { games: usize, required: usize },
    #[error(
        "team participation graph splits into {components} components \
         (largest covers {largest} of {teams} teams)"
    )]
    DisconnectedGraph {
        components: usize,
        largest: usize,
        teams: usize,
    },
    #[error("normal equations are singular")]
    SingularSystem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MftrConfig {
    pub lambda: f64,
    pub min_games: usize,
    /// Inclusive week window; None trains on the whole season.
    pub week_range: Option<(u8, u8)>,
}

impl Default for MftrConfig {
    fn default() -> Self {
        Self {
            lambda: DEFAULT_RIDGE_LAMBDA,
            min_games: MIN_TRAINING_GAMES,
            week_range: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitMetrics {
    pub games: usize,
    pub rmse: f64,
    pub r_squared: f64,
    pub pearson_r: f64,
    /// OLS of target ~ predicted; a well-wired fit sits near slope 1,
    /// intercept 0.
    pub ols_slope: f64,
    pub ols_intercept: f64,
}

/// Team ratings and a single global HFA constant fitted to market spreads
/// over one training window. Ratings are mean-centered; only pairwise
/// differences carry meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MftrSolution {
    pub season: u16,
    pub ratings: HashMap<u32, f64>,
    pub hfa_constant: f64,
    pub fit: FitMetrics,
}

impl MftrSolution {
    /// Predicted home-minus-away spread for a matchup.
    pub fn predicted_spread(&self, home_id: u32, away_id: u32, neutral_site: bool) -> f64 {
        let home = self.ratings.get(&home_id).copied().unwrap_or(0.0);
        let away = self.ratings.get(&away_id).copied().unwrap_or(0.0);
        let site = if neutral_site { 0.0 } else { self.hfa_constant };
        home - away + site
    }
}

/// Fit team ratings directly to market consensus spreads: one equation per
/// game, `spread = r_home - r_away + hfa`, solved through the ridge
/// normal equations `(AtA + lambda*I) x = At b` with partial-pivot
/// Gaussian elimination. Fails loudly on thin windows and disconnected
/// schedules instead of returning garbage ratings.
pub fn build_mftr(
    season: u16,
    games: &[Game],
    lines: &HashMap<u64, ConsensusLine>,
    cfg: &MftrConfig,
) -> Result<MftrSolution, MftrError> {
    let rows: Vec<(&Game, f64)> = games
        .iter()
        .filter(|g| g.season == season && g.is_scored() && g.in_week_range(cfg.week_range))
        .filter_map(|g| lines.get(&g.id).map(|line| (g, line.value)))
        .collect();

    if rows.len() < cfg.min_games {
        return Err(MftrError::InsufficientGames {
            games: rows.len(),
            required: cfg.min_games,
        });
    }

    // Column index per team; the HFA constant takes the last column.
    let mut team_index: HashMap<u32, usize> = HashMap::new();
    for (game, _) in &rows {
        let next = team_index.len();
        team_index.entry(game.home_id).or_insert(next);
        let next = team_index.len();
        team_index.entry(game.away_id).or_insert(next);
    }
    let teams = team_index.len();
    check_connectivity(&rows, &team_index)?;

    let dim = teams + 1;
    let hfa_col = teams;
    let mut ata = vec![vec![0.0; dim]; dim];
    let mut atb = vec![0.0; dim];

    for (game, spread) in &rows {
        let h = team_index[&game.home_id];
        let a = team_index[&game.away_id];
        // Sparse row: +1 home, -1 away, +1 HFA (0 at neutral sites).
        let hfa_coeff = if game.neutral_site { 0.0 } else { 1.0 };
        let cols = [(h, 1.0), (a, -1.0), (hfa_col, hfa_coeff)];
        for &(i, ci) in &cols {
            if ci == 0.0 {
                continue;
            }
            for &(j, cj) in &cols {
                if cj != 0.0 {
                    ata[i][j] += ci * cj;
                }
            }
            atb[i] += ci * spread;
        }
    }
    for (i, row) in ata.iter_mut().enumerate() {
        row[i] += cfg.lambda;
    }

    let x = solve_gaussian(ata, atb).ok_or(MftrError::SingularSystem)?;

    // Center team ratings at zero. Pairwise differences are unchanged, so
    // every prediction survives the shift.
    let mean = x[..teams].iter().sum::<f64>() / teams as f64;
    let ratings: HashMap<u32, f64> = team_index
        .iter()
        .map(|(&team_id, &col)| (team_id, x[col] - mean))
        .collect();
    let hfa_constant = x[hfa_col];

    let mut solution = MftrSolution {
        season,
        ratings,
        hfa_constant,
        fit: FitMetrics::default(),
    };
    solution.fit = fit_metrics(&solution, &rows);
    Ok(solution)
}

fn check_connectivity(
    rows: &[(&Game, f64)],
    team_index: &HashMap<u32, usize>,
) -> Result<(), MftrError> {
    let teams = team_index.len();
    let mut parent: Vec<usize> = (0..teams).collect();

    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut cur = i;
        while parent[cur] != root {
            let next = parent[cur];
            parent[cur] = root;
            cur = next;
        }
        root
    }

    for (game, _) in rows {
        let h = find(&mut parent, team_index[&game.home_id]);
        let a = find(&mut parent, team_index[&game.away_id]);
        if h != a {
            parent[h] = a;
        }
    }

    let mut component_sizes: HashMap<usize, usize> = HashMap::new();
    for i in 0..teams {
        let root = find(&mut parent, i);
        *component_sizes.entry(root).or_insert(0) += 1;
    }

    if component_sizes.len() > 1 {
        let largest = component_sizes.values().copied().max().unwrap_or(0);
        return Err(MftrError::DisconnectedGraph {
            components: component_sizes.len(),
            largest,
            teams,
        });
    }
    Ok(())
}

fn fit_metrics(solution: &MftrSolution, rows: &[(&Game, f64)]) -> FitMetrics {
    let predicted: Vec<f64> = rows
        .iter()
        .map(|(g, _)| solution.predicted_spread(g.home_id, g.away_id, g.neutral_site))
        .collect();
    let target: Vec<f64> = rows.iter().map(|(_, spread)| *spread).collect();

    let n = target.len() as f64;
    let sse: f64 = predicted
        .iter()
        .zip(&target)
        .map(|(p, t)| (t - p).powi(2))
        .sum();
    let mean_target = target.iter().sum::<f64>() / n;
    let sst: f64 = target.iter().map(|t| (t - mean_target).powi(2)).sum();

    let (ols_slope, ols_intercept) = ols_line(&predicted, &target).unwrap_or((0.0, 0.0));

    FitMetrics {
        games: rows.len(),
        rmse: (sse / n).sqrt(),
        r_squared: if sst > 1e-12 { 1.0 - sse / sst } else { 0.0 },
        pearson_r: pearson(&predicted, &target).unwrap_or(0.0),
        ols_slope,
        ols_intercept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::SpreadFrame;
    use crate::games::Division;

    fn game(id: u64, week: u8, home: u32, away: u32) -> Game {
        Game {
            id,
            season: 2024,
            week,
            home_id: home,
            away_id: away,
            home_points: Some(28),
            away_points: Some(21),
            neutral_site: false,
            postseason: false,
            completed: true,
            home_division: Division::Fbs,
            away_division: Division::Fbs,
        }
    }

    fn line(game_id: u64, value: f64) -> ConsensusLine {
        ConsensusLine {
            game_id,
            frame: SpreadFrame::HomeMinusAway,
            value,
            book_count: 5,
        }
    }

    /// Dense synthetic slate over `teams` teams with spreads generated
    /// from known strengths plus a fixed HFA.
    fn synthetic_window(
        teams: u32,
        rounds: u8,
        hfa: f64,
    ) -> (Vec<Game>, HashMap<u64, ConsensusLine>, HashMap<u32, f64>) {
        let true_ratings: HashMap<u32, f64> =
            (0..teams).map(|t| (t, f64::from(t) - f64::from(teams - 1) / 2.0)).collect();
        let mut games = Vec::new();
        let mut lines = HashMap::new();
        let mut id = 0u64;
        for round in 0..rounds {
            for home in 0..teams {
                for away in 0..teams {
                    if home == away || (home + away + u32::from(round)) % 3 != 0 {
                        continue;
                    }
                    id += 1;
                    games.push(game(id, round + 1, home, away));
                    let spread = true_ratings[&home] - true_ratings[&away] + hfa;
                    lines.insert(id, line(id, spread));
                }
            }
        }
        (games, lines, true_ratings)
    }

    #[test]
    fn recovers_ratings_and_hfa_from_noiseless_spreads() {
        let (games, lines, true_ratings) = synthetic_window(12, 4, 2.6);
        let solution = build_mftr(2024, &games, &lines, &MftrConfig::default()).unwrap();

        assert!((solution.hfa_constant - 2.6).abs() < 0.05);
        // Pairwise differences should match the generator closely.
        let d_model = solution.ratings[&10] - solution.ratings[&3];
        let d_true = true_ratings[&10] - true_ratings[&3];
        assert!((d_model - d_true).abs() < 0.1);
        assert!(solution.fit.rmse < 0.1);
        assert!(solution.fit.r_squared > 0.99);
    }

    #[test]
    fn solved_ratings_are_mean_centered() {
        let (games, lines, _) = synthetic_window(10, 4, 3.0);
        let solution = build_mftr(2024, &games, &lines, &MftrConfig::default()).unwrap();
        let mean: f64 =
            solution.ratings.values().sum::<f64>() / solution.ratings.len() as f64;
        assert!(mean.abs() < 1e-9);
    }

    #[test]
    fn translation_of_ratings_leaves_predictions_unchanged() {
        let (games, lines, _) = synthetic_window(10, 4, 3.0);
        let solution = build_mftr(2024, &games, &lines, &MftrConfig::default()).unwrap();

        let mut shifted = solution.clone();
        for v in shifted.ratings.values_mut() {
            *v += 37.5;
        }
        for g in games.iter().take(20) {
            let a = solution.predicted_spread(g.home_id, g.away_id, g.neutral_site);
            let b = shifted.predicted_spread(g.home_id, g.away_id, g.neutral_site);
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn rejects_windows_below_the_game_minimum() {
        let (games, lines, _) = synthetic_window(12, 4, 2.6);
        let short: Vec<Game> = games.into_iter().take(40).collect();
        let err = build_mftr(2024, &short, &lines, &MftrConfig::default()).unwrap_err();
        match err {
            MftrError::InsufficientGames { games, required } => {
                assert_eq!(games, 40);
                assert_eq!(required, MIN_TRAINING_GAMES);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_disconnected_schedules() {
        // Two islands of teams that never meet.
        let mut games = Vec::new();
        let mut lines = HashMap::new();
        let mut id = 0u64;
        for round in 0..10u8 {
            for (lo, hi) in [(0u32, 6u32), (10, 16)] {
                for home in lo..hi {
                    for away in lo..hi {
                        if home == away || (home + away + u32::from(round)) % 4 != 0 {
                            continue;
                        }
                        id += 1;
                        games.push(game(id, round + 1, home, away));
                        lines.insert(id, line(id, 1.0));
                    }
                }
            }
        }
        assert!(games.len() >= MIN_TRAINING_GAMES);
        let err = build_mftr(2024, &games, &lines, &MftrConfig::default()).unwrap_err();
        assert!(matches!(err, MftrError::DisconnectedGraph { components: 2, .. }));
    }

    #[test]
    fn week_range_restricts_the_training_window() {
        let (games, lines, _) = synthetic_window(12, 4, 2.6);
        let cfg = MftrConfig {
            week_range: Some((1, 2)),
            min_games: 10,
            ..MftrConfig::default()
        };
        let solution = build_mftr(2024, &games, &lines, &cfg).unwrap();
        let in_window = games.iter().filter(|g| g.week <= 2).count();
        assert_eq!(solution.fit.games, in_window);
        assert!(in_window < games.len());
    }

    #[test]
    fn neutral_games_do_not_feed_the_hfa_column() {
        let (mut games, mut lines, _) = synthetic_window(12, 4, 2.6);
        // Re-mark a slice of games neutral and strip HFA from their spreads.
        for g in games.iter_mut().filter(|g| g.week == 2) {
            g.neutral_site = true;
            if let Some(line) = lines.get_mut(&g.id) {
                line.value -= 2.6;
            }
        }
        let solution = build_mftr(2024, &games, &lines, &MftrConfig::default()).unwrap();
        assert!((solution.hfa_constant - 2.6).abs() < 0.05);
        assert!(solution.fit.rmse < 0.1);
    }
}
