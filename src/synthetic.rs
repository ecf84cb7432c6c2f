use std::collections::HashMap;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;

use crate::consensus::SpreadQuote;
use crate::features::{GameStatRow, PriorRatingRow, SeasonStatRow, TalentRow};
use crate::games::{Division, Game};
use crate::prior::{self, PriorConfig};
use crate::store;

/// Knobs for the synthetic league. Defaults give a mid-sized slate that
/// comfortably clears the MFTR game minimum.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub season: u16,
    pub teams: u32,
    pub weeks: u8,
    pub games_per_week: usize,
    pub books: usize,
    pub seed: u64,
    /// Spread of true team strength, in points.
    pub strength_sd: f64,
    pub hfa_points: f64,
    /// Book-to-book noise around the fair spread.
    pub market_noise_sd: f64,
    /// Game-to-game noise in realized margins.
    pub result_noise_sd: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            season: 2024,
            teams: 40,
            weeks: 12,
            games_per_week: 18,
            books: 5,
            seed: 7,
            strength_sd: 10.0,
            hfa_points: 2.6,
            market_noise_sd: 0.8,
            result_noise_sd: 12.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticSeason {
    pub config: SyntheticConfig,
    pub team_names: HashMap<u32, String>,
    pub true_powers: HashMap<u32, f64>,
    pub games: Vec<Game>,
    pub quotes: Vec<SpreadQuote>,
    pub game_stats: Vec<GameStatRow>,
    pub season_stats: Vec<SeasonStatRow>,
    pub talent: Vec<TalentRow>,
    pub priors: Vec<PriorRatingRow>,
}

/// Generate a full synthetic season: true strengths, schedule, results,
/// per-game stats consistent with the strengths, talent signals, a prior
/// season's ratings and multi-book market quotes around the fair spread.
/// Deterministic for a fixed seed.
pub fn generate(config: SyntheticConfig) -> SyntheticSeason {
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut team_names = HashMap::new();
    let mut true_powers = HashMap::new();
    let mut true_offense = HashMap::new();
    for team_id in 0..config.teams {
        team_names.insert(team_id, format!("Program {team_id:02}"));
        let power = gauss(&mut rng) * config.strength_sd;
        // Offense carries a bit more than half of the net strength.
        let offense = power * 0.55 + gauss(&mut rng) * 2.0;
        true_powers.insert(team_id, power);
        true_offense.insert(team_id, offense);
    }

    let mut games = Vec::new();
    let mut quotes = Vec::new();
    let mut game_stats = Vec::new();
    let mut game_id = 0u64;

    for week in 1..=config.weeks {
        let mut order: Vec<u32> = (0..config.teams).collect();
        shuffle(&mut order, &mut rng);
        for pair in order.chunks(2).take(config.games_per_week) {
            let [home, away] = pair else { continue };
            game_id += 1;
            // A couple of showcase games per season are at neutral sites.
            let neutral_site = week == 1 && game_id % 9 == 0;

            let fair =
                true_powers[home] - true_powers[away] + if neutral_site { 0.0 } else { config.hfa_points };
            let margin = fair + gauss(&mut rng) * config.result_noise_sd;
            let total = 52.0 + gauss(&mut rng) * 10.0;
            let home_points = ((total + margin) / 2.0).round().max(0.0) as i32;
            let away_points = ((total - margin) / 2.0).round().max(0.0) as i32;

            games.push(Game {
                id: game_id,
                season: config.season,
                week,
                home_id: *home,
                away_id: *away,
                home_points: Some(home_points),
                away_points: Some(away_points),
                neutral_site,
                postseason: false,
                completed: true,
                home_division: Division::Fbs,
                away_division: Division::Fbs,
            });

            for book in 0..config.books {
                quotes.push(SpreadQuote {
                    game_id,
                    book: format!("book_{book:02}"),
                    home_spread: fair + gauss(&mut rng) * config.market_noise_sd,
                    fetched_at: format!("{}-w{week:02}", config.season),
                });
            }

            for (team, opp, pts_for, pts_against) in [
                (*home, *away, home_points, away_points),
                (*away, *home, away_points, home_points),
            ] {
                let off_edge = true_offense[&team] - (true_powers[&opp] - true_offense[&opp]);
                game_stats.push(GameStatRow {
                    team_id: team,
                    season: config.season,
                    week,
                    off_yards_per_play: Some(5.7 + off_edge / 10.0 + gauss(&mut rng) * 0.5),
                    def_yards_per_play: Some(
                        5.7 - (true_powers[&team] - true_offense[&team]) / 10.0
                            + gauss(&mut rng) * 0.5,
                    ),
                    off_success_rate: Some(
                        (0.42 + off_edge / 200.0 + gauss(&mut rng) * 0.03).clamp(0.15, 0.75),
                    ),
                    def_success_rate: Some(
                        (0.42 - (true_powers[&team] - true_offense[&team]) / 200.0
                            + gauss(&mut rng) * 0.03)
                            .clamp(0.15, 0.75),
                    ),
                    off_explosiveness: Some(1.15 + f64::from(pts_for) / 200.0),
                    def_explosiveness: Some(1.15 + f64::from(pts_against) / 200.0),
                    pace: Some(65.0 + gauss(&mut rng) * 4.0),
                });
            }
        }
    }

    let season_stats = aggregate_season_stats(&game_stats, config.season);

    let talent: Vec<TalentRow> = (0..config.teams)
        .map(|team_id| {
            let power = true_powers[&team_id];
            TalentRow {
                team_id,
                season: config.season,
                talent_composite: Some(750.0 + power * 8.0 + gauss(&mut rng) * 20.0),
                blue_chip_pct: Some((0.3 + power / 60.0 + gauss(&mut rng) * 0.05).clamp(0.0, 1.0)),
                recruit_star_mix: Some((3.0 + power / 20.0).clamp(2.0, 5.0)),
                games_played: Some(u32::from(config.weeks)),
            }
        })
        .collect();

    // The prior tier comes from actually rating a simulated previous
    // season with the same programs, not from the current truth directly.
    let last_season = config.season - 1;
    let mut prior_games = Vec::new();
    let mut prior_id = 500_000u64;
    for week in 1..=8u8 {
        let mut order: Vec<u32> = (0..config.teams).collect();
        shuffle(&mut order, &mut rng);
        for pair in order.chunks(2) {
            let [home, away] = pair else { continue };
            prior_id += 1;
            let fair = true_powers[home] - true_powers[away] + config.hfa_points;
            let margin = fair + gauss(&mut rng) * config.result_noise_sd;
            let total = 52.0 + gauss(&mut rng) * 10.0;
            prior_games.push(Game {
                id: prior_id,
                season: last_season,
                week,
                home_id: *home,
                away_id: *away,
                home_points: Some(((total + margin) / 2.0).round().max(0.0) as i32),
                away_points: Some(((total - margin) / 2.0).round().max(0.0) as i32),
                neutral_site: false,
                postseason: false,
                completed: true,
                home_division: Division::Fbs,
                away_division: Division::Fbs,
            });
        }
    }
    let priors: Vec<PriorRatingRow> =
        prior::compute_prior_ratings(last_season, &prior_games, PriorConfig::default())
            .into_iter()
            .map(|row| PriorRatingRow {
                season: config.season,
                ..row
            })
            .collect();

    SyntheticSeason {
        config,
        team_names,
        true_powers,
        games,
        quotes,
        game_stats,
        season_stats,
        talent,
        priors,
    }
}

/// Persist a generated season into the sqlite store.
pub fn write_to_store(conn: &Connection, season: &SyntheticSeason) -> Result<()> {
    for (team_id, name) in &season.team_names {
        store::upsert_team(conn, *team_id, name, Division::Fbs)?;
    }
    for game in &season.games {
        store::upsert_game(conn, game)?;
    }
    for quote in &season.quotes {
        store::insert_spread_quote(conn, quote)?;
    }
    for row in &season.game_stats {
        store::upsert_game_stats(conn, row)?;
    }
    for row in &season.season_stats {
        store::upsert_season_stats(conn, row)?;
    }
    for row in &season.talent {
        store::upsert_talent(conn, row)?;
    }
    for row in &season.priors {
        store::upsert_prior_rating(conn, row)?;
    }
    Ok(())
}

fn aggregate_season_stats(game_stats: &[GameStatRow], season: u16) -> Vec<SeasonStatRow> {
    let mut grouped: HashMap<u32, Vec<&GameStatRow>> = HashMap::new();
    for row in game_stats {
        grouped.entry(row.team_id).or_default().push(row);
    }

    let mut out: Vec<SeasonStatRow> = grouped
        .into_iter()
        .map(|(team_id, rows)| SeasonStatRow {
            team_id,
            season,
            games: rows.len() as u32,
            off_yards_per_play: mean_of(&rows, |r| r.off_yards_per_play),
            def_yards_per_play: mean_of(&rows, |r| r.def_yards_per_play),
            off_success_rate: mean_of(&rows, |r| r.off_success_rate),
            def_success_rate: mean_of(&rows, |r| r.def_success_rate),
            off_explosiveness: mean_of(&rows, |r| r.off_explosiveness),
            def_explosiveness: mean_of(&rows, |r| r.def_explosiveness),
            pace: mean_of(&rows, |r| r.pace),
        })
        .collect();
    out.sort_by_key(|r| r.team_id);
    out
}

fn mean_of<F>(rows: &[&GameStatRow], pick: F) -> Option<f64>
where
    F: Fn(&GameStatRow) -> Option<f64>,
{
    let values: Vec<f64> = rows.iter().filter_map(|r| pick(r)).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Standard normal via Box-Muller.
fn gauss(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn shuffle(values: &mut [u32], rng: &mut StdRng) {
    for i in (1..values.len()).rev() {
        let j = rng.gen_range(0..=i);
        values.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic_per_seed() {
        let a = generate(SyntheticConfig::default());
        let b = generate(SyntheticConfig::default());
        assert_eq!(a.games.len(), b.games.len());
        for (x, y) in a.games.iter().zip(&b.games) {
            assert_eq!(x.home_id, y.home_id);
            assert_eq!(x.home_points, y.home_points);
        }
        assert_eq!(a.quotes[0].home_spread, b.quotes[0].home_spread);
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate(SyntheticConfig::default());
        let b = generate(SyntheticConfig {
            seed: 8,
            ..SyntheticConfig::default()
        });
        assert_ne!(a.quotes[0].home_spread, b.quotes[0].home_spread);
    }

    #[test]
    fn slate_clears_the_mftr_minimum() {
        let season = generate(SyntheticConfig::default());
        assert!(season.games.len() >= crate::mftr::MIN_TRAINING_GAMES);
        // Every game has full book depth.
        assert_eq!(
            season.quotes.len(),
            season.games.len() * season.config.books
        );
    }

    #[test]
    fn priors_come_from_a_previous_season_and_track_strength() {
        let season = generate(SyntheticConfig::default());
        assert_eq!(season.priors.len(), season.config.teams as usize);

        let truth: Vec<f64> = season
            .priors
            .iter()
            .map(|row| season.true_powers[&row.team_id])
            .collect();
        let fitted: Vec<f64> = season.priors.iter().map(|row| row.power).collect();
        let r = crate::calibrate::pearson(&fitted, &truth).unwrap();
        assert!(r > 0.6, "prior/truth correlation {r}");
    }

    #[test]
    fn season_stats_cover_every_scheduled_team() {
        let season = generate(SyntheticConfig::default());
        let scheduled: std::collections::HashSet<u32> = season
            .games
            .iter()
            .flat_map(|g| [g.home_id, g.away_id])
            .collect();
        assert_eq!(season.season_stats.len(), scheduled.len());
        for row in &season.season_stats {
            assert!(row.games > 0);
            assert!(row.off_yards_per_play.is_some());
        }
    }

    #[test]
    fn writes_into_the_store() {
        let conn = store::open_in_memory().unwrap();
        let season = generate(SyntheticConfig {
            teams: 8,
            weeks: 3,
            games_per_week: 4,
            ..SyntheticConfig::default()
        });
        write_to_store(&conn, &season).unwrap();
        let games = store::load_games(&conn, season.config.season).unwrap();
        assert_eq!(games.len(), season.games.len());
        let ids = store::load_team_ids(&conn, season.config.season).unwrap();
        assert!(!ids.is_empty());
    }
}
