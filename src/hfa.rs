use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::games::Game;
use crate::normalize::median;

/// Empirical-Bayes prior strength: a team needs 8 qualifying games for its
/// raw estimate to earn half the weight.
pub const PRIOR_STRENGTH: f64 = 8.0;
/// Cap on the shrink weight when fewer than 4 games are available.
pub const LOW_SAMPLE_WEIGHT_CAP: f64 = 0.4;
pub const LOW_SAMPLE_GAMES: u32 = 4;
/// Final HFA values are clamped to this range, in points.
pub const HFA_MIN: f64 = 0.5;
pub const HFA_MAX: f64 = 5.0;
/// |raw| beyond this is flagged for review.
pub const OUTLIER_ABS_RAW: f64 = 8.0;
/// League prior used when no team has any qualifying home/away split.
pub const DEFAULT_LEAGUE_HFA: f64 = 2.5;

/// Per-team, per-season home-field advantage diagnostic bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamHfa {
    pub team_id: u32,
    pub season: u16,
    /// Shrunk, clamped value downstream prediction uses.
    pub hfa_used: f64,
    /// Sample-size-weighted mean of home and (negated) away residuals.
    pub hfa_raw: f64,
    pub n_home: u32,
    pub n_away: u32,
    pub shrink_weight: f64,
    pub outlier: bool,
    pub low_sample: bool,
}

impl TeamHfa {
    pub fn n_total(&self) -> u32 {
        self.n_home + self.n_away
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueHfa {
    pub season: u16,
    pub league_median: f64,
    pub teams: Vec<TeamHfa>,
}

impl LeagueHfa {
    pub fn for_team(&self, team_id: u32) -> Option<&TeamHfa> {
        self.teams.iter().find(|t| t.team_id == team_id)
    }

    /// Site edge for one game: zero at neutral sites, always.
    pub fn game_hfa(&self, game: &Game) -> f64 {
        if game.neutral_site {
            return 0.0;
        }
        self.for_team(game.home_id)
            .map(|t| t.hfa_used)
            .unwrap_or(self.league_median.clamp(HFA_MIN, HFA_MAX))
    }
}

/// Estimate per-team HFA for a season from residual scoring margins.
///
/// First pass: each team's raw HFA is the sample-size-weighted average of
/// home residuals (margin minus rating difference) and negated away
/// residuals over qualifying games. Second pass: the league median of
/// those raw values becomes the shrinkage prior, each raw value is blended
/// with weight n/(n+8) (capped at 0.4 under 4 games) and clamped to
/// [0.5, 5.0] points.
pub fn estimate_league_hfa(
    season: u16,
    games: &[Game],
    powers: &HashMap<u32, f64>,
) -> LeagueHfa {
    let team_ids: BTreeSet<u32> = games
        .iter()
        .filter(|g| g.season == season)
        .flat_map(|g| [g.home_id, g.away_id])
        .collect();

    let raw: Vec<RawHfa> = team_ids
        .par_iter()
        .map(|&team_id| raw_team_hfa(team_id, season, games, powers))
        .collect();

    let sampled: Vec<f64> = raw
        .iter()
        .filter(|r| r.n_home + r.n_away > 0)
        .map(|r| r.raw)
        .collect();
    let league_median = median(&sampled).unwrap_or(DEFAULT_LEAGUE_HFA);

    let teams = raw
        .into_iter()
        .map(|r| shrink(r, season, league_median))
        .collect();

    LeagueHfa {
        season,
        league_median,
        teams,
    }
}

struct RawHfa {
    team_id: u32,
    raw: f64,
    n_home: u32,
    n_away: u32,
}

fn raw_team_hfa(
    team_id: u32,
    season: u16,
    games: &[Game],
    powers: &HashMap<u32, f64>,
) -> RawHfa {
    let mut sum = 0.0;
    let mut n_home = 0u32;
    let mut n_away = 0u32;

    for game in games {
        if game.season != season || !game.involves(team_id) || !game.counts_for_hfa() {
            continue;
        }
        let Some(margin) = game.actual_margin() else {
            continue;
        };
        let home_power = powers.get(&game.home_id).copied().unwrap_or(0.0);
        let away_power = powers.get(&game.away_id).copied().unwrap_or(0.0);
        // Residual in the host frame. Seen from the traveling team the
        // residual flips sign, and negating road residuals flips it back,
        // so both sides accumulate the same way here.
        let residual = margin - (home_power - away_power);
        sum += residual;

        if game.home_id == team_id {
            n_home += 1;
        } else {
            n_away += 1;
        }
    }

    let n_total = n_home + n_away;
    RawHfa {
        team_id,
        raw: if n_total > 0 { sum / f64::from(n_total) } else { 0.0 },
        n_home,
        n_away,
    }
}

fn shrink(raw: RawHfa, season: u16, league_median: f64) -> TeamHfa {
    let n_total = raw.n_home + raw.n_away;
    let (shrink_weight, hfa_used) = if n_total == 0 {
        (0.0, league_median)
    } else {
        let n = f64::from(n_total);
        let mut w = n / (n + PRIOR_STRENGTH);
        if n_total < LOW_SAMPLE_GAMES {
            w = w.min(LOW_SAMPLE_WEIGHT_CAP);
        }
        (w, w * raw.raw + (1.0 - w) * league_median)
    };

    TeamHfa {
        team_id: raw.team_id,
        season,
        hfa_used: hfa_used.clamp(HFA_MIN, HFA_MAX),
        hfa_raw: raw.raw,
        n_home: raw.n_home,
        n_away: raw.n_away,
        shrink_weight,
        outlier: raw.raw.abs() > OUTLIER_ABS_RAW,
        low_sample: n_total < 2,
    }
}
