use std::collections::HashMap;

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Named team metrics the rating models consume. On-field efficiency
/// metrics come from the game/season/baseline tiers; talent metrics are
/// loaded independently and merged into whichever tier won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    OffYardsPerPlay,
    DefYardsPerPlay,
    OffSuccessRate,
    DefSuccessRate,
    OffExplosiveness,
    DefExplosiveness,
    Pace,
    TalentComposite,
    BlueChipPct,
    RecruitStarMix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherBetter,
    LowerBetter,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::OffYardsPerPlay,
        Metric::DefYardsPerPlay,
        Metric::OffSuccessRate,
        Metric::DefSuccessRate,
        Metric::OffExplosiveness,
        Metric::DefExplosiveness,
        Metric::Pace,
        Metric::TalentComposite,
        Metric::BlueChipPct,
        Metric::RecruitStarMix,
    ];

    /// Conceded-side metrics read "lower is better" in raw units.
    pub fn direction(self) -> Direction {
        match self {
            Metric::DefYardsPerPlay | Metric::DefSuccessRate | Metric::DefExplosiveness => {
                Direction::LowerBetter
            }
            _ => Direction::HigherBetter,
        }
    }

    /// On-field performance metrics, as opposed to roster talent signals.
    pub fn is_efficiency(self) -> bool {
        !matches!(
            self,
            Metric::TalentComposite | Metric::BlueChipPct | Metric::RecruitStarMix
        )
    }
}

/// Which tier of the store produced a feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Game,
    Season,
    Baseline,
    Missing,
}

/// One team-game stat line from the store. Every metric is optional; a
/// game row qualifies for the game tier if any efficiency metric is set.
#[derive(Debug, Clone, Default)]
pub struct GameStatRow {
    pub team_id: u32,
    pub season: u16,
    pub week: u8,
    pub off_yards_per_play: Option<f64>,
    pub def_yards_per_play: Option<f64>,
    pub off_success_rate: Option<f64>,
    pub def_success_rate: Option<f64>,
    pub off_explosiveness: Option<f64>,
    pub def_explosiveness: Option<f64>,
    pub pace: Option<f64>,
}

impl GameStatRow {
    fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::OffYardsPerPlay => self.off_yards_per_play,
            Metric::DefYardsPerPlay => self.def_yards_per_play,
            Metric::OffSuccessRate => self.off_success_rate,
            Metric::DefSuccessRate => self.def_success_rate,
            Metric::OffExplosiveness => self.off_explosiveness,
            Metric::DefExplosiveness => self.def_explosiveness,
            Metric::Pace => self.pace,
            _ => None,
        }
    }

    fn has_any_efficiency(&self) -> bool {
        Metric::ALL
            .iter()
            .filter(|m| m.is_efficiency())
            .any(|m| self.metric(*m).is_some_and(|v| v.is_finite()))
    }
}

/// Season-aggregate stat record, the second fallback tier.
#[derive(Debug, Clone, Default)]
pub struct SeasonStatRow {
    pub team_id: u32,
    pub season: u16,
    pub games: u32,
    pub off_yards_per_play: Option<f64>,
    pub def_yards_per_play: Option<f64>,
    pub off_success_rate: Option<f64>,
    pub def_success_rate: Option<f64>,
    pub off_explosiveness: Option<f64>,
    pub def_explosiveness: Option<f64>,
    pub pace: Option<f64>,
}

impl SeasonStatRow {
    fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::OffYardsPerPlay => self.off_yards_per_play,
            Metric::DefYardsPerPlay => self.def_yards_per_play,
            Metric::OffSuccessRate => self.off_success_rate,
            Metric::DefSuccessRate => self.def_success_rate,
            Metric::OffExplosiveness => self.off_explosiveness,
            Metric::DefExplosiveness => self.def_explosiveness,
            Metric::Pace => self.pace,
            _ => None,
        }
    }

    fn has_any_efficiency(&self) -> bool {
        Metric::ALL
            .iter()
            .filter(|m| m.is_efficiency())
            .any(|m| self.metric(*m).is_some_and(|v| v.is_finite()))
    }
}

/// Prior-model season rating, the last-resort baseline tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorRatingRow {
    pub team_id: u32,
    pub season: u16,
    pub offense: f64,
    pub defense: f64,
    pub power: f64,
}

/// Roster talent signals, loaded independently of on-field tiers.
#[derive(Debug, Clone, Default)]
pub struct TalentRow {
    pub team_id: u32,
    pub season: u16,
    pub talent_composite: Option<f64>,
    pub blue_chip_pct: Option<f64>,
    pub recruit_star_mix: Option<f64>,
    pub games_played: Option<u32>,
}

/// Everything the resolver can see for one team-season.
#[derive(Debug, Clone, Default)]
pub struct TeamFeatureInputs {
    pub game_rows: Vec<GameStatRow>,
    pub season_row: Option<SeasonStatRow>,
    pub prior: Option<PriorRatingRow>,
    pub talent: Option<TalentRow>,
}

/// Best-effort feature vector for one team-season. Derived on demand,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamFeatureVector {
    pub team_id: u32,
    pub season: u16,
    pub source: DataSource,
    pub confidence: f64,
    pub games_count: u32,
    pub last_updated: String,
    pub metrics: HashMap<Metric, f64>,
}

impl TeamFeatureVector {
    pub fn missing(team_id: u32, season: u16) -> Self {
        Self {
            team_id,
            season,
            source: DataSource::Missing,
            confidence: 0.0,
            games_count: 0,
            last_updated: Utc::now().to_rfc3339(),
            metrics: HashMap::new(),
        }
    }

    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }
}

/// How many recent games the game tier aggregates over.
pub const GAME_TIER_WINDOW: usize = 10;
/// Game count at which game-tier confidence saturates at 1.0.
pub const GAME_TIER_FULL_CONFIDENCE: f64 = 8.0;
pub const SEASON_TIER_CONFIDENCE: f64 = 0.7;
pub const BASELINE_TIER_CONFIDENCE: f64 = 0.3;
/// A talent-only vector is still usable early in the season, at low trust.
pub const TALENT_ONLY_CONFIDENCE: f64 = 0.15;

// Fixed rescale of a prior model rating back into per-play units:
// +-10 rating points ~ +-1.0 yards/play and +-0.05 success rate around the
// league-typical base. Approximate by construction; reviewed against the
// calibration gates rather than refit.
const BASELINE_YPP_BASE: f64 = 5.70;
const BASELINE_YPP_PER_RATING: f64 = 1.0 / 10.0;
const BASELINE_SR_BASE: f64 = 0.42;
const BASELINE_SR_PER_RATING: f64 = 0.05 / 10.0;

/// Resolve one team-season feature vector through the tier hierarchy:
/// recent games, else season aggregate, else prior-model baseline, else
/// missing. Talent signals merge into whichever tier was selected.
pub fn resolve_team_features(
    team_id: u32,
    season: u16,
    inputs: &TeamFeatureInputs,
) -> TeamFeatureVector {
    let mut vector = game_tier(team_id, season, &inputs.game_rows)
        .or_else(|| season_tier(team_id, season, inputs.season_row.as_ref()))
        .or_else(|| baseline_tier(team_id, season, inputs.prior.as_ref()))
        .unwrap_or_else(|| TeamFeatureVector::missing(team_id, season));

    merge_talent(&mut vector, inputs.talent.as_ref());
    vector
}

/// Resolve features for a whole season's worth of teams. A failed read for
/// one team degrades that team to the missing tier instead of failing the
/// batch. Teams are independent, so resolution fans out across the pool.
pub fn resolve_season_features<F>(
    season: u16,
    team_ids: &[u32],
    fetch: F,
) -> Vec<TeamFeatureVector>
where
    F: Fn(u32) -> anyhow::Result<TeamFeatureInputs> + Sync,
{
    team_ids
        .par_iter()
        .map(|&team_id| match fetch(team_id) {
            Ok(inputs) => resolve_team_features(team_id, season, &inputs),
            Err(err) => {
                log::warn!("feature load failed for team {team_id}: {err:#}");
                TeamFeatureVector::missing(team_id, season)
            }
        })
        .collect()
}

fn game_tier(team_id: u32, season: u16, rows: &[GameStatRow]) -> Option<TeamFeatureVector> {
    let mut qualifying: Vec<&GameStatRow> = rows
        .iter()
        .filter(|row| row.has_any_efficiency())
        .collect();
    if qualifying.is_empty() {
        return None;
    }
    // Most recent first, then take the aggregation window.
    qualifying.sort_by(|a, b| b.week.cmp(&a.week));
    qualifying.truncate(GAME_TIER_WINDOW);

    let mut metrics = HashMap::new();
    for metric in Metric::ALL.iter().filter(|m| m.is_efficiency()) {
        let values: Vec<f64> = qualifying
            .iter()
            .filter_map(|row| row.metric(*metric))
            .filter(|v| v.is_finite())
            .collect();
        if !values.is_empty() {
            metrics.insert(*metric, values.iter().sum::<f64>() / values.len() as f64);
        }
    }

    let games_count = qualifying.len() as u32;
    Some(TeamFeatureVector {
        team_id,
        season,
        source: DataSource::Game,
        confidence: (f64::from(games_count) / GAME_TIER_FULL_CONFIDENCE).min(1.0),
        games_count,
        last_updated: Utc::now().to_rfc3339(),
        metrics,
    })
}

fn season_tier(
    team_id: u32,
    season: u16,
    row: Option<&SeasonStatRow>,
) -> Option<TeamFeatureVector> {
    let row = row?;
    if !row.has_any_efficiency() {
        return None;
    }

    let mut metrics = HashMap::new();
    for metric in Metric::ALL.iter().filter(|m| m.is_efficiency()) {
        if let Some(v) = row.metric(*metric)
            && v.is_finite()
        {
            metrics.insert(*metric, v);
        }
    }

    Some(TeamFeatureVector {
        team_id,
        season,
        source: DataSource::Season,
        confidence: SEASON_TIER_CONFIDENCE,
        games_count: row.games,
        last_updated: Utc::now().to_rfc3339(),
        metrics,
    })
}

fn baseline_tier(
    team_id: u32,
    season: u16,
    prior: Option<&PriorRatingRow>,
) -> Option<TeamFeatureVector> {
    let prior = prior?;
    if !prior.offense.is_finite() || !prior.defense.is_finite() {
        return None;
    }

    let mut metrics = HashMap::new();
    metrics.insert(
        Metric::OffYardsPerPlay,
        BASELINE_YPP_BASE + prior.offense * BASELINE_YPP_PER_RATING,
    );
    metrics.insert(
        Metric::DefYardsPerPlay,
        BASELINE_YPP_BASE - prior.defense * BASELINE_YPP_PER_RATING,
    );
    metrics.insert(
        Metric::OffSuccessRate,
        BASELINE_SR_BASE + prior.offense * BASELINE_SR_PER_RATING,
    );
    metrics.insert(
        Metric::DefSuccessRate,
        BASELINE_SR_BASE - prior.defense * BASELINE_SR_PER_RATING,
    );

    Some(TeamFeatureVector {
        team_id,
        season,
        source: DataSource::Baseline,
        confidence: BASELINE_TIER_CONFIDENCE,
        games_count: 0,
        last_updated: Utc::now().to_rfc3339(),
        metrics,
    })
}

fn merge_talent(vector: &mut TeamFeatureVector, talent: Option<&TalentRow>) {
    let Some(talent) = talent else {
        return;
    };

    let mut merged_any = false;
    let pairs = [
        (Metric::TalentComposite, talent.talent_composite),
        (Metric::BlueChipPct, talent.blue_chip_pct),
        (Metric::RecruitStarMix, talent.recruit_star_mix),
    ];
    for (metric, value) in pairs {
        if let Some(v) = value
            && v.is_finite()
        {
            vector.metrics.insert(metric, v);
            merged_any = true;
        }
    }

    if vector.games_count == 0
        && let Some(gp) = talent.games_played
    {
        vector.games_count = gp;
    }

    if merged_any && vector.source == DataSource::Missing {
        vector.confidence = TALENT_ONLY_CONFIDENCE;
    }
}
