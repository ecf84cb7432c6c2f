use serde::{Deserialize, Serialize};

use crate::features::{DataSource, Direction, TeamFeatureVector};
use crate::hfa::TeamHfa;
use crate::normalize::NormalizationTable;
use crate::scenarios::{MetricWeight, WeightScenario};

/// One team's rating under one model version. Comparable to other ratings
/// from the same model version only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRating {
    pub team_id: u32,
    pub season: u16,
    pub model_version: String,
    pub offense: f64,
    pub defense: f64,
    pub power: f64,
    pub data_source: DataSource,
    pub confidence: f64,
    pub hfa: Option<TeamHfa>,
}

/// Weighted z-score composites per team. Defensive metrics are inverted
/// after z-scoring so every weighted term reads "higher is better";
/// power = offense + defense. When the scenario sets a target spread,
/// power is mean-centered and rescaled to that point scale.
pub fn compute_ratings(
    vectors: &[TeamFeatureVector],
    scenario: &WeightScenario,
    table: &NormalizationTable,
) -> Vec<TeamRating> {
    let mut ratings: Vec<TeamRating> = vectors
        .iter()
        .map(|vector| {
            let offense = composite(vector, &scenario.offense, table);
            let defense = composite(vector, &scenario.defense, table);
            TeamRating {
                team_id: vector.team_id,
                season: vector.season,
                model_version: scenario.model_version.clone(),
                offense,
                defense,
                power: offense + defense,
                data_source: vector.source,
                confidence: vector.confidence,
                hfa: None,
            }
        })
        .collect();

    if let Some(target_sd) = scenario.target_spread_sd {
        rescale_power(&mut ratings, target_sd);
    }
    ratings
}

/// Predicted home-minus-away margin for a matchup. Neutral sites always
/// get HFA = 0, no matter what was estimated for the home team.
pub fn predicted_margin(home: &TeamRating, away: &TeamRating, hfa: f64, neutral_site: bool) -> f64 {
    let site_edge = if neutral_site { 0.0 } else { hfa };
    home.power - away.power + site_edge
}

fn composite(
    vector: &TeamFeatureVector,
    weights: &[MetricWeight],
    table: &NormalizationTable,
) -> f64 {
    weights
        .iter()
        .map(|mw| {
            let z = table.z(vector, mw.metric);
            let directed = match mw.metric.direction() {
                Direction::HigherBetter => z,
                Direction::LowerBetter => -z,
            };
            mw.weight * directed
        })
        .sum()
}

/// Center power ratings and stretch the population spread to `target_sd`
/// points. Raw z-score composites have no point scale of their own and
/// must not be differenced into a margin without this step.
fn rescale_power(ratings: &mut [TeamRating], target_sd: f64) {
    if ratings.is_empty() {
        return;
    }
    let n = ratings.len() as f64;
    let mean = ratings.iter().map(|r| r.power).sum::<f64>() / n;
    let variance = ratings.iter().map(|r| (r.power - mean).powi(2)).sum::<f64>() / n;
    let sd = variance.sqrt();

    let scale = if sd > 1e-9 { target_sd / sd } else { 1.0 };
    for r in ratings.iter_mut() {
        r.power = (r.power - mean) * scale;
        r.offense = (r.offense - mean / 2.0) * scale;
        r.defense = (r.defense - mean / 2.0) * scale;
    }
}
