use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::features::Metric;
use crate::store::app_cache_dir;

/// One weighted metric term inside a scenario.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricWeight {
    pub metric: Metric,
    pub weight: f64,
}

/// Explicit rating configuration: which metrics feed the offense and
/// defense composites, at what weight, and what point scale the final
/// power spread is stretched to. Always passed by value into the rating
/// computer; nothing reads scenario state ambiently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightScenario {
    pub model_version: String,
    pub offense: Vec<MetricWeight>,
    pub defense: Vec<MetricWeight>,
    /// When set, power ratings are mean-centered and rescaled so the
    /// population std-dev equals this many points. Required before ratings
    /// are differenced into a predicted margin.
    pub target_spread_sd: Option<f64>,
}

impl WeightScenario {
    pub fn by_version(version: &str) -> Option<WeightScenario> {
        BUILTIN_SCENARIOS
            .iter()
            .find(|s| s.model_version == version)
            .cloned()
    }
}

fn w(metric: Metric, weight: f64) -> MetricWeight {
    MetricWeight { metric, weight }
}

/// Built-in scenario table. Immutable; custom sets go through the cached
/// JSON file instead.
pub static BUILTIN_SCENARIOS: Lazy<Vec<WeightScenario>> = Lazy::new(|| {
    vec![
        WeightScenario {
            model_version: "v3_balanced".to_string(),
            offense: vec![
                w(Metric::OffYardsPerPlay, 0.35),
                w(Metric::OffSuccessRate, 0.30),
                w(Metric::OffExplosiveness, 0.15),
                w(Metric::Pace, 0.05),
                w(Metric::TalentComposite, 0.10),
                w(Metric::BlueChipPct, 0.05),
            ],
            defense: vec![
                w(Metric::DefYardsPerPlay, 0.35),
                w(Metric::DefSuccessRate, 0.30),
                w(Metric::DefExplosiveness, 0.15),
            ],
            target_spread_sd: Some(10.0),
        },
        WeightScenario {
            model_version: "v2_efficiency".to_string(),
            offense: vec![
                w(Metric::OffYardsPerPlay, 0.25),
                w(Metric::OffSuccessRate, 0.50),
                w(Metric::OffExplosiveness, 0.10),
            ],
            defense: vec![
                w(Metric::DefYardsPerPlay, 0.25),
                w(Metric::DefSuccessRate, 0.50),
                w(Metric::DefExplosiveness, 0.10),
            ],
            target_spread_sd: Some(10.0),
        },
        WeightScenario {
            model_version: "v1_talent_prior".to_string(),
            offense: vec![
                w(Metric::OffYardsPerPlay, 0.30),
                w(Metric::TalentComposite, 0.35),
                w(Metric::RecruitStarMix, 0.15),
            ],
            defense: vec![w(Metric::DefYardsPerPlay, 0.30)],
            target_spread_sd: Some(10.0),
        },
    ]
});

pub fn load_cached_scenarios() -> Vec<WeightScenario> {
    let Some(path) = scenarios_path() else {
        return Vec::new();
    };
    let Ok(raw) = fs::read_to_string(path) else {
        return Vec::new();
    };
    serde_json::from_str::<Vec<WeightScenario>>(&raw).unwrap_or_default()
}

pub fn save_cached_scenarios(scenarios: &[WeightScenario]) -> Result<()> {
    let Some(path) = scenarios_path() else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(scenarios).context("serialize weight scenarios")?;
    fs::write(&tmp, json).context("write weight scenarios")?;
    fs::rename(&tmp, &path).context("swap weight scenarios")?;
    Ok(())
}

fn scenarios_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join("weight_scenarios.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_versions_are_unique() {
        let mut versions: Vec<&str> = BUILTIN_SCENARIOS
            .iter()
            .map(|s| s.model_version.as_str())
            .collect();
        versions.sort_unstable();
        let before = versions.len();
        versions.dedup();
        assert_eq!(before, versions.len());
    }

    #[test]
    fn lookup_by_version() {
        assert!(WeightScenario::by_version("v3_balanced").is_some());
        assert!(WeightScenario::by_version("nope").is_none());
    }

    #[test]
    fn scenarios_round_trip_through_json() {
        let raw = serde_json::to_string(&*BUILTIN_SCENARIOS).unwrap();
        let back: Vec<WeightScenario> = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.len(), BUILTIN_SCENARIOS.len());
        assert_eq!(back[0].model_version, BUILTIN_SCENARIOS[0].model_version);
    }
}
