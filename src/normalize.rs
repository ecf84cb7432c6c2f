use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::features::{Metric, TeamFeatureVector};

/// Population mean and standard deviation for one metric in one season.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    pub std_dev: f64,
}

pub const STD_DEV_EPSILON: f64 = 1e-9;

/// Mean/std-dev over every team with a usable value for the metric.
/// Null and non-finite values are excluded. A constant (or absent) metric
/// gets std_dev 1.0 so later division is always defined.
pub fn metric_stats(vectors: &[TeamFeatureVector], metric: Metric) -> MetricStats {
    let values: Vec<f64> = vectors
        .iter()
        .filter_map(|v| v.metric(metric))
        .filter(|v| v.is_finite())
        .collect();

    if values.is_empty() {
        return MetricStats {
            mean: 0.0,
            std_dev: 1.0,
        };
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    MetricStats {
        mean,
        std_dev: if std_dev < STD_DEV_EPSILON { 1.0 } else { std_dev },
    }
}

/// Z-score under the assume-average policy: a missing or non-finite value
/// scores exactly 0, so sparse teams are neither penalized nor rewarded.
pub fn z_score(value: Option<f64>, stats: MetricStats) -> f64 {
    match value {
        Some(v) if v.is_finite() => (v - stats.mean) / stats.std_dev,
        _ => 0.0,
    }
}

/// Per-metric normalization stats for one season's population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationTable {
    stats: HashMap<Metric, MetricStats>,
}

impl NormalizationTable {
    pub fn for_population(vectors: &[TeamFeatureVector]) -> Self {
        let stats = Metric::ALL
            .iter()
            .map(|m| (*m, metric_stats(vectors, *m)))
            .collect();
        Self { stats }
    }

    pub fn get(&self, metric: Metric) -> MetricStats {
        self.stats.get(&metric).copied().unwrap_or(MetricStats {
            mean: 0.0,
            std_dev: 1.0,
        })
    }

    pub fn z(&self, vector: &TeamFeatureVector, metric: Metric) -> f64 {
        z_score(vector.metric(metric), self.get(metric))
    }
}

/// Median of a value slice. Averages the middle pair for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values compare"));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}
