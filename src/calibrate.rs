use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::linalg::{ols_line, polyfit};

/// Hard wiring gates. These test that joins, frames and HFA signs are
/// correct, not that a model is good; they are not tunable per model.
pub const MIN_SIGN_AGREEMENT: f64 = 0.70;
pub const MIN_PEARSON: f64 = 0.30;
pub const MIN_SPEARMAN: f64 = 0.30;

pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x < 1e-12 || var_y < 1e-12 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Spearman rank correlation: rank both series (ties get the average of
/// the ranks they span), then Pearson over the ranks.
pub fn spearman(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let rx = ranks(xs);
    let ry = ranks(ys);
    pearson(&rx, &ry)
}

/// Fraction of pairs where both series favor the same side.
pub fn sign_agreement(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.is_empty() {
        return None;
    }
    let agree = xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| x.signum() == y.signum())
        .count();
    Some(agree as f64 / xs.len() as f64)
}

fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).expect("finite values"));

    let mut out = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // 1-based ranks; tied values share the average rank of their span.
        let rank = (i + 1 + j + 1) as f64 / 2.0;
        for &idx in &order[i..=j] {
            out[idx] = rank;
        }
        i = j + 1;
    }
    out
}

/// One paired observation for gate checking: the model's predicted margin
/// and the market's consensus spread for the same game, both in the
/// home-minus-away frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub game_id: u64,
    pub week: u8,
    pub neutral_site: bool,
    pub book_count: usize,
    pub predicted: f64,
    pub market: f64,
    /// HFA points actually baked into `predicted`.
    pub hfa_applied: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceStat {
    pub label: String,
    pub n: usize,
    pub pearson: Option<f64>,
    pub sign_agreement: Option<f64>,
    pub mean_residual: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualBucket {
    pub lo: f64,
    pub hi: f64,
    pub n: usize,
    pub mean_residual: f64,
    pub mean_abs_residual: f64,
}

/// Most likely wiring defect behind a failed gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateFailureCause {
    JoinOrFrameMismatch,
    ScaleMisalignment,
    HfaSignError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub samples: usize,
    pub pearson: Option<f64>,
    pub spearman: Option<f64>,
    pub sign_agreement: Option<f64>,
    pub ols_slope: Option<f64>,
    pub ols_intercept: Option<f64>,
    /// Gate violations: neutral games carrying HFA, sited games without it.
    pub neutral_with_hfa: usize,
    pub sited_without_hfa: usize,
    pub passed: bool,
    pub failure_cause: Option<GateFailureCause>,
    pub by_week: Vec<SliceStat>,
    pub by_site: Vec<SliceStat>,
    pub by_book_depth: Vec<SliceStat>,
    pub residual_buckets: Vec<ResidualBucket>,
}

/// Evaluate the five acceptance gates plus per-slice diagnostics over a
/// set of paired predictions and market values.
pub fn calibration_report(samples: &[CalibrationSample]) -> CalibrationReport {
    let predicted: Vec<f64> = samples.iter().map(|s| s.predicted).collect();
    let market: Vec<f64> = samples.iter().map(|s| s.market).collect();

    let pearson_r = pearson(&predicted, &market);
    let spearman_r = spearman(&predicted, &market);
    let agreement = sign_agreement(&predicted, &market);
    let (ols_slope, ols_intercept) = match ols_line(&predicted, &market) {
        Some((slope, intercept)) => (Some(slope), Some(intercept)),
        None => (None, None),
    };

    let neutral_with_hfa = samples
        .iter()
        .filter(|s| s.neutral_site && s.hfa_applied != 0.0)
        .count();
    let sited_without_hfa = samples
        .iter()
        .filter(|s| !s.neutral_site && s.hfa_applied == 0.0)
        .count();

    let stats_pass = agreement.is_some_and(|v| v >= MIN_SIGN_AGREEMENT)
        && pearson_r.is_some_and(|v| v >= MIN_PEARSON)
        && spearman_r.is_some_and(|v| v >= MIN_SPEARMAN);
    let hfa_pass = neutral_with_hfa == 0 && sited_without_hfa == 0;
    let passed = !samples.is_empty() && stats_pass && hfa_pass;

    let failure_cause = if passed {
        None
    } else if !hfa_pass {
        Some(GateFailureCause::HfaSignError)
    } else if pearson_r.is_some_and(|v| v >= MIN_PEARSON)
        && ols_slope.is_some_and(|b| !(0.5..=1.5).contains(&b))
    {
        // Direction is fine but the point scale is off: ratings were
        // differenced without rescaling, or the frame is half-applied.
        Some(GateFailureCause::ScaleMisalignment)
    } else {
        Some(GateFailureCause::JoinOrFrameMismatch)
    };

    CalibrationReport {
        samples: samples.len(),
        pearson: pearson_r,
        spearman: spearman_r,
        sign_agreement: agreement,
        ols_slope,
        ols_intercept,
        neutral_with_hfa,
        sited_without_hfa,
        passed,
        failure_cause,
        by_week: slice_by(samples, |s| format!("week {:02}", s.week)),
        by_site: slice_by(samples, |s| {
            if s.neutral_site { "neutral" } else { "home" }.to_string()
        }),
        by_book_depth: slice_by(samples, |s| book_depth_bucket(s.book_count).to_string()),
        residual_buckets: residual_buckets(samples),
    }
}

/// Quadratic margin-calibration curve `market ~ predicted`, fit in closed
/// form. Coefficients lowest power first.
pub fn fit_margin_curve(samples: &[CalibrationSample]) -> Option<[f64; 3]> {
    let predicted: Vec<f64> = samples.iter().map(|s| s.predicted).collect();
    let market: Vec<f64> = samples.iter().map(|s| s.market).collect();
    let coeffs = polyfit(&predicted, &market, 2)?;
    Some([coeffs[0], coeffs[1], coeffs[2]])
}

fn slice_by<F>(samples: &[CalibrationSample], key: F) -> Vec<SliceStat>
where
    F: Fn(&CalibrationSample) -> String,
{
    let mut groups: BTreeMap<String, Vec<&CalibrationSample>> = BTreeMap::new();
    for s in samples {
        groups.entry(key(s)).or_default().push(s);
    }

    groups
        .into_iter()
        .map(|(label, group)| {
            let xs: Vec<f64> = group.iter().map(|s| s.predicted).collect();
            let ys: Vec<f64> = group.iter().map(|s| s.market).collect();
            let mean_residual = group
                .iter()
                .map(|s| s.market - s.predicted)
                .sum::<f64>()
                / group.len() as f64;
            SliceStat {
                label,
                n: group.len(),
                pearson: pearson(&xs, &ys),
                sign_agreement: sign_agreement(&xs, &ys),
                mean_residual,
            }
        })
        .collect()
}

fn book_depth_bucket(book_count: usize) -> &'static str {
    match book_count {
        0..=3 => "books 0-3",
        4..=6 => "books 4-6",
        _ => "books 7+",
    }
}

const RESIDUAL_BUCKET_EDGES: [f64; 5] = [0.0, 3.0, 7.0, 14.0, 21.0];

/// Residuals stratified by the magnitude of the predicted spread, to show
/// where along the scale the model drifts from the market.
fn residual_buckets(samples: &[CalibrationSample]) -> Vec<ResidualBucket> {
    let mut out = Vec::new();
    for (i, &lo) in RESIDUAL_BUCKET_EDGES.iter().enumerate() {
        let hi = RESIDUAL_BUCKET_EDGES
            .get(i + 1)
            .copied()
            .unwrap_or(f64::INFINITY);
        let group: Vec<&CalibrationSample> = samples
            .iter()
            .filter(|s| {
                let mag = s.predicted.abs();
                mag >= lo && mag < hi
            })
            .collect();
        if group.is_empty() {
            continue;
        }
        let n = group.len() as f64;
        out.push(ResidualBucket {
            lo,
            hi,
            n: group.len(),
            mean_residual: group.iter().map(|s| s.market - s.predicted).sum::<f64>() / n,
            mean_abs_residual: group
                .iter()
                .map(|s| (s.market - s.predicted).abs())
                .sum::<f64>()
                / n,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample(predicted: f64, market: f64) -> CalibrationSample {
        CalibrationSample {
            game_id: 0,
            week: 1,
            neutral_site: false,
            book_count: 5,
            predicted,
            market,
            hfa_applied: 2.5,
        }
    }

    #[test]
    fn pearson_and_sign_agreement_are_symmetric() {
        let xs = vec![1.0, -2.0, 3.5, 0.5, -4.0];
        let ys = vec![0.8, -1.0, 2.0, -0.2, -3.0];
        assert_eq!(pearson(&xs, &ys), pearson(&ys, &xs));
        assert_eq!(sign_agreement(&xs, &ys), sign_agreement(&ys, &xs));
        assert_eq!(spearman(&xs, &ys), spearman(&ys, &xs));
    }

    #[test]
    fn spearman_is_one_for_any_monotone_map() {
        let xs: Vec<f64> = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ys: Vec<f64> = xs.iter().map(|x| x.exp()).collect();
        assert!((spearman(&xs, &ys).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tied_values_share_average_ranks() {
        let r = ranks(&[2.0, 1.0, 2.0, 3.0]);
        assert_eq!(r, vec![2.5, 1.0, 2.5, 4.0]);
    }

    #[test]
    fn aligned_series_pass_the_gate() {
        let samples: Vec<CalibrationSample> = (-20..=20)
            .map(|i| {
                let p = f64::from(i) / 2.0;
                sample(p, p * 1.05 + 0.3)
            })
            .collect();
        let report = calibration_report(&samples);
        assert!(report.passed);
        assert!(report.failure_cause.is_none());
        assert!(report.pearson.unwrap() > 0.99);
    }

    #[test]
    fn independent_series_fail_near_coin_flip_agreement() {
        let mut rng = StdRng::seed_from_u64(42);
        let samples: Vec<CalibrationSample> = (0..2000)
            .map(|_| {
                sample(
                    rng.gen_range(-21.0..21.0),
                    rng.gen_range(-21.0..21.0),
                )
            })
            .collect();
        let report = calibration_report(&samples);
        assert!(!report.passed);
        let agreement = report.sign_agreement.unwrap();
        assert!((agreement - 0.5).abs() < 0.05);
        assert_eq!(
            report.failure_cause,
            Some(GateFailureCause::JoinOrFrameMismatch)
        );
    }

    #[test]
    fn neutral_hfa_violation_is_flagged_as_sign_error() {
        let mut samples: Vec<CalibrationSample> = (-10..=10)
            .map(|i| sample(f64::from(i), f64::from(i)))
            .collect();
        samples[0].neutral_site = true;
        // hfa_applied stays nonzero: the wiring bug under test.
        let report = calibration_report(&samples);
        assert!(!report.passed);
        assert_eq!(report.neutral_with_hfa, 1);
        assert_eq!(report.failure_cause, Some(GateFailureCause::HfaSignError));
    }

    #[test]
    fn scale_blowup_is_classified_as_scale_misalignment() {
        // Perfectly correlated but stretched and shifted far off the point
        // scale: direction survives, sign agreement does not.
        let samples: Vec<CalibrationSample> = (-20..=20)
            .map(|i| sample(4.0 * f64::from(i) + 60.0, f64::from(i)))
            .collect();
        let report = calibration_report(&samples);
        assert!(!report.passed);
        assert!(report.pearson.unwrap() > 0.99);
        assert!(report.sign_agreement.unwrap() < MIN_SIGN_AGREEMENT);
        assert_eq!(
            report.failure_cause,
            Some(GateFailureCause::ScaleMisalignment)
        );
    }

    #[test]
    fn slices_localize_degradation_by_week() {
        let mut samples: Vec<CalibrationSample> = (-10..=10)
            .map(|i| sample(f64::from(i), f64::from(i) + 0.2))
            .collect();
        // Week 2 gets scrambled markets.
        for (k, s) in samples.iter_mut().enumerate() {
            if k % 2 == 0 {
                s.week = 2;
                s.market = -s.predicted;
            }
        }
        let report = calibration_report(&samples);
        let w1 = report.by_week.iter().find(|s| s.label == "week 01").unwrap();
        let w2 = report.by_week.iter().find(|s| s.label == "week 02").unwrap();
        assert!(w1.pearson.unwrap() > 0.99);
        assert!(w2.pearson.unwrap() < -0.99);
    }

    #[test]
    fn margin_curve_fit_recovers_linear_truth() {
        let samples: Vec<CalibrationSample> = (-15..=15)
            .map(|i| sample(f64::from(i), 0.5 + 0.9 * f64::from(i)))
            .collect();
        let [c0, c1, c2] = fit_margin_curve(&samples).unwrap();
        assert!((c0 - 0.5).abs() < 1e-6);
        assert!((c1 - 0.9).abs() < 1e-6);
        assert!(c2.abs() < 1e-6);
    }
}
