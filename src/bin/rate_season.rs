use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};

use cfb_power::mftr::MftrConfig;
use cfb_power::scenarios::WeightScenario;
use cfb_power::season::{self, SeasonReport};
use cfb_power::store;

/// Runs the rating pipeline for one season and prints ratings, the HFA
/// table, the market-fitted fit and the calibration verdict. Exits
/// nonzero when the calibration gate fails, so it can sit in front of a
/// promotion step.
fn main() -> ExitCode {
    match run() {
        Ok(report) if report.calibration.passed => ExitCode::SUCCESS,
        Ok(_) => {
            eprintln!("calibration gate FAILED; ratings must not be promoted");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<SeasonReport> {
    dotenvy::dotenv().ok();

    let db_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(store::default_db_path)
        .context("no db path argument and no resolvable cache dir")?;
    let season: u16 = std::env::var("RATE_SEASON")
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(2024);
    let version =
        std::env::var("MODEL_VERSION").unwrap_or_else(|_| "v3_balanced".to_string());
    let scenario = WeightScenario::by_version(&version)
        .ok_or_else(|| anyhow!("unknown model version {version}"))?;

    let conn = store::open_db(&db_path)?;
    let report = season::run_season(&conn, season, &scenario, &MftrConfig::default())?;
    let teams = store::load_teams(&conn).unwrap_or_default();
    print_report(&report, &teams);

    if let Ok(out) = std::env::var("REPORT_OUT") {
        let path = PathBuf::from(out.trim());
        season::save_report_json(&report, &path)?;
        println!("report written to {}", path.display());
    }
    Ok(report)
}

fn print_report(report: &SeasonReport, teams: &std::collections::HashMap<u32, store::TeamRow>) {
    println!(
        "season {} model {} ({} teams rated)",
        report.season,
        report.model_version,
        report.ratings.len()
    );

    let mut ranked = report.ratings.clone();
    ranked.sort_by(|a, b| b.power.partial_cmp(&a.power).expect("finite powers"));
    println!("-- top 25 --");
    for (i, r) in ranked.iter().take(25).enumerate() {
        let name = teams
            .get(&r.team_id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| format!("team {}", r.team_id));
        println!(
            "{:>2}. {name:<20}  power {:+6.2}  off {:+6.2}  def {:+6.2}  [{:?} conf {:.2}]",
            i + 1,
            r.power,
            r.offense,
            r.defense,
            r.data_source,
            r.confidence
        );
    }

    println!(
        "-- hfa -- league median {:+.2} ({} teams)",
        report.league_hfa.league_median,
        report.league_hfa.teams.len()
    );
    let flagged = report
        .league_hfa
        .teams
        .iter()
        .filter(|t| t.outlier || t.low_sample)
        .count();
    println!("flagged (outlier or low sample): {flagged}");

    match (&report.mftr, &report.mftr_error) {
        (Some(m), _) => println!(
            "-- mftr -- hfa {:+.2}  rmse {:.2}  r2 {:.3}  pearson {:.3}  slope {:.2} over {} games",
            m.hfa_constant,
            m.fit.rmse,
            m.fit.r_squared,
            m.fit.pearson_r,
            m.fit.ols_slope,
            m.fit.games
        ),
        (None, Some(err)) => println!("-- mftr -- rejected: {err}"),
        (None, None) => println!("-- mftr -- not attempted"),
    }

    let c = &report.calibration;
    println!(
        "-- calibration -- n {}  pearson {:.3}  spearman {:.3}  sign {:.3}",
        c.samples,
        c.pearson.unwrap_or(f64::NAN),
        c.spearman.unwrap_or(f64::NAN),
        c.sign_agreement.unwrap_or(f64::NAN)
    );
    println!(
        "hfa wiring: neutral-with-hfa {}  sited-without-hfa {}",
        c.neutral_with_hfa, c.sited_without_hfa
    );
    match (c.passed, c.failure_cause) {
        (true, _) => println!("gate: PASS"),
        (false, Some(cause)) => println!("gate: FAIL ({cause:?})"),
        (false, None) => println!("gate: FAIL"),
    }
}
