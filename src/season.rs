use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::calibrate::{self, CalibrationReport, CalibrationSample};
use crate::consensus;
use crate::features;
use crate::hfa::{self, LeagueHfa};
use crate::mftr::{self, MftrConfig, MftrSolution};
use crate::normalize::NormalizationTable;
use crate::ratings::{self, TeamRating};
use crate::scenarios::WeightScenario;
use crate::store;

/// Everything one rating run produces: the ratings themselves, the HFA
/// diagnostic bundle, the market-fitted cross-check and the calibration
/// gate verdict that decides whether any of it may be trusted downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonReport {
    pub season: u16,
    pub model_version: String,
    pub generated_at: String,
    pub ratings: Vec<TeamRating>,
    pub league_hfa: LeagueHfa,
    pub mftr: Option<MftrSolution>,
    /// Set when the MFTR window was rejected instead of solved.
    pub mftr_error: Option<String>,
    pub calibration: CalibrationReport,
}

/// Run the full pipeline for one season against the store:
/// features -> normalization -> ratings -> HFA -> MFTR -> calibration.
pub fn run_season(
    conn: &Connection,
    season: u16,
    scenario: &WeightScenario,
    mftr_cfg: &MftrConfig,
) -> Result<SeasonReport> {
    let team_ids = store::load_team_ids(conn, season).context("load season team ids")?;
    let inputs = store::season_feature_inputs(conn, season).context("load feature inputs")?;

    let vectors = features::resolve_season_features(season, &team_ids, |team_id| {
        Ok(inputs.get(&team_id).cloned().unwrap_or_default())
    });

    let table = NormalizationTable::for_population(&vectors);
    let mut team_ratings = ratings::compute_ratings(&vectors, scenario, &table);

    let powers: HashMap<u32, f64> = team_ratings
        .iter()
        .map(|r| (r.team_id, r.power))
        .collect();

    let games = store::load_games(conn, season).context("load season games")?;
    let league_hfa = hfa::estimate_league_hfa(season, &games, &powers);
    for rating in team_ratings.iter_mut() {
        rating.hfa = league_hfa.for_team(rating.team_id).cloned();
    }

    let quotes = store::load_spread_quotes(conn, season).context("load spread quotes")?;
    let lines = consensus::consensus_lines(&quotes);

    let (mftr_solution, mftr_error) = match mftr::build_mftr(season, &games, &lines, mftr_cfg) {
        Ok(solution) => (Some(solution), None),
        Err(err) => {
            log::warn!("market-fitted solve rejected for season {season}: {err}");
            (None, Some(err.to_string()))
        }
    };

    let samples: Vec<CalibrationSample> = games
        .iter()
        .filter(|g| g.is_scored())
        .filter_map(|g| {
            let line = lines.get(&g.id)?;
            let hfa_applied = league_hfa.game_hfa(g);
            let home = powers.get(&g.home_id).copied().unwrap_or(0.0);
            let away = powers.get(&g.away_id).copied().unwrap_or(0.0);
            Some(CalibrationSample {
                game_id: g.id,
                week: g.week,
                neutral_site: g.neutral_site,
                book_count: line.book_count,
                predicted: home - away + hfa_applied,
                market: line.value,
                hfa_applied,
            })
        })
        .collect();
    let calibration = calibrate::calibration_report(&samples);

    Ok(SeasonReport {
        season,
        model_version: scenario.model_version.clone(),
        generated_at: Utc::now().to_rfc3339(),
        ratings: team_ratings,
        league_hfa,
        mftr: mftr_solution,
        mftr_error,
        calibration,
    })
}

pub fn save_report_json(report: &SeasonReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(report).context("serialize season report")?;
    fs::write(&tmp, json).context("write season report")?;
    fs::rename(&tmp, path).context("swap season report")?;
    Ok(())
}

pub fn load_report_json(path: &Path) -> Result<SeasonReport> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read season report {}", path.display()))?;
    serde_json::from_str(&raw).context("parse season report")
}
