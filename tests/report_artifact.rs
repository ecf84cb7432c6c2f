use std::fs;

use cfb_power::mftr::MftrConfig;
use cfb_power::scenarios::WeightScenario;
use cfb_power::season::{load_report_json, run_season, save_report_json};
use cfb_power::store;
use cfb_power::synthetic::{self, SyntheticConfig};

#[test]
fn season_report_round_trips_through_json() {
    let season = synthetic::generate(SyntheticConfig::default());
    let conn = store::open_in_memory().unwrap();
    synthetic::write_to_store(&conn, &season).unwrap();

    let scenario = WeightScenario::by_version("v2_efficiency").unwrap();
    let report = run_season(&conn, 2024, &scenario, &MftrConfig::default()).unwrap();

    let dir = std::env::temp_dir().join("cfb_power_report_test");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("season_report.json");

    save_report_json(&report, &path).unwrap();
    let loaded = load_report_json(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(loaded.season, report.season);
    assert_eq!(loaded.model_version, "v2_efficiency");
    assert_eq!(loaded.ratings.len(), report.ratings.len());
    assert_eq!(loaded.calibration.passed, report.calibration.passed);
    assert_eq!(
        loaded.mftr.is_some(),
        report.mftr.is_some(),
        "solver outcome should survive serialization"
    );
    let a = loaded.ratings.iter().find(|r| r.team_id == 0).unwrap();
    let b = report.ratings.iter().find(|r| r.team_id == 0).unwrap();
    assert!((a.power - b.power).abs() < 1e-9);
    assert_eq!(a.hfa.is_some(), b.hfa.is_some());
}
