use std::path::PathBuf;

use anyhow::{Context, Result};

use cfb_power::store;
use cfb_power::synthetic::{self, SyntheticConfig};

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Writes a synthetic season into the sqlite store. Handy for exercising
/// the rating pipeline without any provider data on hand.
fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let db_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(store::default_db_path)
        .context("no db path argument and no resolvable cache dir")?;

    let config = SyntheticConfig {
        season: env_parse("SYNTH_SEASON", 2024),
        teams: env_parse("SYNTH_TEAMS", 40),
        weeks: env_parse("SYNTH_WEEKS", 12),
        seed: env_parse("SYNTH_SEED", 7),
        ..SyntheticConfig::default()
    };

    let season = synthetic::generate(config);
    let conn = store::open_db(&db_path)?;
    synthetic::write_to_store(&conn, &season)?;

    println!("db: {}", db_path.display());
    println!("season: {}", season.config.season);
    println!("teams: {}", season.team_names.len());
    println!("games: {}", season.games.len());
    println!("quotes: {}", season.quotes.len());
    Ok(())
}
