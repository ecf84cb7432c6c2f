use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::consensus::SpreadQuote;
use crate::features::{
    GameStatRow, PriorRatingRow, SeasonStatRow, TalentRow, TeamFeatureInputs,
};
use crate::games::{Division, Game};

const CACHE_DIR: &str = "cfb_power";

/// Cache base for the sqlite file and JSON artifacts, XDG-style.
pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join("cfb_power.sqlite"))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS teams (
            team_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            division TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS games (
            game_id INTEGER PRIMARY KEY,
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            home_points INTEGER NULL,
            away_points INTEGER NULL,
            neutral_site INTEGER NOT NULL,
            postseason INTEGER NOT NULL,
            completed INTEGER NOT NULL,
            home_division TEXT NOT NULL,
            away_division TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_season ON games(season);
        CREATE INDEX IF NOT EXISTS idx_games_season_week ON games(season, week);

        CREATE TABLE IF NOT EXISTS spread_quotes (
            game_id INTEGER NOT NULL,
            book TEXT NOT NULL,
            home_spread REAL NOT NULL,
            fetched_at TEXT NOT NULL,
            PRIMARY KEY (game_id, book, fetched_at)
        );

        CREATE TABLE IF NOT EXISTS team_game_stats (
            team_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            off_yards_per_play REAL NULL,
            def_yards_per_play REAL NULL,
            off_success_rate REAL NULL,
            def_success_rate REAL NULL,
            off_explosiveness REAL NULL,
            def_explosiveness REAL NULL,
            pace REAL NULL,
            PRIMARY KEY (team_id, season, week)
        );

        CREATE TABLE IF NOT EXISTS team_season_stats (
            team_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            games INTEGER NOT NULL,
            off_yards_per_play REAL NULL,
            def_yards_per_play REAL NULL,
            off_success_rate REAL NULL,
            def_success_rate REAL NULL,
            off_explosiveness REAL NULL,
            def_explosiveness REAL NULL,
            pace REAL NULL,
            PRIMARY KEY (team_id, season)
        );

        CREATE TABLE IF NOT EXISTS prior_ratings (
            team_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            offense REAL NOT NULL,
            defense REAL NOT NULL,
            power REAL NOT NULL,
            PRIMARY KEY (team_id, season)
        );

        CREATE TABLE IF NOT EXISTS team_talent (
            team_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            talent_composite REAL NULL,
            blue_chip_pct REAL NULL,
            recruit_star_mix REAL NULL,
            games_played INTEGER NULL,
            PRIMARY KEY (team_id, season)
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_team(conn: &Connection, team_id: u32, name: &str, division: Division) -> Result<()> {
    conn.execute(
        "INSERT INTO teams(team_id, name, division) VALUES (?1, ?2, ?3)
         ON CONFLICT(team_id) DO UPDATE SET name = excluded.name, division = excluded.division",
        params![i64::from(team_id), name, division.as_str()],
    )
    .context("upsert team")?;
    Ok(())
}

pub fn upsert_game(conn: &Connection, game: &Game) -> Result<()> {
    conn.execute(
        "INSERT INTO games(
            game_id, season, week, home_team_id, away_team_id,
            home_points, away_points, neutral_site, postseason, completed,
            home_division, away_division, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(game_id) DO UPDATE SET
            home_points = excluded.home_points,
            away_points = excluded.away_points,
            neutral_site = excluded.neutral_site,
            postseason = excluded.postseason,
            completed = excluded.completed,
            updated_at = excluded.updated_at",
        params![
            game.id as i64,
            i64::from(game.season),
            i64::from(game.week),
            i64::from(game.home_id),
            i64::from(game.away_id),
            game.home_points,
            game.away_points,
            game.neutral_site,
            game.postseason,
            game.completed,
            game.home_division.as_str(),
            game.away_division.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert game")?;
    Ok(())
}

pub fn insert_spread_quote(conn: &Connection, quote: &SpreadQuote) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO spread_quotes(game_id, book, home_spread, fetched_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            quote.game_id as i64,
            quote.book,
            quote.home_spread,
            quote.fetched_at
        ],
    )
    .context("insert spread quote")?;
    Ok(())
}

pub fn upsert_game_stats(conn: &Connection, row: &GameStatRow) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO team_game_stats(
            team_id, season, week,
            off_yards_per_play, def_yards_per_play,
            off_success_rate, def_success_rate,
            off_explosiveness, def_explosiveness, pace
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            i64::from(row.team_id),
            i64::from(row.season),
            i64::from(row.week),
            row.off_yards_per_play,
            row.def_yards_per_play,
            row.off_success_rate,
            row.def_success_rate,
            row.off_explosiveness,
            row.def_explosiveness,
            row.pace,
        ],
    )
    .context("upsert team game stats")?;
    Ok(())
}

pub fn upsert_season_stats(conn: &Connection, row: &SeasonStatRow) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO team_season_stats(
            team_id, season, games,
            off_yards_per_play, def_yards_per_play,
            off_success_rate, def_success_rate,
            off_explosiveness, def_explosiveness, pace
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            i64::from(row.team_id),
            i64::from(row.season),
            i64::from(row.games),
            row.off_yards_per_play,
            row.def_yards_per_play,
            row.off_success_rate,
            row.def_success_rate,
            row.off_explosiveness,
            row.def_explosiveness,
            row.pace,
        ],
    )
    .context("upsert team season stats")?;
    Ok(())
}

pub fn upsert_prior_rating(conn: &Connection, row: &PriorRatingRow) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO prior_ratings(team_id, season, offense, defense, power)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            i64::from(row.team_id),
            i64::from(row.season),
            row.offense,
            row.defense,
            row.power,
        ],
    )
    .context("upsert prior rating")?;
    Ok(())
}

pub fn upsert_talent(conn: &Connection, row: &TalentRow) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO team_talent(
            team_id, season, talent_composite, blue_chip_pct, recruit_star_mix, games_played
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            i64::from(row.team_id),
            i64::from(row.season),
            row.talent_composite,
            row.blue_chip_pct,
            row.recruit_star_mix,
            row.games_played,
        ],
    )
    .context("upsert team talent")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct TeamRow {
    pub team_id: u32,
    pub name: String,
    pub division: Division,
}

pub fn load_teams(conn: &Connection) -> Result<HashMap<u32, TeamRow>> {
    let mut stmt = conn
        .prepare("SELECT team_id, name, division FROM teams")
        .context("prepare teams query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TeamRow {
                team_id: row.get::<_, u32>(0)?,
                name: row.get(1)?,
                division: Division::parse(&row.get::<_, String>(2)?),
            })
        })
        .context("query teams")?;
    let mut out = HashMap::new();
    for team in rows {
        let team = team.context("read team row")?;
        out.insert(team.team_id, team);
    }
    Ok(out)
}

pub fn load_team_ids(conn: &Connection, season: u16) -> Result<Vec<u32>> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT team_id FROM (
                SELECT home_team_id AS team_id FROM games WHERE season = ?1
                UNION
                SELECT away_team_id AS team_id FROM games WHERE season = ?1
             ) ORDER BY team_id",
        )
        .context("prepare team ids query")?;
    let rows = stmt
        .query_map(params![i64::from(season)], |row| row.get::<_, u32>(0))
        .context("query team ids")?;
    let mut out = Vec::new();
    for id in rows {
        out.push(id.context("read team id row")?);
    }
    Ok(out)
}

pub fn load_games(conn: &Connection, season: u16) -> Result<Vec<Game>> {
    let mut stmt = conn
        .prepare(
            "SELECT game_id, season, week, home_team_id, away_team_id,
                    home_points, away_points, neutral_site, postseason, completed,
                    home_division, away_division
             FROM games WHERE season = ?1
             ORDER BY week ASC, game_id ASC",
        )
        .context("prepare load games query")?;
    let rows = stmt
        .query_map(params![i64::from(season)], |row| {
            Ok(Game {
                id: row.get::<_, i64>(0)? as u64,
                season: row.get::<_, u16>(1)?,
                week: row.get::<_, u8>(2)?,
                home_id: row.get::<_, u32>(3)?,
                away_id: row.get::<_, u32>(4)?,
                home_points: row.get(5)?,
                away_points: row.get(6)?,
                neutral_site: row.get::<_, i64>(7)? != 0,
                postseason: row.get::<_, i64>(8)? != 0,
                completed: row.get::<_, i64>(9)? != 0,
                home_division: Division::parse(&row.get::<_, String>(10)?),
                away_division: Division::parse(&row.get::<_, String>(11)?),
            })
        })
        .context("query games")?;
    let mut out = Vec::new();
    for game in rows {
        out.push(game.context("read game row")?);
    }
    Ok(out)
}

pub fn load_spread_quotes(conn: &Connection, season: u16) -> Result<Vec<SpreadQuote>> {
    let mut stmt = conn
        .prepare(
            "SELECT q.game_id, q.book, q.home_spread, q.fetched_at
             FROM spread_quotes q
             JOIN games g ON g.game_id = q.game_id
             WHERE g.season = ?1
             ORDER BY q.game_id ASC, q.book ASC, q.fetched_at ASC",
        )
        .context("prepare load quotes query")?;
    let rows = stmt
        .query_map(params![i64::from(season)], |row| {
            Ok(SpreadQuote {
                game_id: row.get::<_, i64>(0)? as u64,
                book: row.get(1)?,
                home_spread: row.get(2)?,
                fetched_at: row.get(3)?,
            })
        })
        .context("query spread quotes")?;
    let mut out = Vec::new();
    for quote in rows {
        out.push(quote.context("read spread quote row")?);
    }
    Ok(out)
}

/// All feature-tier inputs for one season, grouped per team. One bulk scan
/// per table; the per-team resolution itself stays in the feature loader.
pub fn season_feature_inputs(
    conn: &Connection,
    season: u16,
) -> Result<HashMap<u32, TeamFeatureInputs>> {
    let mut inputs: HashMap<u32, TeamFeatureInputs> = HashMap::new();

    let mut stmt = conn
        .prepare(
            "SELECT team_id, season, week,
                    off_yards_per_play, def_yards_per_play,
                    off_success_rate, def_success_rate,
                    off_explosiveness, def_explosiveness, pace
             FROM team_game_stats WHERE season = ?1",
        )
        .context("prepare game stats query")?;
    let rows = stmt
        .query_map(params![i64::from(season)], |row| {
            Ok(GameStatRow {
                team_id: row.get::<_, u32>(0)?,
                season: row.get::<_, u16>(1)?,
                week: row.get::<_, u8>(2)?,
                off_yards_per_play: row.get(3)?,
                def_yards_per_play: row.get(4)?,
                off_success_rate: row.get(5)?,
                def_success_rate: row.get(6)?,
                off_explosiveness: row.get(7)?,
                def_explosiveness: row.get(8)?,
                pace: row.get(9)?,
            })
        })
        .context("query game stats")?;
    for row in rows {
        let row = row.context("read game stat row")?;
        inputs.entry(row.team_id).or_default().game_rows.push(row);
    }

    let mut stmt = conn
        .prepare(
            "SELECT team_id, season, games,
                    off_yards_per_play, def_yards_per_play,
                    off_success_rate, def_success_rate,
                    off_explosiveness, def_explosiveness, pace
             FROM team_season_stats WHERE season = ?1",
        )
        .context("prepare season stats query")?;
    let rows = stmt
        .query_map(params![i64::from(season)], |row| {
            Ok(SeasonStatRow {
                team_id: row.get::<_, u32>(0)?,
                season: row.get::<_, u16>(1)?,
                games: row.get::<_, u32>(2)?,
                off_yards_per_play: row.get(3)?,
                def_yards_per_play: row.get(4)?,
                off_success_rate: row.get(5)?,
                def_success_rate: row.get(6)?,
                off_explosiveness: row.get(7)?,
                def_explosiveness: row.get(8)?,
                pace: row.get(9)?,
            })
        })
        .context("query season stats")?;
    for row in rows {
        let row = row.context("read season stat row")?;
        let team_id = row.team_id;
        inputs.entry(team_id).or_default().season_row = Some(row);
    }

    let mut stmt = conn
        .prepare(
            "SELECT team_id, season, offense, defense, power
             FROM prior_ratings WHERE season = ?1",
        )
        .context("prepare prior ratings query")?;
    let rows = stmt
        .query_map(params![i64::from(season)], |row| {
            Ok(PriorRatingRow {
                team_id: row.get::<_, u32>(0)?,
                season: row.get::<_, u16>(1)?,
                offense: row.get(2)?,
                defense: row.get(3)?,
                power: row.get(4)?,
            })
        })
        .context("query prior ratings")?;
    for row in rows {
        let row = row.context("read prior rating row")?;
        let team_id = row.team_id;
        inputs.entry(team_id).or_default().prior = Some(row);
    }

    let mut stmt = conn
        .prepare(
            "SELECT team_id, season, talent_composite, blue_chip_pct, recruit_star_mix, games_played
             FROM team_talent WHERE season = ?1",
        )
        .context("prepare talent query")?;
    let rows = stmt
        .query_map(params![i64::from(season)], |row| {
            Ok(TalentRow {
                team_id: row.get::<_, u32>(0)?,
                season: row.get::<_, u16>(1)?,
                talent_composite: row.get(2)?,
                blue_chip_pct: row.get(3)?,
                recruit_star_mix: row.get(4)?,
                games_played: row.get(5)?,
            })
        })
        .context("query team talent")?;
    for row in rows {
        let row = row.context("read talent row")?;
        let team_id = row.team_id;
        inputs.entry(team_id).or_default().talent = Some(row);
    }

    Ok(inputs)
}
