use anyhow::{Context, Result, anyhow};

use cue_edge::cli_args::{parse_db_path_arg, parse_path_arg};
use cue_edge::config;
use cue_edge::dataset::{self, ScheduledGame};
use cue_edge::records::{GameRecord, PlayerRecord};
use cue_edge::telemetry;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    let players_path = parse_path_arg("--players");
    let games_path = parse_path_arg("--games");
    let upcoming_path = parse_path_arg("--upcoming");
    if players_path.is_none() && games_path.is_none() && upcoming_path.is_none() {
        return Err(anyhow!(
            "nothing to import (pass --players, --games and/or --upcoming with JSON files)"
        ));
    }

    let db_path = parse_db_path_arg()
        .or_else(config::default_db_path)
        .context("unable to resolve sqlite path")?;
    let mut conn = dataset::open_db(&db_path)?;

    println!("DB: {}", db_path.display());
    if let Some(path) = players_path {
        let rows: Vec<PlayerRecord> = dataset::read_json_records(&path)?;
        let n = dataset::upsert_players(&mut conn, &rows)?;
        println!("Players upserted: {n}");
    }
    if let Some(path) = games_path {
        let rows: Vec<GameRecord> = dataset::read_json_records(&path)?;
        let invalid = rows.iter().filter(|g| g.validate().is_err()).count();
        let n = dataset::upsert_games(&mut conn, &rows)?;
        println!("Games upserted: {n} ({invalid} incomplete, kept but not fitted)");
    }
    if let Some(path) = upcoming_path {
        let rows: Vec<ScheduledGame> = dataset::read_json_records(&path)?;
        let n = dataset::upsert_upcoming(&mut conn, &rows)?;
        println!("Upcoming games upserted: {n}");
    }
    Ok(())
}
