use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{TrainingFilter, parse_date};
use crate::records::{GameRecord, PlayerId, PlayerRating, PlayerRecord, UpcomingMatch};
use crate::strength_model::FitOutcome;

/// A fixture as the scraper lists it, before ratings are joined in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledGame {
    pub game_id: u64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub player_one_id: Option<PlayerId>,
    #[serde(default)]
    pub player_two_id: Option<PlayerId>,
    #[serde(default)]
    pub best_of: Option<i64>,
}

/// Players and games selected for one fit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingData {
    pub players: Vec<PlayerId>,
    pub games: Vec<GameRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitRun {
    pub started_at: String,
    pub finished_at: String,
    pub iterations: usize,
    pub final_loss: f64,
    pub final_norm: f64,
    pub stop_reason: String,
    pub players: usize,
    pub games: usize,
    pub rows_dropped: usize,
}

impl FitRun {
    pub fn from_outcome(started_at: String, outcome: &FitOutcome) -> Self {
        Self {
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            iterations: outcome.iterations_run,
            final_loss: outcome.final_loss,
            final_norm: outcome.final_norm,
            stop_reason: outcome.stop_reason.as_str().to_string(),
            players: outcome.ratings.len(),
            games: outcome.matches_used,
            rows_dropped: outcome.rows_dropped,
        }
    }
}

/// Reads a JSON array of records, as written by the scrapers.
pub fn read_json_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse json records from {}", path.display()))
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
        CREATE TABLE IF NOT EXISTS players (
            player_id INTEGER PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS games (
            game_id INTEGER PRIMARY KEY,
            date TEXT NULL,
            player_one_id INTEGER NULL,
            player_two_id INTEGER NULL,
            player_one_frames INTEGER NULL,
            player_two_frames INTEGER NULL,
            best_of INTEGER NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_date ON games(date);
        CREATE TABLE IF NOT EXISTS upcoming_games (
            game_id INTEGER PRIMARY KEY,
            date TEXT NULL,
            player_one_id INTEGER NULL,
            player_two_id INTEGER NULL,
            best_of INTEGER NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS ratings (
            player_id INTEGER PRIMARY KEY,
            rating REAL NOT NULL,
            fitted_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS fit_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            iterations INTEGER NOT NULL,
            final_loss REAL NOT NULL,
            final_norm REAL NOT NULL,
            stop_reason TEXT NOT NULL,
            players INTEGER NOT NULL,
            games INTEGER NOT NULL,
            rows_dropped INTEGER NOT NULL
        );
        "#,
    )
    .context("init sqlite schema")?;
    Ok(())
}

pub fn upsert_players(conn: &mut Connection, players: &[PlayerRecord]) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction().context("begin players transaction")?;
    for p in players {
        tx.execute(
            r#"
            INSERT INTO players (player_id, first_name, last_name, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(player_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                updated_at = excluded.updated_at
            "#,
            params![p.player_id as i64, p.first_name, p.last_name, now],
        )
        .with_context(|| format!("upsert player {}", p.player_id))?;
    }
    tx.commit().context("commit players transaction")?;
    Ok(players.len())
}

pub fn upsert_games(conn: &mut Connection, games: &[GameRecord]) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction().context("begin games transaction")?;
    for g in games {
        tx.execute(
            r#"
            INSERT INTO games (
                game_id, date, player_one_id, player_two_id,
                player_one_frames, player_two_frames, best_of, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(game_id) DO UPDATE SET
                date = excluded.date,
                player_one_id = excluded.player_one_id,
                player_two_id = excluded.player_two_id,
                player_one_frames = excluded.player_one_frames,
                player_two_frames = excluded.player_two_frames,
                best_of = excluded.best_of,
                updated_at = excluded.updated_at
            "#,
            params![
                g.game_id as i64,
                g.date.map(|d| d.to_string()),
                g.player_one_id.map(i64::from),
                g.player_two_id.map(i64::from),
                g.player_one_frames,
                g.player_two_frames,
                g.best_of,
                now
            ],
        )
        .with_context(|| format!("upsert game {}", g.game_id))?;
    }
    tx.commit().context("commit games transaction")?;
    Ok(games.len())
}

pub fn upsert_upcoming(conn: &mut Connection, games: &[ScheduledGame]) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction().context("begin upcoming transaction")?;
    for g in games {
        tx.execute(
            r#"
            INSERT INTO upcoming_games (
                game_id, date, player_one_id, player_two_id, best_of, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(game_id) DO UPDATE SET
                date = excluded.date,
                player_one_id = excluded.player_one_id,
                player_two_id = excluded.player_two_id,
                best_of = excluded.best_of,
                updated_at = excluded.updated_at
            "#,
            params![
                g.game_id as i64,
                g.date.map(|d| d.to_string()),
                g.player_one_id.map(i64::from),
                g.player_two_id.map(i64::from),
                g.best_of,
                now
            ],
        )
        .with_context(|| format!("upsert upcoming game {}", g.game_id))?;
    }
    tx.commit().context("commit upcoming transaction")?;
    Ok(games.len())
}

pub fn load_players(conn: &Connection) -> Result<Vec<PlayerRecord>> {
    let mut stmt = conn
        .prepare("SELECT player_id, first_name, last_name FROM players ORDER BY player_id ASC")
        .context("prepare load players query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PlayerRecord {
                player_id: row.get::<_, u32>(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
            })
        })
        .context("query load players")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode player row")?);
    }
    Ok(out)
}

pub fn load_games(conn: &Connection) -> Result<Vec<GameRecord>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                game_id, date, player_one_id, player_two_id,
                player_one_frames, player_two_frames, best_of
            FROM games
            ORDER BY date ASC, game_id ASC
            "#,
        )
        .context("prepare load games query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(GameRecord {
                game_id: row.get::<_, u64>(0)?,
                date: row
                    .get::<_, Option<String>>(1)?
                    .as_deref()
                    .and_then(parse_date),
                player_one_id: row.get::<_, Option<u32>>(2)?,
                player_two_id: row.get::<_, Option<u32>>(3)?,
                player_one_frames: row.get(4)?,
                player_two_frames: row.get(5)?,
                best_of: row.get(6)?,
            })
        })
        .context("query load games")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode game row")?);
    }
    Ok(out)
}

/// Players recently active with enough recent games, and the games among them.
///
/// Counts are taken over the date-filtered games, then games are filtered
/// again so both players survive the minimum.
pub fn select_training_data(
    known: &[PlayerId],
    games: &[GameRecord],
    filter: &TrainingFilter,
) -> TrainingData {
    let known: HashSet<PlayerId> = known.iter().copied().collect();

    let mut last_played: HashMap<PlayerId, NaiveDate> = HashMap::new();
    for g in games {
        let Some(date) = g.date else { continue };
        for id in [g.player_one_id, g.player_two_id].into_iter().flatten() {
            let entry = last_played.entry(id).or_insert(date);
            if date > *entry {
                *entry = date;
            }
        }
    }
    let active: HashSet<PlayerId> = last_played
        .into_iter()
        .filter(|(id, last)| known.contains(id) && *last >= filter.last_played_since)
        .map(|(id, _)| id)
        .collect();

    let in_window = |g: &&GameRecord, players: &HashSet<PlayerId>| {
        let (Some(date), Some(p1), Some(p2)) = (g.date, g.player_one_id, g.player_two_id) else {
            return false;
        };
        date >= filter.games_since && players.contains(&p1) && players.contains(&p2)
    };

    let mut counts: HashMap<PlayerId, usize> = HashMap::new();
    for g in games.iter().filter(|g| in_window(g, &active)) {
        for id in [g.player_one_id, g.player_two_id].into_iter().flatten() {
            *counts.entry(id).or_default() += 1;
        }
    }
    let kept: HashSet<PlayerId> = counts
        .into_iter()
        .filter(|(_, n)| *n >= filter.min_games)
        .map(|(id, _)| id)
        .collect();

    let selected: Vec<GameRecord> = games
        .iter()
        .filter(|g| in_window(g, &kept))
        .cloned()
        .collect();
    let mut players: Vec<PlayerId> = kept.into_iter().collect();
    players.sort_unstable();

    debug!(
        active = active.len(),
        players = players.len(),
        games = selected.len(),
        "selected training data"
    );
    TrainingData {
        players,
        games: selected,
    }
}

pub fn load_training_data(conn: &Connection, filter: &TrainingFilter) -> Result<TrainingData> {
    let known: Vec<PlayerId> = load_players(conn)?.iter().map(|p| p.player_id).collect();
    let games = load_games(conn)?;
    let data = select_training_data(&known, &games, filter);
    info!(
        players = data.players.len(),
        games = data.games.len(),
        stored_games = games.len(),
        "loaded training data"
    );
    Ok(data)
}

/// Replaces the whole rating table in one transaction.
pub fn save_ratings(conn: &mut Connection, ratings: &[PlayerRating]) -> Result<usize> {
    let fitted_at = Utc::now().to_rfc3339();
    let tx = conn.transaction().context("begin ratings transaction")?;
    tx.execute("DELETE FROM ratings", [])
        .context("clear ratings")?;
    for r in ratings {
        tx.execute(
            "INSERT INTO ratings (player_id, rating, fitted_at) VALUES (?1, ?2, ?3)",
            params![r.player_id as i64, r.rating, fitted_at],
        )
        .with_context(|| format!("insert rating for player {}", r.player_id))?;
    }
    tx.commit().context("commit ratings transaction")?;
    Ok(ratings.len())
}

pub fn load_ratings(conn: &Connection) -> Result<Vec<PlayerRating>> {
    let mut stmt = conn
        .prepare("SELECT player_id, rating FROM ratings ORDER BY player_id ASC")
        .context("prepare load ratings query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PlayerRating {
                player_id: row.get::<_, u32>(0)?,
                rating: row.get(1)?,
            })
        })
        .context("query load ratings")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode rating row")?);
    }
    Ok(out)
}

pub fn record_fit_run(conn: &Connection, run: &FitRun) -> Result<i64> {
    conn.execute(
        "INSERT INTO fit_runs(started_at, finished_at, iterations, final_loss, final_norm, stop_reason, players, games, rows_dropped)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            run.started_at,
            run.finished_at,
            run.iterations as i64,
            run.final_loss,
            run.final_norm,
            run.stop_reason,
            run.players as i64,
            run.games as i64,
            run.rows_dropped as i64
        ],
    )
    .context("insert fit run")?;
    Ok(conn.last_insert_rowid())
}

pub fn latest_fit_run(conn: &Connection) -> Result<Option<FitRun>> {
    conn.query_row(
        r#"
        SELECT started_at, finished_at, iterations, final_loss, final_norm,
               stop_reason, players, games, rows_dropped
        FROM fit_runs
        ORDER BY run_id DESC
        LIMIT 1
        "#,
        [],
        |row| {
            Ok(FitRun {
                started_at: row.get(0)?,
                finished_at: row.get(1)?,
                iterations: row.get::<_, i64>(2)?.max(0) as usize,
                final_loss: row.get(3)?,
                final_norm: row.get(4)?,
                stop_reason: row.get(5)?,
                players: row.get::<_, i64>(6)?.max(0) as usize,
                games: row.get::<_, i64>(7)?.max(0) as usize,
                rows_dropped: row.get::<_, i64>(8)?.max(0) as usize,
            })
        },
    )
    .optional()
    .context("query latest fit run")
}

/// Upcoming games with names and the latest ratings. Missing joins come back as `None`.
pub fn load_upcoming_with_ratings(conn: &Connection) -> Result<Vec<UpcomingMatch>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                u.game_id, u.date, u.best_of,
                u.player_one_id, p1.first_name, p1.last_name, r1.rating,
                u.player_two_id, p2.first_name, p2.last_name, r2.rating
            FROM upcoming_games u
            LEFT JOIN players p1 ON p1.player_id = u.player_one_id
            LEFT JOIN ratings r1 ON r1.player_id = u.player_one_id
            LEFT JOIN players p2 ON p2.player_id = u.player_two_id
            LEFT JOIN ratings r2 ON r2.player_id = u.player_two_id
            ORDER BY u.date ASC, u.game_id ASC
            "#,
        )
        .context("prepare load upcoming query")?;
    let rows = stmt
        .query_map([], |row| {
            let name = |first: Option<String>, last: Option<String>| match (first, last) {
                (None, None) => None,
                (first, last) => Some(
                    PlayerRecord {
                        player_id: 0,
                        first_name: first.unwrap_or_default(),
                        last_name: last.unwrap_or_default(),
                    }
                    .full_name(),
                ),
            };
            Ok(UpcomingMatch {
                game_id: row.get::<_, u64>(0)?,
                date: row
                    .get::<_, Option<String>>(1)?
                    .as_deref()
                    .and_then(parse_date),
                best_of: row
                    .get::<_, Option<i64>>(2)?
                    .map(|b| b.clamp(0, i64::from(u32::MAX)) as u32),
                player_one_id: row.get::<_, Option<u32>>(3)?,
                player_one_name: name(row.get(4)?, row.get(5)?),
                player_one_rating: row.get(6)?,
                player_two_id: row.get::<_, Option<u32>>(7)?,
                player_two_name: name(row.get(8)?, row.get(9)?),
                player_two_rating: row.get(10)?,
            })
        })
        .context("query load upcoming")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode upcoming row")?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn game(id: u64, p1: PlayerId, p2: PlayerId, date: NaiveDate) -> GameRecord {
        GameRecord {
            game_id: id,
            date: Some(date),
            player_one_id: Some(p1),
            player_two_id: Some(p2),
            player_one_frames: Some(4),
            player_two_frames: Some(2),
            best_of: Some(7),
        }
    }

    #[test]
    fn training_filter_drops_stale_and_thin_players() {
        let filter = TrainingFilter {
            last_played_since: day(2020, 1, 1),
            games_since: day(2015, 1, 1),
            min_games: 3,
        };
        let mut games = Vec::new();
        // 1, 2 and 3 play a lot, 4 only twice, 5 retired before the cutoff
        for i in 0..4 {
            games.push(game(i, 1, 2, day(2021, 1, 1 + i as u32)));
            games.push(game(10 + i, 2, 3, day(2021, 2, 1 + i as u32)));
            games.push(game(20 + i, 3, 1, day(2021, 3, 1 + i as u32)));
        }
        games.push(game(30, 4, 1, day(2021, 4, 1)));
        games.push(game(31, 4, 2, day(2021, 4, 2)));
        for i in 0..5 {
            games.push(game(40 + i, 5, 1, day(2016, 1, 1 + i as u32)));
        }
        // too old for the game window
        games.push(game(50, 1, 2, day(2010, 1, 1)));

        let data = select_training_data(&[1, 2, 3, 4, 5], &games, &filter);
        assert_eq!(data.players, vec![1, 2, 3]);
        assert_eq!(data.games.len(), 12);
        assert!(data.games.iter().all(|g| g.game_id < 30));
    }

    #[test]
    fn unknown_players_are_not_selected() {
        let filter = TrainingFilter {
            min_games: 1,
            ..TrainingFilter::default()
        };
        let games = vec![game(1, 1, 2, day(2022, 1, 1)), game(2, 1, 9, day(2022, 1, 2))];
        let data = select_training_data(&[1, 2], &games, &filter);
        assert_eq!(data.players, vec![1, 2]);
        assert_eq!(data.games.len(), 1);
    }

    #[test]
    fn ratings_are_replaced_and_joined_to_fixtures() {
        let mut conn = open_in_memory().unwrap();
        upsert_players(
            &mut conn,
            &[
                PlayerRecord {
                    player_id: 1,
                    first_name: "Judd".to_string(),
                    last_name: "Trump".to_string(),
                },
                PlayerRecord {
                    player_id: 2,
                    first_name: "Mark".to_string(),
                    last_name: "Selby".to_string(),
                },
            ],
        )
        .unwrap();
        save_ratings(
            &mut conn,
            &[
                PlayerRating { player_id: 1, rating: 0.1 },
                PlayerRating { player_id: 3, rating: 0.2 },
            ],
        )
        .unwrap();
        save_ratings(
            &mut conn,
            &[
                PlayerRating { player_id: 1, rating: 1.25 },
                PlayerRating { player_id: 2, rating: 0.75 },
            ],
        )
        .unwrap();
        let ratings = load_ratings(&conn).unwrap();
        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[0].rating, 1.25);

        upsert_upcoming(
            &mut conn,
            &[
                ScheduledGame {
                    game_id: 7,
                    date: Some(day(2024, 5, 1)),
                    player_one_id: Some(1),
                    player_two_id: Some(2),
                    best_of: None,
                },
                ScheduledGame {
                    game_id: 8,
                    date: Some(day(2024, 5, 2)),
                    player_one_id: Some(2),
                    player_two_id: Some(5),
                    best_of: Some(9),
                },
            ],
        )
        .unwrap();
        let upcoming = load_upcoming_with_ratings(&conn).unwrap();
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].player_one_name.as_deref(), Some("Judd Trump"));
        assert_eq!(upcoming[0].player_two_rating, Some(0.75));
        assert_eq!(upcoming[0].best_of, None);
        assert_eq!(upcoming[1].player_two_name, None);
        assert_eq!(upcoming[1].player_two_rating, None);
        assert_eq!(upcoming[1].best_of, Some(9));
    }

    #[test]
    fn games_round_trip_with_missing_fields() {
        let mut conn = open_in_memory().unwrap();
        let mut partial = game(2, 1, 2, day(2023, 1, 1));
        partial.date = None;
        partial.best_of = None;
        upsert_games(&mut conn, &[game(1, 1, 2, day(2023, 1, 2)), partial.clone()]).unwrap();
        let loaded = load_games(&conn).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains(&partial));
        assert!(latest_fit_run(&conn).unwrap().is_none());
    }
}
