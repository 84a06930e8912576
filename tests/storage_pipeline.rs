use std::path::PathBuf;

use chrono::NaiveDate;

use cue_edge::config::{FitConfig, PricingConfig, TrainingFilter};
use cue_edge::dataset::{self, FitRun, ScheduledGame};
use cue_edge::error::ConfigError;
use cue_edge::pipeline::{self, SkipReason};
use cue_edge::records::{GameRecord, LiveQuote, PlayerRating, PlayerRecord, RowRejection};
use cue_edge::strength_model::{CancelToken, StopReason, fit_strengths};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn filter() -> TrainingFilter {
    TrainingFilter {
        last_played_since: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        games_since: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        min_games: 3,
    }
}

fn seeded_db() -> (tempfile::TempDir, rusqlite::Connection) {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut conn = dataset::open_db(&dir.path().join("snooker.sqlite")).expect("open db");

    let players: Vec<PlayerRecord> = dataset::read_json_records(&fixture("players.json")).unwrap();
    let games: Vec<GameRecord> = dataset::read_json_records(&fixture("games.json")).unwrap();
    let upcoming: Vec<ScheduledGame> =
        dataset::read_json_records(&fixture("upcoming.json")).unwrap();
    assert_eq!(dataset::upsert_players(&mut conn, &players).unwrap(), 5);
    assert_eq!(dataset::upsert_games(&mut conn, &games).unwrap(), 24);
    assert_eq!(dataset::upsert_upcoming(&mut conn, &upcoming).unwrap(), 3);
    (dir, conn)
}

#[test]
fn fit_save_price_and_select() {
    let (_dir, mut conn) = seeded_db();

    let data = dataset::load_training_data(&conn, &filter()).unwrap();
    assert_eq!(data.players, vec![1, 2, 3, 4]);
    assert_eq!(data.games.len(), 17);

    let cfg = FitConfig {
        iterations: 3_000,
        learning_rate: 0.01,
        ..FitConfig::default()
    };
    let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let started_at = "2024-01-01T00:00:00+00:00".to_string();
    let outcome =
        fit_strengths(&data.players, &data.games, &cfg, today, &CancelToken::new()).unwrap();
    assert_eq!(outcome.stop_reason, StopReason::IterationBudget);
    assert_eq!(outcome.matches_used, 16);
    assert_eq!(outcome.rows_dropped, 1);

    dataset::save_ratings(&mut conn, &outcome.ratings).unwrap();
    dataset::record_fit_run(&conn, &FitRun::from_outcome(started_at, &outcome)).unwrap();
    let run = dataset::latest_fit_run(&conn).unwrap().expect("fit run row");
    assert_eq!(run.iterations, 3_000);
    assert_eq!(run.stop_reason, "iteration_budget");
    assert_eq!(run.players, 4);

    let ratings = dataset::load_ratings(&conn).unwrap();
    let rating = |id: u32| ratings.iter().find(|r| r.player_id == id).unwrap().rating;
    assert!(rating(1) > rating(2));
    assert!(rating(1) > rating(4));

    let upcoming = dataset::load_upcoming_with_ratings(&conn).unwrap();
    let quotes: Vec<LiveQuote> = dataset::read_json_records(&fixture("quotes.json")).unwrap();
    let (pricing, report) = pipeline::run(&upcoming, &quotes, &PricingConfig::default()).unwrap();

    let priced: Vec<_> = pricing.priced.iter().map(|p| p.game_id).collect();
    assert_eq!(priced, vec![100, 101]);
    assert_eq!(pricing.priced[1].best_of, 1);
    assert_eq!(pricing.skipped.len(), 1);
    assert_eq!(pricing.skipped[0].game_id, 102);
    assert_eq!(
        pricing.skipped[0].reason,
        SkipReason::InvalidRow(RowRejection::MissingName)
    );
    for p in &pricing.priced {
        assert!((p.probabilities.p1_match + p.probabilities.p2_match - 1.0).abs() < 1e-15);
    }

    assert_eq!(report.suggestions.len(), 1);
    let s = &report.suggestions[0];
    assert_eq!(s.game_id, 100);
    assert_eq!(s.quote.p1_name, "Trump Judd");
    assert_eq!(s.quote.p1_best_back, 1.25);
    assert!(["BACK_P1", "LAY_P1", "BACK_P2", "LAY_P2", "NOTHING"].contains(&s.action));
    assert_eq!(s.expected_value.is_some(), s.action != "NOTHING");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::NoLiquidity);
    assert_eq!(report.unmatched_quotes, vec![2]);
}

#[test]
fn configuration_errors_abort_the_run() {
    let (_dir, conn) = seeded_db();
    let upcoming = dataset::load_upcoming_with_ratings(&conn).unwrap();
    let cfg = PricingConfig {
        handicap: 2,
        ..PricingConfig::default()
    };
    assert_eq!(
        pipeline::run(&upcoming, &[], &cfg).unwrap_err(),
        ConfigError::PositiveHandicap(2)
    );
}

#[test]
fn exports_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let (_db_dir, mut conn) = seeded_db();
    dataset::save_ratings(
        &mut conn,
        &[
            PlayerRating { player_id: 1, rating: 1.0 },
            PlayerRating { player_id: 2, rating: 0.4 },
            PlayerRating { player_id: 3, rating: 0.3 },
            PlayerRating { player_id: 4, rating: 0.0 },
        ],
    )
    .unwrap();
    let upcoming = dataset::load_upcoming_with_ratings(&conn).unwrap();
    let quotes: Vec<LiveQuote> = dataset::read_json_records(&fixture("quotes.json")).unwrap();
    let (pricing, report) = pipeline::run(&upcoming, &quotes, &PricingConfig::default()).unwrap();

    let xlsx = dir.path().join("suggestions.xlsx");
    let written = cue_edge::export::export_xlsx(&xlsx, &pricing, &report).unwrap();
    assert_eq!(written.priced, 2);
    assert!(xlsx.exists());

    let json = dir.path().join("suggestions.json");
    let written = cue_edge::export::export_json(&json, &pricing, &report).unwrap();
    assert_eq!(written.suggestions, 1);
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(doc["priced"].as_array().map(Vec::len), Some(2));
    assert_eq!(doc["skipped"].as_array().map(Vec::len), Some(2));
}
