use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use cue_edge::cli_args::{has_flag, parse_arg, parse_date_arg, parse_db_path_arg, parse_f64_arg};
use cue_edge::config::{self, FitConfig, Likelihood, TrainingFilter};
use cue_edge::dataset::{self, FitRun};
use cue_edge::strength_model::{CancelToken, fit_strengths};
use cue_edge::telemetry;

const TOP_N: usize = 20;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    let db_path = parse_db_path_arg()
        .or_else(config::default_db_path)
        .context("unable to resolve sqlite path")?;

    let mut fit_cfg = FitConfig::from_env();
    if let Some(v) = parse_arg::<usize>("--iterations") {
        fit_cfg.iterations = v;
    }
    if let Some(v) = parse_f64_arg("--learning-rate") {
        fit_cfg.learning_rate = v;
    }
    if let Some(v) = parse_f64_arg("--tolerance") {
        fit_cfg.tolerance = Some(v).filter(|t| *t > 0.0);
    }
    if let Some(raw) = parse_arg::<String>("--likelihood") {
        fit_cfg.likelihood = Likelihood::parse(&raw)
            .with_context(|| format!("unknown likelihood {raw:?} (negbin|binomial)"))?;
    }
    fit_cfg.validate().context("invalid fit configuration")?;

    let mut filter = TrainingFilter::from_env();
    if let Some(d) = parse_date_arg("--last-played-since") {
        filter.last_played_since = d;
    }
    if let Some(d) = parse_date_arg("--games-since") {
        filter.games_since = d;
    }
    if let Some(n) = parse_arg::<usize>("--min-games") {
        filter.min_games = n;
    }
    let today = parse_date_arg("--today").unwrap_or_else(|| Utc::now().date_naive());
    let dry_run = has_flag("--dry-run");

    let cancel = CancelToken::new();
    if let Some(secs) = parse_f64_arg("--max-seconds").filter(|s| *s > 0.0) {
        let token = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs_f64(secs));
            token.cancel();
        });
    }

    let mut conn = dataset::open_db(&db_path)?;
    let data = dataset::load_training_data(&conn, &filter)?;
    let started_at = Utc::now().to_rfc3339();
    let outcome = fit_strengths(&data.players, &data.games, &fit_cfg, today, &cancel)?;

    println!("Fit complete");
    println!("DB: {}", db_path.display());
    println!(
        "Players: {}  games used: {}  rows dropped: {}",
        outcome.ratings.len(),
        outcome.matches_used,
        outcome.rows_dropped
    );
    println!(
        "Iterations: {}/{} ({})",
        outcome.iterations_run,
        fit_cfg.iterations,
        outcome.stop_reason.as_str()
    );
    println!("Final loss: {:.6}", outcome.final_loss);
    println!("Final norm: {:.6}", outcome.final_norm);

    let tail: Vec<_> = outcome.trace.samples().collect();
    for s in tail.iter().skip(tail.len().saturating_sub(5)) {
        println!(
            "  iter {:>8}  loss {:.6}  norm {:.6}",
            s.iteration, s.loss, s.norm
        );
    }

    let names: HashMap<u32, String> = dataset::load_players(&conn)?
        .into_iter()
        .map(|p| (p.player_id, p.full_name()))
        .collect();
    let mut ranked = outcome.ratings.clone();
    ranked.sort_by(|a, b| b.rating.total_cmp(&a.rating));
    println!();
    println!("Top {TOP_N}:");
    for (rank, r) in ranked.iter().take(TOP_N).enumerate() {
        println!(
            "{:>3}. {:<28} {:>8.4}",
            rank + 1,
            names.get(&r.player_id).map(String::as_str).unwrap_or("?"),
            r.rating
        );
    }

    if dry_run {
        println!();
        println!("Dry run: ratings not saved");
        return Ok(());
    }

    let saved = dataset::save_ratings(&mut conn, &outcome.ratings)?;
    let run_id = dataset::record_fit_run(&conn, &FitRun::from_outcome(started_at, &outcome))?;
    println!();
    println!("Saved {saved} ratings (fit run {run_id})");
    Ok(())
}
