use std::path::Path;

use anyhow::{Context, Result};

use cue_edge::cli_args::{has_flag, parse_arg, parse_db_path_arg, parse_f64_arg, parse_path_arg};
use cue_edge::config::{self, PricingConfig};
use cue_edge::dataset;
use cue_edge::export::{self, PRICED_HEADER, SUGGESTION_HEADER};
use cue_edge::pipeline::{self, PricingReport, SuggestionReport};
use cue_edge::records::LiveQuote;
use cue_edge::telemetry;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    if has_flag("--help") || has_flag("-h") {
        print_usage();
        return Ok(());
    }

    let db_path = parse_db_path_arg()
        .or_else(config::default_db_path)
        .context("unable to resolve sqlite path")?;

    let mut cfg = PricingConfig::from_env();
    if let Some(v) = parse_f64_arg("--ev") {
        cfg.target_ev = v;
    }
    if let Some(v) = parse_f64_arg("--commission") {
        cfg.commission = v;
    }
    if let Some(v) = parse_arg::<i32>("--handicap") {
        cfg.handicap = v;
    }
    cfg.validate().context("invalid pricing configuration")?;

    let conn = dataset::open_db(&db_path)?;
    let upcoming = dataset::load_upcoming_with_ratings(&conn)?;
    let quotes: Vec<LiveQuote> = match parse_path_arg("--quotes") {
        Some(path) => dataset::read_json_records(&path)?,
        None => Vec::new(),
    };

    let (pricing, suggestions) = pipeline::run(&upcoming, &quotes, &cfg)?;

    println!("DB: {}", db_path.display());
    println!(
        "target EV {:.2}%  commission {:.2}%  handicap {}",
        cfg.target_ev * 100.0,
        cfg.commission * 100.0,
        cfg.handicap
    );
    print_report(&pricing, &suggestions, !quotes.is_empty());

    if let Some(path) = parse_path_arg("--xlsx") {
        write_export(&path, &pricing, &suggestions, export::export_xlsx)?;
    }
    if let Some(path) = parse_path_arg("--json") {
        write_export(&path, &pricing, &suggestions, export::export_json)?;
    }
    Ok(())
}

fn print_report(pricing: &PricingReport, suggestions: &SuggestionReport, with_quotes: bool) {
    println!();
    println!("Priced matches: {}", pricing.priced.len());
    let rows: Vec<Vec<String>> = pricing.priced.iter().map(export::priced_row).collect();
    print_table(&PRICED_HEADER, &rows);

    if with_quotes {
        println!();
        println!("Suggestions: {}", suggestions.suggestions.len());
        let rows: Vec<Vec<String>> = suggestions
            .suggestions
            .iter()
            .map(export::suggestion_row)
            .collect();
        print_table(&SUGGESTION_HEADER, &rows);
        if !suggestions.unmatched_quotes.is_empty() {
            println!("Unmatched quotes: {}", suggestions.unmatched_quotes.len());
        }
    }

    let skipped = pricing.skipped.iter().chain(&suggestions.skipped);
    for (i, s) in skipped.enumerate() {
        if i == 0 {
            println!();
            println!("Skipped:");
        }
        println!("  game {}: {}", s.game_id, s.reason);
    }
}

fn print_table(header: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }
    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{c:<width$}", width = *w))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{}", line(header.to_vec()));
    for row in rows {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
}

fn write_export(
    path: &Path,
    pricing: &PricingReport,
    suggestions: &SuggestionReport,
    writer: fn(&Path, &PricingReport, &SuggestionReport) -> Result<export::ExportReport>,
) -> Result<()> {
    let report = writer(path, pricing, suggestions)?;
    println!(
        "Wrote {} ({} priced, {} suggestions, {} skipped)",
        path.display(),
        report.priced,
        report.suggestions,
        report.skipped
    );
    Ok(())
}

fn print_usage() {
    println!("cue_edge: price upcoming matches and suggest exchange bets");
    println!();
    println!("  --db <path>          sqlite database (default: CUE_EDGE_DB or cache dir)");
    println!("  --quotes <file>      JSON array of live quotes");
    println!("  --ev <fraction>      target EV per unit stake (EDGE_TARGET_EV)");
    println!("  --commission <frac>  exchange commission (EDGE_COMMISSION)");
    println!("  --handicap <n>       frame handicap for player one, <= 0 (EDGE_HANDICAP)");
    println!("  --xlsx <file>        write priced matches and suggestions to a workbook");
    println!("  --json <file>        write the same as JSON");
}
