use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::Serialize;

use crate::pipeline::{BetSuggestion, PricedMatch, PricingReport, Skipped, SuggestionReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportReport {
    pub priced: usize,
    pub suggestions: usize,
    pub skipped: usize,
}

pub const PRICED_HEADER: [&str; 17] = [
    "game_id",
    "date",
    "best_of",
    "p1",
    "p2",
    "p1_strength",
    "p2_strength",
    "p1_win_prob",
    "p2_win_prob",
    "p1_fair_back",
    "p1_fair_lay",
    "p2_fair_back",
    "p2_fair_lay",
    "p1_back_min",
    "p1_lay_max",
    "p2_back_min",
    "p2_lay_max",
];

pub const SUGGESTION_HEADER: [&str; 15] = [
    "date",
    "p1",
    "p2",
    "action",
    "ev",
    "p1_best_back",
    "p1_best_lay",
    "p2_best_back",
    "p2_best_lay",
    "p1_back_min",
    "p1_lay_max",
    "p2_back_min",
    "p2_lay_max",
    "p1_fair_back",
    "p2_fair_back",
];

pub fn priced_row(m: &PricedMatch) -> Vec<String> {
    vec![
        m.game_id.to_string(),
        m.date.to_string(),
        m.best_of.to_string(),
        m.p1_name.clone(),
        m.p2_name.clone(),
        fmt_f64(m.p1_strength),
        fmt_f64(m.p2_strength),
        fmt_f64(m.probabilities.p1_match),
        fmt_f64(m.probabilities.p2_match),
        fmt_f64(m.odds.p1_fair_back),
        fmt_f64(m.odds.p1_fair_lay),
        fmt_f64(m.odds.p2_fair_back),
        fmt_f64(m.odds.p2_fair_lay),
        fmt_f64(m.odds.p1_back_min),
        fmt_f64(m.odds.p1_lay_max),
        fmt_f64(m.odds.p2_back_min),
        fmt_f64(m.odds.p2_lay_max),
    ]
}

pub fn suggestion_row(s: &BetSuggestion) -> Vec<String> {
    vec![
        s.date.to_string(),
        s.p1_name.clone(),
        s.p2_name.clone(),
        s.action.to_string(),
        s.expected_value.map(fmt_f64).unwrap_or_default(),
        fmt_f64(s.quote.p1_best_back),
        fmt_f64(s.quote.p1_best_lay),
        fmt_f64(s.quote.p2_best_back),
        fmt_f64(s.quote.p2_best_lay),
        fmt_f64(s.odds.p1_back_min),
        fmt_f64(s.odds.p1_lay_max),
        fmt_f64(s.odds.p2_back_min),
        fmt_f64(s.odds.p2_lay_max),
        fmt_f64(s.odds.p1_fair_back),
        fmt_f64(s.odds.p2_fair_back),
    ]
}

fn skipped_row(stage: &str, s: &Skipped) -> Vec<String> {
    vec![stage.to_string(), s.game_id.to_string(), s.reason.to_string()]
}

fn with_header(header: &[&str], rows: impl Iterator<Item = Vec<String>>) -> Vec<Vec<String>> {
    let mut out = vec![header.iter().map(|h| h.to_string()).collect()];
    out.extend(rows);
    out
}

pub fn export_xlsx(
    path: &Path,
    pricing: &PricingReport,
    suggestions: &SuggestionReport,
) -> Result<ExportReport> {
    let priced_rows = with_header(&PRICED_HEADER, pricing.priced.iter().map(priced_row));
    let suggestion_rows = with_header(
        &SUGGESTION_HEADER,
        suggestions.suggestions.iter().map(suggestion_row),
    );
    let skipped_rows = with_header(
        &["stage", "game_id", "reason"],
        pricing
            .skipped
            .iter()
            .map(|s| skipped_row("pricing", s))
            .chain(suggestions.skipped.iter().map(|s| skipped_row("selection", s))),
    );

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Suggestions")?;
        write_rows(sheet, &suggestion_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Priced")?;
        write_rows(sheet, &priced_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Skipped")?;
        write_rows(sheet, &skipped_rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        priced: priced_rows.len().saturating_sub(1),
        suggestions: suggestion_rows.len().saturating_sub(1),
        skipped: skipped_rows.len().saturating_sub(1),
    })
}

#[derive(Serialize)]
struct JsonExport<'a> {
    priced: &'a [PricedMatch],
    suggestions: &'a [BetSuggestion],
    skipped: Vec<&'a Skipped>,
}

pub fn export_json(
    path: &Path,
    pricing: &PricingReport,
    suggestions: &SuggestionReport,
) -> Result<ExportReport> {
    let doc = JsonExport {
        priced: &pricing.priced,
        suggestions: &suggestions.suggestions,
        skipped: pricing.skipped.iter().chain(&suggestions.skipped).collect(),
    };
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &doc)
        .with_context(|| format!("failed writing json to {}", path.display()))?;
    Ok(ExportReport {
        priced: doc.priced.len(),
        suggestions: doc.suggestions.len(),
        skipped: doc.skipped.len(),
    })
}

fn fmt_f64(value: f64) -> String {
    format!("{value:.4}")
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
