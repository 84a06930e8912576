use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::action::{Recommendation, select_action};
use crate::config::PricingConfig;
use crate::edge_odds::MatchOdds;
use crate::error::{ConfigError, OddsError};
use crate::match_prob::MatchProbabilities;
use crate::name_match::QuoteBook;
use crate::records::{LiveQuote, MatchUp, PlayerId, RowRejection, UpcomingMatch};

/// An upcoming match with its model probabilities and odds thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedMatch {
    pub game_id: u64,
    pub date: NaiveDate,
    pub best_of: u32,
    pub p1_id: PlayerId,
    pub p1_name: String,
    pub p1_strength: f64,
    pub p2_id: PlayerId,
    pub p2_name: String,
    pub p2_strength: f64,
    pub probabilities: MatchProbabilities,
    pub odds: MatchOdds,
}

/// A priced match joined with its live quote and the selected action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetSuggestion {
    pub game_id: u64,
    pub date: NaiveDate,
    pub p1_name: String,
    pub p2_name: String,
    pub action: &'static str,
    /// EV per unit stake for backs, per unit liability for lays.
    pub expected_value: Option<f64>,
    pub recommendation: Recommendation,
    pub odds: MatchOdds,
    pub quote: LiveQuote,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("invalid row: {0}")]
    InvalidRow(RowRejection),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Odds(#[from] OddsError),
    #[error("no live quote for this match")]
    NoQuote,
    #[error("live quote already joined to game {0}")]
    QuoteTaken(u64),
    #[error("no liquidity on at least one price")]
    NoLiquidity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skipped {
    pub game_id: u64,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: SkipReason,
}

fn serialize_reason<S: serde::Serializer>(reason: &SkipReason, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(reason)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PricingReport {
    pub priced: Vec<PricedMatch>,
    pub skipped: Vec<Skipped>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionReport {
    pub suggestions: Vec<BetSuggestion>,
    pub skipped: Vec<Skipped>,
    /// Indices into the quote slice that no priced match claimed.
    pub unmatched_quotes: Vec<usize>,
}

/// Prices every upcoming match. Rows are independent and keep their input order.
///
/// A bad configuration fails the whole batch. A bad row only skips that row.
pub fn price_matches(
    upcoming: &[UpcomingMatch],
    cfg: &PricingConfig,
) -> Result<PricingReport, ConfigError> {
    cfg.validate()?;

    let results: Vec<Result<PricedMatch, Skipped>> = upcoming
        .par_iter()
        .map(|row| {
            price_one(row, cfg).map_err(|reason| Skipped {
                game_id: row.game_id,
                reason,
            })
        })
        .collect();

    let mut report = PricingReport::default();
    for result in results {
        match result {
            Ok(priced) => report.priced.push(priced),
            Err(skipped) => report.skipped.push(skipped),
        }
    }

    if !report.skipped.is_empty() {
        warn!(
            skipped = report.skipped.len(),
            "upcoming matches left unpriced"
        );
    }
    info!(priced = report.priced.len(), "priced upcoming matches");
    Ok(report)
}

fn price_one(row: &UpcomingMatch, cfg: &PricingConfig) -> Result<PricedMatch, SkipReason> {
    let MatchUp {
        game_id,
        date,
        player_one,
        player_two,
        best_of,
    } = row.validate().map_err(SkipReason::InvalidRow)?;

    let probabilities = MatchProbabilities::compute(
        player_one.strength,
        player_two.strength,
        best_of,
        cfg.handicap,
    )?;
    let odds = MatchOdds::compute(&probabilities, cfg)?;

    Ok(PricedMatch {
        game_id,
        date,
        best_of,
        p1_id: player_one.player_id,
        p1_name: player_one.name,
        p1_strength: player_one.strength,
        p2_id: player_two.player_id,
        p2_name: player_two.name,
        p2_strength: player_two.strength,
        probabilities,
        odds,
    })
}

/// Joins priced matches to live quotes by runner names and selects one action each.
///
/// Matches without a quote, or with a sentinel on any price, produce no row.
pub fn suggest_bets(
    priced: &[PricedMatch],
    quotes: &[LiveQuote],
    cfg: &PricingConfig,
) -> Result<SuggestionReport, ConfigError> {
    cfg.validate()?;
    let book = QuoteBook::new(quotes);

    // Each quote goes to one match; earlier games claim first.
    let mut order: Vec<usize> = (0..priced.len()).collect();
    order.sort_by_key(|&i| (priced[i].date, i));
    let mut claimed_by: Vec<Option<u64>> = vec![None; book.len()];
    let mut found: Vec<Result<LiveQuote, SkipReason>> =
        vec![Err(SkipReason::NoQuote); priced.len()];
    for i in order {
        let m = &priced[i];
        let free = book.find_where(&m.p1_name, &m.p2_name, |q| claimed_by[q].is_none());
        if let Some((q, quote)) = free {
            claimed_by[q] = Some(m.game_id);
            found[i] = Ok(quote);
        } else if let Some((q, _)) = book.find(&m.p1_name, &m.p2_name)
            && let Some(owner) = claimed_by[q]
        {
            found[i] = Err(SkipReason::QuoteTaken(owner));
        }
    }
    let joined: Vec<(&PricedMatch, Result<LiveQuote, SkipReason>)> =
        priced.iter().zip(found).collect();

    let results: Vec<Result<BetSuggestion, Skipped>> = joined
        .into_par_iter()
        .map(|(m, found)| {
            let skip = |reason: SkipReason| Skipped {
                game_id: m.game_id,
                reason,
            };
            let quote = found.map_err(skip)?;
            suggest_one(m, quote, cfg).map_err(skip)
        })
        .collect();

    let mut report = SuggestionReport {
        unmatched_quotes: claimed_by
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| i)
            .collect(),
        ..SuggestionReport::default()
    };
    for result in results {
        match result {
            Ok(s) => report.suggestions.push(s),
            Err(skipped) => report.skipped.push(skipped),
        }
    }

    for i in &report.unmatched_quotes {
        if let Some(q) = book.get(*i) {
            warn!(p1 = %q.p1_name, p2 = %q.p2_name, "live quote matched no upcoming game");
        }
    }
    let no_liquidity = report
        .skipped
        .iter()
        .filter(|s| s.reason == SkipReason::NoLiquidity)
        .count();
    info!(
        suggestions = report.suggestions.len(),
        skipped = report.skipped.len(),
        no_liquidity,
        "selected actions"
    );
    Ok(report)
}

fn suggest_one(
    priced: &PricedMatch,
    quote: LiveQuote,
    cfg: &PricingConfig,
) -> Result<BetSuggestion, SkipReason> {
    quote.check_prices()?;
    if !quote.has_liquidity() {
        return Err(SkipReason::NoLiquidity);
    }
    let recommendation = select_action(&priced.odds, &quote, cfg.target_ev)?;
    Ok(BetSuggestion {
        game_id: priced.game_id,
        date: priced.date,
        p1_name: priced.p1_name.clone(),
        p2_name: priced.p2_name.clone(),
        action: recommendation.label(),
        expected_value: recommendation.expected_value(),
        recommendation,
        odds: priced.odds,
        quote,
    })
}

/// Prices `upcoming` and, when quotes are given, selects actions against them.
pub fn run(
    upcoming: &[UpcomingMatch],
    quotes: &[LiveQuote],
    cfg: &PricingConfig,
) -> Result<(PricingReport, SuggestionReport), ConfigError> {
    let pricing = price_matches(upcoming, cfg)?;
    let suggestions = suggest_bets(&pricing.priced, quotes, cfg)?;
    Ok((pricing, suggestions))
}
