use serde::Serialize;

use crate::config::PricingConfig;
use crate::error::OddsError;
use crate::match_prob::MatchProbabilities;
use crate::records::Side;

/// Decimal odds at which backing an outcome of probability `p` breaks even.
pub fn fair_odds(p: f64) -> f64 {
    1.0 / p
}

/// Lowest back price returning `target_ev` per unit stake after commission.
///
/// Solves `EV = p * (C*x - C + 1) - 1` for `x` with `C = 1 - commission`.
pub fn min_back_odds(p: f64, target_ev: f64, commission: f64) -> f64 {
    let net = 1.0 - commission;
    ((target_ev + 1.0) / p + (net - 1.0)) / net
}

/// Highest lay price returning `target_ev` when the lay wins with probability `p_lay`.
///
/// Solves `EV = C*p_lay - (1 - p_lay)*(L - 1)` for `L`.
pub fn max_lay_odds(p_lay: f64, target_ev: f64, commission: f64) -> f64 {
    let net = 1.0 - commission;
    (target_ev + p_lay * (1.0 - net) - 1.0) / (p_lay - 1.0)
}

/// Model odds thresholds for both runners of one match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchOdds {
    pub p1_fair_back: f64,
    pub p2_fair_back: f64,
    pub p1_fair_lay: f64,
    pub p2_fair_lay: f64,
    pub p1_back_min: f64,
    pub p2_back_min: f64,
    pub p1_lay_max: f64,
    pub p2_lay_max: f64,
}

impl MatchOdds {
    pub fn compute(probs: &MatchProbabilities, cfg: &PricingConfig) -> Result<Self, OddsError> {
        for side in [Side::P1, Side::P2] {
            let p = probs.match_win(side);
            if !p.is_finite() || p <= 0.0 || p >= 1.0 {
                return Err(OddsError::DegenerateProbability {
                    side,
                    probability: p,
                });
            }
        }

        let p1 = probs.p1_match;
        let p2 = probs.p2_match;
        let p1_fair_back = finite("P1 fair back odds", fair_odds(p1))?;
        let p2_fair_back = finite("P2 fair back odds", fair_odds(p2))?;

        Ok(Self {
            p1_fair_back,
            p2_fair_back,
            // laying one runner is backing the other in a two-way market
            p1_fair_lay: p2_fair_back,
            p2_fair_lay: p1_fair_back,
            p1_back_min: finite(
                "P1 minimum back odds",
                min_back_odds(p1, cfg.target_ev, cfg.commission),
            )?,
            p2_back_min: finite(
                "P2 minimum back odds",
                min_back_odds(p2, cfg.target_ev, cfg.commission),
            )?,
            // the P1 lay pays out when P2 wins
            p1_lay_max: finite(
                "P1 maximum lay odds",
                max_lay_odds(p2, cfg.target_ev, cfg.commission),
            )?,
            p2_lay_max: finite(
                "P2 maximum lay odds",
                max_lay_odds(p1, cfg.target_ev, cfg.commission),
            )?,
        })
    }

    pub fn fair_back(&self, side: Side) -> f64 {
        match side {
            Side::P1 => self.p1_fair_back,
            Side::P2 => self.p2_fair_back,
        }
    }

    pub fn back_min(&self, side: Side) -> f64 {
        match side {
            Side::P1 => self.p1_back_min,
            Side::P2 => self.p2_back_min,
        }
    }

    pub fn lay_max(&self, side: Side) -> f64 {
        match side {
            Side::P1 => self.p1_lay_max,
            Side::P2 => self.p2_lay_max,
        }
    }

    /// Win probability implied by the model's fair back odds.
    pub fn implied_probability(&self, side: Side) -> f64 {
        1.0 / self.fair_back(side)
    }
}

fn finite(what: &'static str, value: f64) -> Result<f64, OddsError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(OddsError::NonFiniteOdds { what, value })
    }
}
