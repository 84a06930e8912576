use std::fmt;

use serde::Serialize;

use crate::edge_odds::MatchOdds;
use crate::error::OddsError;
use crate::records::{LiveQuote, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    #[serde(rename = "BACK_P1")]
    BackP1,
    #[serde(rename = "LAY_P1")]
    LayP1,
    #[serde(rename = "BACK_P2")]
    BackP2,
    #[serde(rename = "LAY_P2")]
    LayP2,
}

impl Action {
    /// Evaluation order. Ties between qualifying actions go to the earlier entry.
    pub const ALL: [Action; 4] = [Action::BackP1, Action::LayP1, Action::BackP2, Action::LayP2];

    pub fn label(self) -> &'static str {
        match self {
            Action::BackP1 => "BACK_P1",
            Action::LayP1 => "LAY_P1",
            Action::BackP2 => "BACK_P2",
            Action::LayP2 => "LAY_P2",
        }
    }

    pub fn side(self) -> Side {
        match self {
            Action::BackP1 | Action::LayP1 => Side::P1,
            Action::BackP2 | Action::LayP2 => Side::P2,
        }
    }

    pub fn is_back(self) -> bool {
        matches!(self, Action::BackP1 | Action::BackP2)
    }

    /// Live price this action would be matched at.
    pub fn price(self, quote: &LiveQuote) -> f64 {
        if self.is_back() {
            quote.back(self.side())
        } else {
            quote.lay(self.side())
        }
    }

    /// Whether the live price clears `target_ev` given model probability `p` for this side.
    pub fn qualifies(self, p: f64, quote: &LiveQuote, target_ev: f64) -> bool {
        let price = self.price(quote);
        if self.is_back() {
            p > (target_ev + 1.0) / price
        } else {
            p < (1.0 - target_ev * (price - 1.0)) / price
        }
    }

    /// EV per unit stake (back) or unit liability (lay) at the live price.
    pub fn expected_value(self, p: f64, quote: &LiveQuote) -> f64 {
        let price = self.price(quote);
        if self.is_back() {
            p * (price - 1.0) - (1.0 - p)
        } else {
            (1.0 - p) / (price - 1.0) - p
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Recommendation {
    Nothing,
    Take { action: Action, expected_value: f64 },
}

impl Recommendation {
    pub fn label(&self) -> &'static str {
        match self {
            Recommendation::Nothing => "NOTHING",
            Recommendation::Take { action, .. } => action.label(),
        }
    }

    pub fn action(&self) -> Option<Action> {
        match self {
            Recommendation::Nothing => None,
            Recommendation::Take { action, .. } => Some(*action),
        }
    }

    pub fn expected_value(&self) -> Option<f64> {
        match self {
            Recommendation::Nothing => None,
            Recommendation::Take { expected_value, .. } => Some(*expected_value),
        }
    }
}

/// Picks at most one action for a match with full liquidity.
///
/// A lone qualifier is taken whatever its realised EV. Among several, the
/// highest realised EV wins, but only if it is strictly above zero.
pub fn select_action(
    odds: &MatchOdds,
    quote: &LiveQuote,
    target_ev: f64,
) -> Result<Recommendation, OddsError> {
    quote.check_prices()?;
    for side in [Side::P1, Side::P2] {
        let lay = quote.lay(side);
        if lay == 1.0 {
            return Err(OddsError::DegenerateLayPrice { side, price: lay });
        }
    }

    let qualified: Vec<(Action, f64)> = Action::ALL
        .iter()
        .map(|a| (*a, odds.implied_probability(a.side())))
        .filter(|(a, p)| a.qualifies(*p, quote, target_ev))
        .collect();

    match qualified.as_slice() {
        [] => Ok(Recommendation::Nothing),
        [(action, p)] => Ok(Recommendation::Take {
            action: *action,
            expected_value: checked_ev(*action, *p, quote)?,
        }),
        many => {
            let mut best = Recommendation::Nothing;
            let mut best_ev = 0.0;
            for (action, p) in many {
                let ev = checked_ev(*action, *p, quote)?;
                if ev > best_ev {
                    best_ev = ev;
                    best = Recommendation::Take {
                        action: *action,
                        expected_value: ev,
                    };
                }
            }
            Ok(best)
        }
    }
}

fn checked_ev(action: Action, p: f64, quote: &LiveQuote) -> Result<f64, OddsError> {
    let ev = action.expected_value(p, quote);
    if ev.is_finite() {
        Ok(ev)
    } else {
        Err(OddsError::NonFiniteOdds {
            what: "realised expected value",
            value: ev,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PricingConfig;
    use crate::match_prob::MatchProbabilities;

    fn quote(p1_back: f64, p1_lay: f64, p2_back: f64, p2_lay: f64) -> LiveQuote {
        LiveQuote {
            p1_name: "Player One".to_string(),
            p2_name: "Player Two".to_string(),
            p1_best_back: p1_back,
            p1_best_lay: p1_lay,
            p2_best_back: p2_back,
            p2_best_lay: p2_lay,
        }
    }

    fn odds(s1: f64, s2: f64, best_of: u32, cfg: &PricingConfig) -> MatchOdds {
        let probs = MatchProbabilities::compute(s1, s2, best_of, cfg.handicap).unwrap();
        MatchOdds::compute(&probs, cfg).unwrap()
    }

    #[test]
    fn fair_prices_leave_nothing() {
        let cfg = PricingConfig {
            target_ev: 0.0,
            commission: 0.0,
            handicap: 0,
        };
        let o = odds(0.3, 0.3, 1, &cfg);
        assert_eq!(o.p1_fair_back, 2.0);
        let rec = select_action(&o, &quote(2.0, 2.0, 2.0, 2.0), cfg.target_ev).unwrap();
        assert_eq!(rec, Recommendation::Nothing);
        assert_eq!(rec.label(), "NOTHING");
    }

    #[test]
    fn strong_favourite_is_backed() {
        let cfg = PricingConfig::default();
        let o = odds(1.0, 0.0, 5, &cfg);
        assert!(o.p1_back_min < 1.5);

        // only BACK_P1 clears the bar
        let rec = select_action(&o, &quote(1.5, 1.52, 2.9, 8.0), cfg.target_ev).unwrap();
        assert_eq!(rec.action(), Some(Action::BackP1));
        let p = o.implied_probability(Side::P1);
        let ev = rec.expected_value().unwrap();
        assert!((ev - (p * 0.5 - (1.0 - p))).abs() < 1e-12);
    }

    #[test]
    fn best_of_several_qualifiers_wins() {
        let cfg = PricingConfig::default();
        let o = odds(1.0, 0.0, 5, &cfg);
        let q = quote(1.5, 1.52, 2.9, 3.5);
        let p2 = o.implied_probability(Side::P2);
        assert!(Action::LayP2.qualifies(p2, &q, cfg.target_ev));
        let rec = select_action(&o, &q, cfg.target_ev).unwrap();
        assert_eq!(rec.label(), "BACK_P1");
    }

    #[test]
    fn lone_qualifier_is_taken_even_below_zero() {
        let cfg = PricingConfig {
            target_ev: -0.1,
            commission: 0.0,
            handicap: 0,
        };
        let o = odds(0.0, 0.0, 1, &cfg);
        let rec = select_action(&o, &quote(1.9, 4.0, 1.5, 3.0), cfg.target_ev).unwrap();
        assert_eq!(rec.action(), Some(Action::BackP1));
        assert!(rec.expected_value().unwrap() < 0.0);
    }

    #[test]
    fn several_qualifiers_below_zero_give_nothing() {
        let cfg = PricingConfig {
            target_ev: -0.1,
            commission: 0.0,
            handicap: 0,
        };
        let o = odds(0.0, 0.0, 1, &cfg);
        let rec = select_action(&o, &quote(1.9, 2.1, 1.5, 3.0), cfg.target_ev).unwrap();
        assert_eq!(rec, Recommendation::Nothing);
    }

    #[test]
    fn lay_at_evens_is_degenerate() {
        let cfg = PricingConfig::default();
        let o = odds(0.2, 0.1, 3, &cfg);
        let err = select_action(&o, &quote(1.8, 1.0, 2.2, 2.3), cfg.target_ev).unwrap_err();
        assert!(matches!(
            err,
            OddsError::DegenerateLayPrice { side: Side::P1, .. }
        ));
    }

    #[test]
    fn enumeration_order_is_fixed() {
        let labels: Vec<_> = Action::ALL.iter().map(|a| a.label()).collect();
        assert_eq!(labels, ["BACK_P1", "LAY_P1", "BACK_P2", "LAY_P2"]);
    }

    #[test]
    fn lone_lay_reports_ev_per_unit_liability() {
        let cfg = PricingConfig::default();
        let o = odds(0.0, 1.0, 5, &cfg);
        let live = quote(5.0, 1.6, 1.1, 1.2);
        let rec = select_action(&o, &live, cfg.target_ev).unwrap();

        let p = o.implied_probability(Side::P1);
        let expected = (1.0 - p) / (1.6 - 1.0) - p;
        assert_eq!(rec.action(), Some(Action::LayP1));
        assert!((rec.expected_value().unwrap() - expected).abs() < 1e-12);
        assert!((expected - 1.3344).abs() < 1e-3);
    }
}
