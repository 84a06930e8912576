use cue_edge::action::{Action, Recommendation, select_action};
use cue_edge::config::PricingConfig;
use cue_edge::edge_odds::{MatchOdds, fair_odds, min_back_odds};
use cue_edge::match_prob::{MatchProbabilities, match_win_probability, sigmoid};
use cue_edge::records::{LiveQuote, Side};

fn quote(p1_back: f64, p1_lay: f64, p2_back: f64, p2_lay: f64) -> LiveQuote {
    LiveQuote {
        p1_name: "Judd Trump".to_string(),
        p2_name: "Mark Selby".to_string(),
        p1_best_back: p1_back,
        p1_best_lay: p1_lay,
        p2_best_back: p2_back,
        p2_best_lay: p2_lay,
    }
}

#[test]
fn orientations_are_complements_across_races() {
    let strengths = [-1.7, -0.3, 0.0, 0.5, 0.51, 1.2, 2.9];
    for best_of in [1, 3, 5, 7, 9, 11, 17, 19, 25, 35] {
        for a in strengths {
            for b in strengths {
                let ab = match_win_probability(a, b, best_of, 0).unwrap();
                let ba = match_win_probability(b, a, best_of, 0).unwrap();
                assert!(
                    (ab + ba - 1.0).abs() < 1e-12,
                    "best_of={best_of} a={a} b={b}"
                );
            }
        }
    }
}

#[test]
fn single_frame_is_logistic() {
    for (a, b) in [(1.0, 0.0), (0.2, 0.7), (-3.0, 3.0)] {
        assert_eq!(match_win_probability(a, b, 1, 0).unwrap(), sigmoid(a - b));
    }
}

#[test]
fn fair_and_min_back_agree_without_edge() {
    for step in 1..100 {
        let p = step as f64 / 100.0;
        assert!((fair_odds(p) * p - 1.0).abs() < 1e-12);
        assert_eq!(min_back_odds(p, 0.0, 0.0), fair_odds(p));
    }
}

#[test]
fn even_match_at_fair_prices_has_no_action() {
    let cfg = PricingConfig {
        target_ev: 0.0,
        commission: 0.0,
        handicap: 0,
    };
    let probs = MatchProbabilities::compute(0.5, 0.5, 1, 0).unwrap();
    assert_eq!(probs.p1_match, 0.5);
    let odds = MatchOdds::compute(&probs, &cfg).unwrap();
    let rec = select_action(&odds, &quote(2.0, 2.0, 2.0, 2.0), cfg.target_ev).unwrap();
    assert_eq!(rec, Recommendation::Nothing);
}

#[test]
fn favourite_in_a_race_to_three_is_backed() {
    let cfg = PricingConfig {
        target_ev: 0.03,
        commission: 0.05,
        handicap: 0,
    };
    let probs = MatchProbabilities::compute(1.0, 0.0, 5, cfg.handicap).unwrap();
    // p^3 (1 + 3q + 6q^2) with p = sigmoid(1)
    let p = sigmoid(1.0);
    let q = 1.0 - p;
    let expected = p.powi(3) * (1.0 + 3.0 * q + 6.0 * q * q);
    assert!((probs.p1_match - expected).abs() < 1e-12);
    assert!(probs.p1_match > 0.87 && probs.p1_match < 0.88);

    let odds = MatchOdds::compute(&probs, &cfg).unwrap();
    assert!(odds.back_min(Side::P1) < 1.5);

    let live = quote(1.5, 1.52, 2.9, 8.0);
    let implied = odds.implied_probability(Side::P1);
    assert!(Action::BackP1.qualifies(implied, &live, cfg.target_ev));
    let rec = select_action(&odds, &live, cfg.target_ev).unwrap();
    assert_eq!(rec.label(), "BACK_P1");
}
