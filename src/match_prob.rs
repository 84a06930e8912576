use serde::Serialize;

use crate::error::ConfigError;
use crate::records::Side;

/// Longest race the engine will price.
pub const MAX_BEST_OF: u32 = 201;

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `ln(sigmoid(x))` without underflow for large negative `x`.
pub fn ln_sigmoid(x: f64) -> f64 {
    -softplus(-x)
}

fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

pub fn choose(n: u32, k: u32) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    (1..=k).fold(1.0_f64, |acc, i| acc * f64::from(n - k + i) / f64::from(i))
}

pub fn ln_choose(n: u32, k: u32) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    let k = k.min(n - k);
    (1..=k)
        .map(|i| f64::from(n - k + i).ln() - f64::from(i).ln())
        .sum()
}

/// Frames a player needs to take a best-of-`best_of` match.
pub fn wins_needed(best_of: u32) -> u32 {
    best_of.div_ceil(2)
}

pub fn frame_win_probability(strength: f64, opponent_strength: f64) -> f64 {
    sigmoid(strength - opponent_strength)
}

/// Probability that the side winning each frame with probability `p` wins the race.
///
/// Each term is the chance of taking the deciding frame after exactly `k`
/// frames. A non-positive handicap `h` keeps only scorelines won by more than
/// `|h|` frames.
pub fn race_win_probability(p: f64, best_of: u32, handicap: i32) -> Result<f64, ConfigError> {
    if handicap > 0 {
        return Err(ConfigError::PositiveHandicap(handicap));
    }
    if best_of == 0 || best_of > MAX_BEST_OF {
        return Err(ConfigError::InvalidRaceLength(best_of));
    }
    let need = wins_needed(best_of);
    let margin = i64::from(handicap.unsigned_abs());
    let q = 1.0 - p;

    let mut total = 0.0_f64;
    for k in need..=best_of {
        if 2 * i64::from(need) - i64::from(k) <= margin {
            continue;
        }
        total += choose(k - 1, need - 1) * p.powi(need as i32) * q.powi((k - need) as i32);
    }
    Ok(total)
}

pub fn match_win_probability(
    strength: f64,
    opponent_strength: f64,
    best_of: u32,
    handicap: i32,
) -> Result<f64, ConfigError> {
    race_win_probability(
        frame_win_probability(strength, opponent_strength),
        best_of,
        handicap,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchProbabilities {
    pub p1_frame: f64,
    pub p2_frame: f64,
    pub p1_match: f64,
    pub p2_match: f64,
}

impl MatchProbabilities {
    pub fn compute(
        p1_strength: f64,
        p2_strength: f64,
        best_of: u32,
        handicap: i32,
    ) -> Result<Self, ConfigError> {
        let p1_frame = frame_win_probability(p1_strength, p2_strength);
        let p2_frame = frame_win_probability(p2_strength, p1_strength);
        let p1_match = race_win_probability(p1_frame, best_of, handicap)?;
        Ok(Self {
            p1_frame,
            p2_frame,
            p1_match,
            // never summed on its own, so the pair always totals one
            p2_match: 1.0 - p1_match,
        })
    }

    pub fn match_win(&self, side: Side) -> f64 {
        match side {
            Side::P1 => self.p1_match,
            Side::P2 => self.p2_match,
        }
    }
}
