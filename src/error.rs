use thiserror::Error;

use crate::records::Side;

/// Configuration mistakes. These abort the whole run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("positive handicap {0} is not supported (handicap must be <= 0)")]
    PositiveHandicap(i32),

    #[error("commission {0} must be in [0, 1)")]
    CommissionOutOfRange(f64),

    #[error("target EV {0} must be a finite number greater than -1")]
    InvalidTargetEv(f64),

    #[error("race length best-of-{0} is invalid")]
    InvalidRaceLength(u32),

    #[error("learning rate {0} must be finite and positive")]
    InvalidLearningRate(f64),

    #[error("iteration budget must be at least 1")]
    ZeroIterations,

    #[error("decay horizon {0} days must be finite and positive")]
    InvalidDecayDays(f64),
}

/// Per-match computation failures. One bad match never aborts the batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OddsError {
    #[error("{side} win probability {probability} is degenerate (must be strictly between 0 and 1)")]
    DegenerateProbability { side: Side, probability: f64 },

    #[error("{what} evaluated to non-finite value {value}")]
    NonFiniteOdds { what: &'static str, value: f64 },

    #[error("{side} quote {price} is not a decimal price >= 1.0")]
    InvalidQuote { side: Side, price: f64 },

    #[error("{side} lay price {price} leaves no liability to price against")]
    DegenerateLayPrice { side: Side, price: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("no valid matches left to fit after validation")]
    EmptyTrainingSet,

    #[error("player collection is empty")]
    NoPlayers,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
