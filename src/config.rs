use std::env;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CACHE_DIR: &str = "cue_edge";
const DB_FILE: &str = "snooker.sqlite";

const DEFAULT_TARGET_EV: f64 = 0.03;
const DEFAULT_COMMISSION: f64 = 0.05;

const DEFAULT_ITERATIONS: usize = 100_000;
const DEFAULT_LEARNING_RATE: f64 = 0.0001;
const DEFAULT_DECAY_DAYS: f64 = 725.0;
const DEFAULT_TRACE_EVERY: usize = 100;
const DEFAULT_TRACE_CAPACITY: usize = 4096;
const DEFAULT_LOG_EVERY: usize = 1000;

const DEFAULT_MIN_GAMES: usize = 25;

/// Caller-chosen thresholds applied to every match of a pricing run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub target_ev: f64,
    pub commission: f64,
    /// Frame offset applied to player one. Only zero or negative values are priced.
    pub handicap: i32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            target_ev: DEFAULT_TARGET_EV,
            commission: DEFAULT_COMMISSION,
            handicap: 0,
        }
    }
}

impl PricingConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            target_ev: env_f64("EDGE_TARGET_EV").unwrap_or(d.target_ev),
            commission: env_f64("EDGE_COMMISSION").unwrap_or(d.commission),
            handicap: env::var("EDGE_HANDICAP")
                .ok()
                .and_then(|v| v.trim().parse::<i32>().ok())
                .unwrap_or(d.handicap),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handicap > 0 {
            return Err(ConfigError::PositiveHandicap(self.handicap));
        }
        if !self.commission.is_finite() || !(0.0..1.0).contains(&self.commission) {
            return Err(ConfigError::CommissionOutOfRange(self.commission));
        }
        if !self.target_ev.is_finite() || self.target_ev <= -1.0 {
            return Err(ConfigError::InvalidTargetEv(self.target_ev));
        }
        Ok(())
    }

    /// Fraction of winnings kept after the exchange takes its commission.
    pub fn net_fraction(&self) -> f64 {
        1.0 - self.commission
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Likelihood {
    /// `C(f1+f2-1, f1-1)`: the last frame belongs to the match winner.
    NegativeBinomial,
    /// `C(f1+f2, f1)`: scorelines treated as unordered frame counts.
    Binomial,
}

impl Likelihood {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "negbin" | "negative_binomial" | "negative-binomial" => Some(Self::NegativeBinomial),
            "binomial" | "binom" => Some(Self::Binomial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub iterations: usize,
    pub learning_rate: f64,
    /// e-folding horizon of the time-decay weight, in days.
    pub decay_days: f64,
    pub likelihood: Likelihood,
    pub trace_every: usize,
    pub trace_capacity: usize,
    pub log_every: usize,
    /// Relative loss change between trace samples at which the fit stops early.
    pub tolerance: Option<f64>,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            learning_rate: DEFAULT_LEARNING_RATE,
            decay_days: DEFAULT_DECAY_DAYS,
            likelihood: Likelihood::NegativeBinomial,
            trace_every: DEFAULT_TRACE_EVERY,
            trace_capacity: DEFAULT_TRACE_CAPACITY,
            log_every: DEFAULT_LOG_EVERY,
            tolerance: None,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

impl FitConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            iterations: env_usize("FIT_ITERATIONS").unwrap_or(d.iterations),
            learning_rate: env_f64("FIT_LEARNING_RATE").unwrap_or(d.learning_rate),
            decay_days: env_f64("FIT_DECAY_DAYS").unwrap_or(d.decay_days),
            likelihood: env::var("FIT_LIKELIHOOD")
                .ok()
                .and_then(|v| Likelihood::parse(&v))
                .unwrap_or(d.likelihood),
            trace_every: env_usize("FIT_TRACE_EVERY")
                .unwrap_or(d.trace_every)
                .max(1),
            trace_capacity: env_usize("FIT_TRACE_CAPACITY")
                .unwrap_or(d.trace_capacity)
                .clamp(16, 1_000_000),
            log_every: env_usize("FIT_LOG_EVERY").unwrap_or(d.log_every).max(1),
            tolerance: env_f64("FIT_TOLERANCE").filter(|t| *t > 0.0),
            ..d
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate));
        }
        if !self.decay_days.is_finite() || self.decay_days <= 0.0 {
            return Err(ConfigError::InvalidDecayDays(self.decay_days));
        }
        Ok(())
    }
}

/// Which players and games enter a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingFilter {
    pub last_played_since: NaiveDate,
    pub games_since: NaiveDate,
    pub min_games: usize,
}

impl Default for TrainingFilter {
    fn default() -> Self {
        let cutoff = NaiveDate::from_ymd_opt(2012, 1, 1).unwrap_or_default();
        Self {
            last_played_since: cutoff,
            games_since: cutoff,
            min_games: DEFAULT_MIN_GAMES,
        }
    }
}

impl TrainingFilter {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            last_played_since: env_date("TRAIN_LAST_PLAYED_SINCE").unwrap_or(d.last_played_since),
            games_since: env_date("TRAIN_GAMES_SINCE").unwrap_or(d.games_since),
            min_games: env_usize("TRAIN_MIN_GAMES").unwrap_or(d.min_games),
        }
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(raw) = env::var("CUE_EDGE_DB")
        && !raw.trim().is_empty()
    {
        return Some(PathBuf::from(raw.trim()));
    }
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    // Stored dates sometimes carry a time component.
    let day = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.trim().parse::<usize>().ok())
}

fn env_date(key: &str) -> Option<NaiveDate> {
    env::var(key).ok().and_then(|v| parse_date(&v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_handicap_is_a_config_error() {
        let cfg = PricingConfig {
            handicap: 2,
            ..PricingConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::PositiveHandicap(2)));
    }

    #[test]
    fn commission_must_leave_something() {
        let cfg = PricingConfig {
            commission: 1.0,
            ..PricingConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::CommissionOutOfRange(1.0)));
        assert!(PricingConfig::default().validate().is_ok());
    }

    #[test]
    fn fit_defaults_match_reference_budget() {
        let cfg = FitConfig::default();
        assert_eq!(cfg.iterations, 100_000);
        assert_eq!(cfg.learning_rate, 0.0001);
        assert_eq!(cfg.likelihood, Likelihood::NegativeBinomial);
        assert!(cfg.tolerance.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parse_date_accepts_timestamps() {
        assert_eq!(parse_date("2023-11-05"), NaiveDate::from_ymd_opt(2023, 11, 5));
        assert_eq!(
            parse_date("2023-11-05 13:00:00"),
            NaiveDate::from_ymd_opt(2023, 11, 5)
        );
        assert_eq!(parse_date("n/a"), None);
    }

    #[test]
    fn likelihood_names() {
        assert_eq!(Likelihood::parse("NegBin"), Some(Likelihood::NegativeBinomial));
        assert_eq!(Likelihood::parse("binomial"), Some(Likelihood::Binomial));
        assert_eq!(Likelihood::parse("poisson"), None);
    }
}
