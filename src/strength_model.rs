use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{FitConfig, Likelihood};
use crate::error::ModelError;
use crate::match_prob::{ln_choose, ln_sigmoid, sigmoid};
use crate::player_index::{IndexedMatch, TrainingSet, build_training_set};
use crate::records::{GameRecord, NEUTRAL_STRENGTH, PlayerId, PlayerRating};

/// Weight of a game played on `date` when fitting on `today`.
///
/// Past games decay towards zero. Games dated after `today` get a weight above one.
pub fn decay_weight(date: NaiveDate, today: NaiveDate, decay_days: f64) -> f64 {
    let days = (date - today).num_days() as f64;
    (days / decay_days).exp()
}

/// Log of the scoreline multiplicity under the chosen likelihood.
pub fn log_coefficient(player_one_frames: u32, player_two_frames: u32, likelihood: Likelihood) -> f64 {
    let total = player_one_frames + player_two_frames;
    match likelihood {
        Likelihood::NegativeBinomial => {
            ln_choose(total.saturating_sub(1), player_one_frames.saturating_sub(1))
        }
        Likelihood::Binomial => ln_choose(total, player_one_frames),
    }
}

/// Unweighted log-likelihood of one scoreline given both strengths.
pub fn match_log_likelihood(
    strength_one: f64,
    strength_two: f64,
    player_one_frames: u32,
    player_two_frames: u32,
    likelihood: Likelihood,
) -> f64 {
    let diff = strength_one - strength_two;
    log_coefficient(player_one_frames, player_two_frames, likelihood)
        + f64::from(player_one_frames) * ln_sigmoid(diff)
        + f64::from(player_two_frames) * ln_sigmoid(-diff)
}

/// Cooperative stop signal for a running fit.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    IterationBudget,
    Converged,
    Cancelled,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::IterationBudget => "iteration_budget",
            StopReason::Converged => "converged",
            StopReason::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TraceSample {
    pub iteration: usize,
    pub loss: f64,
    pub norm: f64,
}

/// Loss and strength-norm history, keeping only the newest `capacity` samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitTrace {
    every: usize,
    capacity: usize,
    samples: VecDeque<TraceSample>,
}

impl FitTrace {
    pub fn new(every: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            every: every.max(1),
            capacity,
            samples: VecDeque::with_capacity(capacity.min(4096)),
        }
    }

    pub fn due(&self, iteration: usize) -> bool {
        iteration % self.every == 0
    }

    pub fn push(&mut self, sample: TraceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn samples(&self) -> impl Iterator<Item = &TraceSample> {
        self.samples.iter()
    }

    pub fn last(&self) -> Option<&TraceSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Strengths plus Adam moment estimates. Owned by one fit.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerState {
    strengths: Vec<f64>,
    m: Vec<f64>,
    v: Vec<f64>,
    step: u64,
}

impl OptimizerState {
    pub fn new(players: usize) -> Self {
        Self {
            strengths: vec![NEUTRAL_STRENGTH; players],
            m: vec![0.0; players],
            v: vec![0.0; players],
            step: 0,
        }
    }

    pub fn strengths(&self) -> &[f64] {
        &self.strengths
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn norm(&self) -> f64 {
        self.strengths.iter().map(|s| s * s).sum::<f64>().sqrt()
    }

    fn apply(&mut self, grad: &[f64], cfg: &FitConfig) {
        self.step += 1;
        let t = self.step.min(i32::MAX as u64) as i32;
        let bias1 = 1.0 - cfg.beta1.powi(t);
        let bias2 = 1.0 - cfg.beta2.powi(t);
        for (i, g) in grad.iter().enumerate() {
            self.m[i] = cfg.beta1 * self.m[i] + (1.0 - cfg.beta1) * g;
            self.v[i] = cfg.beta2 * self.v[i] + (1.0 - cfg.beta2) * g * g;
            let m_hat = self.m[i] / bias1;
            let v_hat = self.v[i] / bias2;
            self.strengths[i] -= cfg.learning_rate * m_hat / (v_hat.sqrt() + cfg.epsilon);
        }
    }
}

/// Time-weighted negative log-likelihood over a remapped match table.
struct Objective<'a> {
    matches: &'a [IndexedMatch],
    weights: Vec<f64>,
    likelihood: Likelihood,
}

impl<'a> Objective<'a> {
    fn new(matches: &'a [IndexedMatch], cfg: &FitConfig, today: NaiveDate) -> Self {
        let weights: Vec<f64> = matches
            .iter()
            .map(|m| decay_weight(m.date, today, cfg.decay_days))
            .collect();
        let future = matches.iter().filter(|m| m.date > today).count();
        if future > 0 {
            warn!(future, %today, "games dated after the fit date weigh more than today's games");
        }
        Self {
            matches,
            weights,
            likelihood: cfg.likelihood,
        }
    }

    /// Writes the gradient into `grad` and returns the loss when asked for it.
    fn evaluate(&self, strengths: &[f64], grad: &mut [f64], with_loss: bool) -> Option<f64> {
        grad.iter_mut().for_each(|g| *g = 0.0);
        let mut loss = 0.0;
        for (m, w) in self.matches.iter().zip(&self.weights) {
            let s1 = strengths[m.player_one];
            let s2 = strengths[m.player_two];
            let p = sigmoid(s1 - s2);
            let f1 = f64::from(m.player_one_frames);
            let f2 = f64::from(m.player_two_frames);
            let g = -w * (f1 * (1.0 - p) - f2 * p);
            grad[m.player_one] += g;
            grad[m.player_two] -= g;
            if with_loss {
                loss -= w * match_log_likelihood(
                    s1,
                    s2,
                    m.player_one_frames,
                    m.player_two_frames,
                    self.likelihood,
                );
            }
        }
        with_loss.then_some(loss)
    }

    fn loss(&self, strengths: &[f64]) -> f64 {
        let mut scratch = vec![0.0; strengths.len()];
        self.evaluate(strengths, &mut scratch, true).unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// One rating per selected player, in the caller's id space.
    pub ratings: Vec<PlayerRating>,
    pub final_loss: f64,
    pub final_norm: f64,
    pub iterations_run: usize,
    pub stop_reason: StopReason,
    pub trace: FitTrace,
    pub matches_used: usize,
    pub rows_dropped: usize,
    pub state: OptimizerState,
}

/// Fits one strength per player from finished games.
///
/// Invalid rows are dropped first. Ratings come back keyed by the ids in
/// `players`, whatever order they were given in.
pub fn fit_strengths(
    players: &[PlayerId],
    games: &[GameRecord],
    cfg: &FitConfig,
    today: NaiveDate,
    cancel: &CancelToken,
) -> Result<FitOutcome, ModelError> {
    cfg.validate()?;
    if players.is_empty() {
        return Err(ModelError::NoPlayers);
    }
    let set = build_training_set(players, games);
    fit_training_set(&set, cfg, today, cancel)
}

pub fn fit_training_set(
    set: &TrainingSet,
    cfg: &FitConfig,
    today: NaiveDate,
    cancel: &CancelToken,
) -> Result<FitOutcome, ModelError> {
    cfg.validate()?;
    if set.index.is_empty() {
        return Err(ModelError::NoPlayers);
    }
    if set.matches.is_empty() {
        return Err(ModelError::EmptyTrainingSet);
    }

    let objective = Objective::new(&set.matches, cfg, today);
    let mut state = OptimizerState::new(set.index.len());
    let mut trace = FitTrace::new(cfg.trace_every, cfg.trace_capacity);
    let mut grad = vec![0.0; set.index.len()];
    let mut stop_reason = StopReason::IterationBudget;
    let mut iterations_run = 0;

    info!(
        players = set.index.len(),
        matches = set.matches.len(),
        iterations = cfg.iterations,
        learning_rate = cfg.learning_rate,
        likelihood = ?cfg.likelihood,
        "fitting player strengths"
    );

    for iteration in 1..=cfg.iterations {
        if cancel.is_cancelled() {
            stop_reason = StopReason::Cancelled;
            break;
        }
        let sample = trace.due(iteration);
        let logged = iteration % cfg.log_every.max(1) == 0;
        let loss = objective.evaluate(state.strengths(), &mut grad, sample || logged);

        if let Some(loss) = loss {
            let norm = state.norm();
            if logged {
                debug!(iteration, loss, norm, "fit progress");
            }
            if sample {
                let previous = trace.last().map(|s| s.loss);
                trace.push(TraceSample {
                    iteration,
                    loss,
                    norm,
                });
                if let (Some(tol), Some(prev)) = (cfg.tolerance, previous)
                    && relative_change(prev, loss) <= tol
                {
                    iterations_run = iteration - 1;
                    stop_reason = StopReason::Converged;
                    break;
                }
            }
        }

        state.apply(&grad, cfg);
        iterations_run = iteration;
    }

    let final_loss = objective.loss(state.strengths());
    let final_norm = state.norm();
    info!(
        iterations_run,
        final_loss,
        final_norm,
        stop = stop_reason.as_str(),
        "fit finished"
    );

    Ok(FitOutcome {
        ratings: set.index.to_ratings(state.strengths()),
        final_loss,
        final_norm,
        iterations_run,
        stop_reason,
        trace,
        matches_used: set.matches.len(),
        rows_dropped: set.rejected.len(),
        state,
    })
}

fn relative_change(prev: f64, cur: f64) -> f64 {
    (prev - cur).abs() / prev.abs().max(f64::MIN_POSITIVE)
}
