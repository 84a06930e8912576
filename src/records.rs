use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::OddsError;

pub type PlayerId = u32;

/// Strength every player starts a fit from.
pub const NEUTRAL_STRENGTH: f64 = 0.5;

/// Exchange sentinel for "nothing offered at this price".
pub const NO_LIQUIDITY: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    P1,
    P2,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::P1 => Side::P2,
            Side::P2 => Side::P1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::P1 => f.write_str("P1"),
            Side::P2 => f.write_str("P2"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub first_name: String,
    pub last_name: String,
}

impl PlayerRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerRating {
    pub player_id: PlayerId,
    pub rating: f64,
}

/// A finished game as the storage layer hands it over. Any field may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: u64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub player_one_id: Option<PlayerId>,
    #[serde(default)]
    pub player_two_id: Option<PlayerId>,
    #[serde(default)]
    pub player_one_frames: Option<i64>,
    #[serde(default)]
    pub player_two_frames: Option<i64>,
    #[serde(default)]
    pub best_of: Option<i64>,
}

/// A game that passed validation and can enter a fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scoreline {
    pub game_id: u64,
    pub date: NaiveDate,
    pub player_one: PlayerId,
    pub player_two: PlayerId,
    pub player_one_frames: u32,
    pub player_two_frames: u32,
    pub best_of: Option<u32>,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRejection {
    #[error("missing date")]
    MissingDate,
    #[error("missing player id")]
    MissingPlayer,
    #[error("missing player name")]
    MissingName,
    #[error("missing rating")]
    MissingRating,
    #[error("missing frame count")]
    MissingFrames,
    #[error("negative or oversized frame count")]
    InvalidFrames,
    #[error("player faces themselves")]
    SamePlayer,
    #[error("race length must be positive")]
    InvalidRaceLength,
    #[error("frames played exceed the race length")]
    FramesExceedRace,
    #[error("player not in the selected player set")]
    UnknownPlayer,
}

impl GameRecord {
    pub fn validate(&self) -> Result<Scoreline, RowRejection> {
        let date = self.date.ok_or(RowRejection::MissingDate)?;
        let (Some(player_one), Some(player_two)) = (self.player_one_id, self.player_two_id) else {
            return Err(RowRejection::MissingPlayer);
        };
        if player_one == player_two {
            return Err(RowRejection::SamePlayer);
        }
        let (Some(f1), Some(f2)) = (self.player_one_frames, self.player_two_frames) else {
            return Err(RowRejection::MissingFrames);
        };
        let f1 = u32::try_from(f1).map_err(|_| RowRejection::InvalidFrames)?;
        let f2 = u32::try_from(f2).map_err(|_| RowRejection::InvalidFrames)?;

        let best_of = match self.best_of {
            Some(raw) => {
                let b = u32::try_from(raw).map_err(|_| RowRejection::InvalidRaceLength)?;
                if b == 0 {
                    return Err(RowRejection::InvalidRaceLength);
                }
                if u64::from(f1) + u64::from(f2) > u64::from(b) {
                    return Err(RowRejection::FramesExceedRace);
                }
                Some(b)
            }
            None => None,
        };

        Ok(Scoreline {
            game_id: self.game_id,
            date,
            player_one,
            player_two,
            player_one_frames: f1,
            player_two_frames: f2,
            best_of,
        })
    }
}

/// An upcoming game joined with the latest stored ratings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingMatch {
    pub game_id: u64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub player_one_id: Option<PlayerId>,
    #[serde(default)]
    pub player_one_name: Option<String>,
    #[serde(default)]
    pub player_one_rating: Option<f64>,
    #[serde(default)]
    pub player_two_id: Option<PlayerId>,
    #[serde(default)]
    pub player_two_name: Option<String>,
    #[serde(default)]
    pub player_two_rating: Option<f64>,
    #[serde(default)]
    pub best_of: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Competitor {
    pub player_id: PlayerId,
    pub name: String,
    pub strength: f64,
}

/// An upcoming game with every field the pricing stage needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchUp {
    pub game_id: u64,
    pub date: NaiveDate,
    pub player_one: Competitor,
    pub player_two: Competitor,
    pub best_of: u32,
}

impl UpcomingMatch {
    pub fn validate(&self) -> Result<MatchUp, RowRejection> {
        let date = self.date.ok_or(RowRejection::MissingDate)?;
        let player_one = competitor(
            self.player_one_id,
            self.player_one_name.as_deref(),
            self.player_one_rating,
        )?;
        let player_two = competitor(
            self.player_two_id,
            self.player_two_name.as_deref(),
            self.player_two_rating,
        )?;
        if player_one.player_id == player_two.player_id {
            return Err(RowRejection::SamePlayer);
        }
        // A missing race length is read as a single frame.
        let best_of = self.best_of.unwrap_or(1);
        if best_of == 0 {
            return Err(RowRejection::InvalidRaceLength);
        }
        Ok(MatchUp {
            game_id: self.game_id,
            date,
            player_one,
            player_two,
            best_of,
        })
    }
}

fn competitor(
    id: Option<PlayerId>,
    name: Option<&str>,
    rating: Option<f64>,
) -> Result<Competitor, RowRejection> {
    let player_id = id.ok_or(RowRejection::MissingPlayer)?;
    let name = name
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(RowRejection::MissingName)?;
    let strength = rating
        .filter(|r| r.is_finite())
        .ok_or(RowRejection::MissingRating)?;
    Ok(Competitor {
        player_id,
        name: name.to_string(),
        strength,
    })
}

/// Best available exchange prices for one match, as scraped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveQuote {
    pub p1_name: String,
    pub p2_name: String,
    pub p1_best_back: f64,
    pub p1_best_lay: f64,
    pub p2_best_back: f64,
    pub p2_best_lay: f64,
}

impl LiveQuote {
    pub fn back(&self, side: Side) -> f64 {
        match side {
            Side::P1 => self.p1_best_back,
            Side::P2 => self.p2_best_back,
        }
    }

    pub fn lay(&self, side: Side) -> f64 {
        match side {
            Side::P1 => self.p1_best_lay,
            Side::P2 => self.p2_best_lay,
        }
    }

    pub fn has_liquidity(&self) -> bool {
        [
            self.p1_best_back,
            self.p1_best_lay,
            self.p2_best_back,
            self.p2_best_lay,
        ]
        .iter()
        .all(|price| *price != NO_LIQUIDITY)
    }

    /// Every price must be the sentinel or a finite decimal price of at least 1.0.
    pub fn check_prices(&self) -> Result<(), OddsError> {
        for side in [Side::P1, Side::P2] {
            for price in [self.back(side), self.lay(side)] {
                if price == NO_LIQUIDITY {
                    continue;
                }
                if !price.is_finite() || price < 1.0 {
                    return Err(OddsError::InvalidQuote { side, price });
                }
            }
        }
        Ok(())
    }

    /// The same market with the runners listed the other way round.
    pub fn swapped(&self) -> Self {
        Self {
            p1_name: self.p2_name.clone(),
            p2_name: self.p1_name.clone(),
            p1_best_back: self.p2_best_back,
            p1_best_lay: self.p2_best_lay,
            p2_best_back: self.p1_best_back,
            p2_best_lay: self.p1_best_lay,
        }
    }
}
