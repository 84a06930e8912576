use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::warn;

use crate::records::{GameRecord, PlayerId, PlayerRating, RowRejection};

/// Two-way mapping between caller player ids and the dense `0..n` range the
/// optimizer indexes into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerIndex {
    ids: Vec<PlayerId>,
    positions: HashMap<PlayerId, usize>,
}

impl PlayerIndex {
    /// Duplicates keep their first position.
    pub fn from_ids(ids: impl IntoIterator<Item = PlayerId>) -> Self {
        let mut out = Self::default();
        for id in ids {
            if out.positions.contains_key(&id) {
                continue;
            }
            out.positions.insert(id, out.ids.len());
            out.ids.push(id);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn position(&self, id: PlayerId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn id_at(&self, position: usize) -> Option<PlayerId> {
        self.ids.get(position).copied()
    }

    pub fn ids(&self) -> &[PlayerId] {
        &self.ids
    }

    /// Re-expresses a dense strength vector in the original id space.
    pub fn to_ratings(&self, strengths: &[f64]) -> Vec<PlayerRating> {
        self.ids
            .iter()
            .zip(strengths)
            .map(|(id, rating)| PlayerRating {
                player_id: *id,
                rating: *rating,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedMatch {
    pub game_id: u64,
    pub player_one: usize,
    pub player_two: usize,
    pub player_one_frames: u32,
    pub player_two_frames: u32,
    pub date: NaiveDate,
}

/// Remapped view of the caller's games. The caller's records are untouched.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub index: PlayerIndex,
    pub matches: Vec<IndexedMatch>,
    pub rejected: Vec<(u64, RowRejection)>,
}

pub fn build_training_set(players: &[PlayerId], games: &[GameRecord]) -> TrainingSet {
    let index = PlayerIndex::from_ids(players.iter().copied());
    let mut matches = Vec::with_capacity(games.len());
    let mut rejected = Vec::new();

    for game in games {
        let scoreline = match game.validate() {
            Ok(s) => s,
            Err(reason) => {
                rejected.push((game.game_id, reason));
                continue;
            }
        };
        let (Some(p1), Some(p2)) = (
            index.position(scoreline.player_one),
            index.position(scoreline.player_two),
        ) else {
            rejected.push((game.game_id, RowRejection::UnknownPlayer));
            continue;
        };
        matches.push(IndexedMatch {
            game_id: scoreline.game_id,
            player_one: p1,
            player_two: p2,
            player_one_frames: scoreline.player_one_frames,
            player_two_frames: scoreline.player_two_frames,
            date: scoreline.date,
        });
    }

    if !rejected.is_empty() {
        warn!(
            dropped = rejected.len(),
            kept = matches.len(),
            "dropped invalid game rows before fitting"
        );
    }

    TrainingSet {
        index,
        matches,
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_keep_first_position() {
        let idx = PlayerIndex::from_ids([7, 3, 7, 9]);
        assert_eq!(idx.ids(), &[7, 3, 9]);
        assert_eq!(idx.position(9), Some(2));
        assert_eq!(idx.id_at(1), Some(3));
        assert_eq!(idx.position(4), None);
    }

    #[test]
    fn games_with_unknown_players_are_rejected() {
        let games = vec![
            GameRecord {
                game_id: 1,
                date: NaiveDate::from_ymd_opt(2022, 5, 1),
                player_one_id: Some(100),
                player_two_id: Some(200),
                player_one_frames: Some(4),
                player_two_frames: Some(2),
                best_of: Some(7),
            },
            GameRecord {
                game_id: 2,
                date: NaiveDate::from_ymd_opt(2022, 5, 2),
                player_one_id: Some(100),
                player_two_id: Some(300),
                player_one_frames: Some(4),
                player_two_frames: Some(0),
                best_of: Some(7),
            },
        ];
        let set = build_training_set(&[200, 100], &games);
        assert_eq!(set.matches.len(), 1);
        assert_eq!(set.matches[0].player_one, 1);
        assert_eq!(set.matches[0].player_two, 0);
        assert_eq!(set.rejected, vec![(2, RowRejection::UnknownPlayer)]);
        // caller data is unchanged
        assert_eq!(games[0].player_one_id, Some(100));
    }
}
