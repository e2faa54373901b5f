//! Teams inside a lobby

use crate::rating::average_rating;
use crate::types::{MemberId, PlayerProfile, PlayerView, TeamSlot, TeamView, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A player seated in a lobby, with the stats gathered while playing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub member_id: MemberId,
    pub user_id: UserId,
    pub display_name: String,
    pub rating: i64,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
}

impl LobbyPlayer {
    pub fn from_profile(profile: &PlayerProfile) -> Self {
        Self {
            member_id: profile.member_id,
            user_id: profile.user_id,
            display_name: profile.display_name.clone(),
            rating: profile.rating,
            kills: 0,
            deaths: 0,
            assists: 0,
        }
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
            rating: self.rating,
        }
    }
}

/// One of the three teams of a lobby, keyed by internal user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    slot: TeamSlot,
    players: BTreeMap<UserId, LobbyPlayer>,
    average_rating: i64,
}

impl Team {
    pub fn new(slot: TeamSlot) -> Self {
        Self {
            slot,
            players: BTreeMap::new(),
            average_rating: 0,
        }
    }

    pub fn slot(&self) -> TeamSlot {
        self.slot
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Floor of the mean member rating, 0 while empty
    pub fn average_rating(&self) -> i64 {
        self.average_rating
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.players.contains_key(&user_id)
    }

    pub fn get(&self, user_id: UserId) -> Option<&LobbyPlayer> {
        self.players.get(&user_id)
    }

    pub fn get_mut(&mut self, user_id: UserId) -> Option<&mut LobbyPlayer> {
        self.players.get_mut(&user_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &LobbyPlayer> {
        self.players.values()
    }

    pub fn user_ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.players.keys().copied()
    }

    pub(crate) fn insert(&mut self, player: LobbyPlayer) {
        self.players.insert(player.user_id, player);
        self.recompute_average();
    }

    pub(crate) fn remove(&mut self, user_id: UserId) -> Option<LobbyPlayer> {
        let removed = self.players.remove(&user_id);
        self.recompute_average();
        removed
    }

    pub(crate) fn recompute_average(&mut self) {
        self.average_rating = average_rating(self.players.values().map(|p| p.rating));
    }

    pub fn view(&self) -> TeamView {
        TeamView {
            slot: self.slot,
            average_rating: self.average_rating,
            players: self.players.values().map(LobbyPlayer::view).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(user_id: UserId, rating: i64) -> LobbyPlayer {
        LobbyPlayer::from_profile(&PlayerProfile {
            member_id: user_id as MemberId + 1000,
            user_id,
            display_name: format!("player{}", user_id),
            rating,
        })
    }

    #[test]
    fn test_average_follows_roster() {
        let mut team = Team::new(TeamSlot::A);
        assert_eq!(team.average_rating(), 0);

        team.insert(player(1, 2000));
        team.insert(player(2, 2101));
        assert_eq!(team.average_rating(), 2050);
        assert_eq!(team.len(), 2);

        assert!(team.remove(1).is_some());
        assert_eq!(team.average_rating(), 2101);

        assert!(team.remove(2).is_some());
        assert_eq!(team.average_rating(), 0);
        assert!(team.remove(2).is_none());
    }

    #[test]
    fn test_team_view() {
        let mut team = Team::new(TeamSlot::B);
        team.insert(player(7, 1800));

        let view = team.view();
        assert_eq!(view.slot, TeamSlot::B);
        assert_eq!(view.average_rating, 1800);
        assert_eq!(view.players[0].display_name, "player7");
    }
}
