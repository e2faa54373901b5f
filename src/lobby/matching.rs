//! Team selection for matchmaking requests
//!
//! Candidates are scanned in random order and the first team that admits the
//! player wins. Competitive lobbies additionally apply the rating gate against
//! both the team joined and the team it will face.

use crate::lobby::instance::{Lobby, LobbyState};
use crate::rating::RatingEngine;
use crate::types::{GameMode, LobbyId, PlayerProfile, SearchCriteria, TeamSlot};
use rand::seq::SliceRandom;
use rand::Rng;

/// Result of a lobby matching operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingResult {
    /// A team in an existing lobby admits the player
    MatchedToLobby { lobby_id: LobbyId, slot: TeamSlot },
    /// No suitable team found, a new lobby should be created
    CreateNewLobby,
}

/// First-fit matcher with rating gate
#[derive(Debug, Clone, Copy, Default)]
pub struct GateMatcher {
    engine: RatingEngine,
}

impl GateMatcher {
    pub fn new(engine: RatingEngine) -> Self {
        Self { engine }
    }

    /// Whether a lobby is open to algorithmic matchmaking for these criteria
    pub fn is_candidate(&self, lobby: &Lobby, criteria: &SearchCriteria) -> bool {
        lobby.kind().is_matchmaking()
            && lobby.state() == LobbyState::Waiting
            && lobby.league() == criteria.league
            && lobby.mode() == criteria.mode
            && lobby.region() == criteria.region
            && criteria.map_pool.contains(&lobby.map())
    }

    /// Whether `slot` of `lobby` admits the player
    pub fn admits(&self, lobby: &Lobby, slot: TeamSlot, player: &PlayerProfile) -> bool {
        if !lobby.is_team_joinable(slot) {
            return false;
        }
        if lobby.mode() != GameMode::Competitive {
            return true;
        }

        let team_average = lobby.team(slot).average_rating();
        let opponent_average = slot
            .opponent()
            .map(|opponent| lobby.team(opponent).average_rating())
            .unwrap_or_default();

        self.engine.passes_gate(player.rating, team_average)
            && self.engine.passes_gate(player.rating, opponent_average)
    }

    /// Scan `lobbies` in random order for the first team that admits the player
    pub fn find_team<'a, I, R>(
        &self,
        player: &PlayerProfile,
        criteria: &SearchCriteria,
        lobbies: I,
        rng: &mut R,
    ) -> MatchingResult
    where
        I: IntoIterator<Item = &'a Lobby>,
        R: Rng + ?Sized,
    {
        let mut candidates: Vec<&Lobby> = lobbies
            .into_iter()
            .filter(|lobby| self.is_candidate(lobby, criteria))
            .collect();
        candidates.shuffle(rng);

        for lobby in candidates {
            for slot in TeamSlot::COMPETITIVE {
                if self.admits(lobby, slot, player) {
                    return MatchingResult::MatchedToLobby {
                        lobby_id: lobby.id(),
                        slot,
                    };
                }
            }
        }

        MatchingResult::CreateNewLobby
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::instance::{LobbyKind, LobbyTemplate};
    use crate::types::{League, MatchConfig, MemberId, Region};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn criteria(mode: GameMode) -> SearchCriteria {
        SearchCriteria {
            league: League::Duo,
            mode,
            map_pool: vec![232, 1460],
            region: Region::Amsterdam,
        }
    }

    fn profile(member_id: MemberId, rating: i64) -> PlayerProfile {
        PlayerProfile {
            member_id,
            user_id: member_id as i64,
            display_name: format!("p{}", member_id),
            rating,
        }
    }

    fn lobby(kind: LobbyKind, mode: GameMode, map: u32) -> Lobby {
        Lobby::new(
            kind,
            League::Duo,
            mode,
            map,
            Region::Amsterdam,
            LobbyTemplate {
                team_size: Some(2),
                match_config: MatchConfig::default(),
            },
        )
    }

    #[test]
    fn test_empty_registry_creates_lobby() {
        let matcher = GateMatcher::default();
        let mut rng = StdRng::seed_from_u64(7);
        let result = matcher.find_team(
            &profile(1, 2000),
            &criteria(GameMode::Casual),
            Vec::<&Lobby>::new(),
            &mut rng,
        );
        assert_eq!(result, MatchingResult::CreateNewLobby);
    }

    #[test]
    fn test_first_fit_prefers_team_a() {
        let matcher = GateMatcher::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mut existing = lobby(LobbyKind::Matchmaking, GameMode::Casual, 232);
        existing.join(TeamSlot::A, &profile(1, 2000)).unwrap();

        let result = matcher.find_team(
            &profile(2, 2000),
            &criteria(GameMode::Casual),
            [&existing],
            &mut rng,
        );
        assert_eq!(
            result,
            MatchingResult::MatchedToLobby {
                lobby_id: existing.id(),
                slot: TeamSlot::A
            }
        );

        existing.join(TeamSlot::A, &profile(2, 2000)).unwrap();
        let result = matcher.find_team(
            &profile(3, 2000),
            &criteria(GameMode::Casual),
            [&existing],
            &mut rng,
        );
        assert_eq!(
            result,
            MatchingResult::MatchedToLobby {
                lobby_id: existing.id(),
                slot: TeamSlot::B
            }
        );
    }

    #[test]
    fn test_filters_exclude_mismatched_lobbies() {
        let matcher = GateMatcher::default();
        let mut rng = StdRng::seed_from_u64(7);
        let player = profile(9, 2000);

        let custom = lobby(LobbyKind::Custom { creator: 1 }, GameMode::Casual, 232);
        let other_map = lobby(LobbyKind::Matchmaking, GameMode::Casual, 999);
        let other_mode = lobby(LobbyKind::Matchmaking, GameMode::Competitive, 232);
        let mut starting = lobby(LobbyKind::Matchmaking, GameMode::Casual, 232);
        starting.mark_starting().unwrap();

        let result = matcher.find_team(
            &player,
            &criteria(GameMode::Casual),
            [&custom, &other_map, &other_mode, &starting],
            &mut rng,
        );
        assert_eq!(result, MatchingResult::CreateNewLobby);
    }

    #[test]
    fn test_rating_gate_against_both_teams() {
        let matcher = GateMatcher::default();
        let mut rng = StdRng::seed_from_u64(7);

        let mut existing = lobby(LobbyKind::Matchmaking, GameMode::Competitive, 232);
        existing.join(TeamSlot::A, &profile(1, 2000)).unwrap();

        // At the boundary of team A
        let result = matcher.find_team(
            &profile(2, 2500),
            &criteria(GameMode::Competitive),
            [&existing],
            &mut rng,
        );
        assert!(matches!(result, MatchingResult::MatchedToLobby { .. }));

        // Outside team A, and team B faces team A's average
        let result = matcher.find_team(
            &profile(3, 2501),
            &criteria(GameMode::Competitive),
            [&existing],
            &mut rng,
        );
        assert_eq!(result, MatchingResult::CreateNewLobby);

        // Casual lobbies ignore ratings
        let mut casual = lobby(LobbyKind::Matchmaking, GameMode::Casual, 232);
        casual.join(TeamSlot::A, &profile(1, 2000)).unwrap();
        let result = matcher.find_team(
            &profile(3, 9000),
            &criteria(GameMode::Casual),
            [&casual],
            &mut rng,
        );
        assert!(matches!(result, MatchingResult::MatchedToLobby { .. }));
    }
}
