//! Registry of waiting lobbies
//!
//! All lobby mutations happen inside this type while its lock is held. Callers
//! only ever receive owned snapshots or run closures through `with_lobby`.
//! Membership is checked across lobbies and started matches before every join,
//! always locking lobbies first and matches second.

use crate::error::{MatchmakingError, Result};
use crate::lobby::instance::{Lobby, LobbyKind, LobbyState, LobbyTemplate, Seat};
use crate::lobby::matching::{GateMatcher, MatchingResult};
use crate::match_service::CreateMatchRequest;
use crate::matches::registry::MatchMap;
use crate::matches::{Match, MatchRegistry};
use crate::rating::RatingEngine;
use crate::types::{
    GameMode, League, LobbyId, MapId, MatchConfig, MatchId, MatchStarted, MatchStatus, MemberId,
    PlayerProfile, Region, SearchCriteria, TeamSlot,
};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

type LobbyMap = HashMap<LobbyId, Lobby>;

/// Where a matchmaking request placed a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub lobby_id: LobbyId,
    pub slot: TeamSlot,
    /// A new lobby was created for the player
    pub created: bool,
    /// The lobby is full after this join
    pub full: bool,
}

/// Result of removing a player from a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub lobby_id: LobbyId,
    pub slot: TeamSlot,
    /// The lobby was empty afterwards and has been deleted
    pub lobby_removed: bool,
}

/// Who asks for a lobby to be started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRequester {
    /// The matchmaker, once a matchmaking lobby is full
    System,
    /// A member, for their own custom lobby
    Member(MemberId),
}

/// Shared registry of waiting lobbies
#[derive(Debug, Clone)]
pub struct LobbyRegistry {
    lobbies: Arc<Mutex<LobbyMap>>,
    matches: MatchRegistry,
    matcher: GateMatcher,
}

impl LobbyRegistry {
    pub fn new(matches: MatchRegistry, engine: RatingEngine) -> Self {
        Self {
            lobbies: Arc::new(Mutex::new(HashMap::new())),
            matches,
            matcher: GateMatcher::new(engine),
        }
    }

    /// The match registry this registry promotes lobbies into
    pub fn matches(&self) -> &MatchRegistry {
        &self.matches
    }

    fn ensure_not_seated(
        lobbies: &LobbyMap,
        matches: &MatchMap,
        member_id: MemberId,
        except: Option<LobbyId>,
    ) -> Result<()> {
        if let Some(lobby) = lobbies
            .values()
            .find(|lobby| Some(lobby.id()) != except && lobby.contains_member(member_id))
        {
            return Err(MatchmakingError::AlreadySeated {
                member_id,
                container: format!("lobby {}", lobby.id()),
            }
            .into());
        }

        if let Some(m) = matches.values().find(|m| m.contains_member(member_id)) {
            return Err(MatchmakingError::AlreadySeated {
                member_id,
                container: format!("match {}", m.match_id()),
            }
            .into());
        }

        Ok(())
    }

    fn lobby_mut(lobbies: &mut LobbyMap, lobby_id: LobbyId) -> Result<&mut Lobby> {
        lobbies.get_mut(&lobby_id).ok_or_else(|| {
            MatchmakingError::LobbyNotFound {
                lobby_id: lobby_id.to_string(),
            }
            .into()
        })
    }

    fn place_player(
        lobbies: &mut LobbyMap,
        matcher: &GateMatcher,
        criteria: &SearchCriteria,
        player: &PlayerProfile,
        template: LobbyTemplate,
    ) -> Result<Placement> {
        let mut rng = rand::thread_rng();

        match matcher.find_team(player, criteria, lobbies.values(), &mut rng) {
            MatchingResult::MatchedToLobby { lobby_id, slot } => {
                let lobby = Self::lobby_mut(lobbies, lobby_id)?;
                lobby.join(slot, player)?;
                Ok(Placement {
                    lobby_id,
                    slot,
                    created: false,
                    full: lobby.is_full(),
                })
            }
            MatchingResult::CreateNewLobby => {
                let map = *criteria.map_pool.choose(&mut rng).ok_or_else(|| {
                    MatchmakingError::InvalidRequest {
                        reason: "map pool is empty".to_string(),
                    }
                })?;

                let mut lobby = Lobby::new(
                    LobbyKind::Matchmaking,
                    criteria.league,
                    criteria.mode,
                    map,
                    criteria.region,
                    template,
                );
                lobby.join(TeamSlot::A, player)?;

                let placement = Placement {
                    lobby_id: lobby.id(),
                    slot: TeamSlot::A,
                    created: true,
                    full: lobby.is_full(),
                };
                lobbies.insert(lobby.id(), lobby);
                Ok(placement)
            }
        }
    }

    /// Seat a player in the first matching team, or in a fresh lobby
    pub async fn find_or_create(
        &self,
        criteria: &SearchCriteria,
        player: &PlayerProfile,
        template: LobbyTemplate,
    ) -> Result<Placement> {
        if criteria.map_pool.is_empty() {
            return Err(MatchmakingError::InvalidRequest {
                reason: "map pool is empty".to_string(),
            }
            .into());
        }

        let mut lobbies = self.lobbies.lock().await;
        {
            let matches = self.matches.lock().await;
            Self::ensure_not_seated(&lobbies, &matches, player.member_id, None)?;
        }

        let placement = Self::place_player(&mut lobbies, &self.matcher, criteria, player, template)?;

        info!(
            "Placed member {} in team {} of lobby {} (created: {}, full: {})",
            player.member_id, placement.slot, placement.lobby_id, placement.created, placement.full
        );
        Ok(placement)
    }

    /// Create a custom lobby with the creator seated in team A
    pub async fn create_custom(
        &self,
        creator: &PlayerProfile,
        league: League,
        mode: GameMode,
        map: MapId,
        region: Region,
        template: LobbyTemplate,
    ) -> Result<LobbyId> {
        let mut lobbies = self.lobbies.lock().await;
        {
            let matches = self.matches.lock().await;
            Self::ensure_not_seated(&lobbies, &matches, creator.member_id, None)?;
        }

        let mut lobby = Lobby::new(
            LobbyKind::Custom {
                creator: creator.member_id,
            },
            league,
            mode,
            map,
            region,
            template,
        );
        lobby.join(TeamSlot::A, creator)?;

        let lobby_id = lobby.id();
        lobbies.insert(lobby_id, lobby);

        info!(
            "Created custom {} {} lobby {} for member {}",
            league, mode, lobby_id, creator.member_id
        );
        Ok(lobby_id)
    }

    /// Join a custom lobby at `slot`, moving seats inside the same lobby
    pub async fn join_custom(
        &self,
        lobby_id: LobbyId,
        slot: TeamSlot,
        player: &PlayerProfile,
    ) -> Result<()> {
        let mut lobbies = self.lobbies.lock().await;
        {
            let matches = self.matches.lock().await;
            Self::ensure_not_seated(&lobbies, &matches, player.member_id, Some(lobby_id))?;
        }

        let lobby = Self::lobby_mut(&mut lobbies, lobby_id)?;
        if lobby.kind().is_matchmaking() {
            return Err(MatchmakingError::InvalidRequest {
                reason: "matchmaking lobbies are only joined through matchmaking".to_string(),
            }
            .into());
        }

        lobby.join(slot, player)?;
        debug!(
            "Member {} joined team {} of custom lobby {}",
            player.member_id, slot, lobby_id
        );
        Ok(())
    }

    fn leave_locked(lobbies: &mut LobbyMap, lobby_id: LobbyId, member_id: MemberId) -> Result<Departure> {
        let lobby = Self::lobby_mut(lobbies, lobby_id)?;

        if lobby.is_creator(member_id) {
            return Err(MatchmakingError::NotAuthorized {
                member_id,
                action: format!("leave lobby {} they created; cancel it instead", lobby_id),
            }
            .into());
        }

        let seat = lobby
            .seat(member_id)
            .ok_or(MatchmakingError::PlayerNotFound { member_id })?;
        lobby.leave(member_id)?;

        let lobby_removed = lobby.kind().is_matchmaking() && lobby.is_empty();
        if lobby_removed {
            lobbies.remove(&lobby_id);
            info!("Removed empty matchmaking lobby {}", lobby_id);
        }

        Ok(Departure {
            lobby_id,
            slot: seat.slot,
            lobby_removed,
        })
    }

    /// Remove a player from a lobby
    pub async fn leave(&self, lobby_id: LobbyId, member_id: MemberId) -> Result<Departure> {
        let mut lobbies = self.lobbies.lock().await;
        Self::leave_locked(&mut lobbies, lobby_id, member_id)
    }

    /// Remove a player from whichever lobby they sit in
    pub async fn leave_current(&self, member_id: MemberId) -> Result<Departure> {
        let mut lobbies = self.lobbies.lock().await;
        let lobby_id = lobbies
            .values()
            .find(|lobby| lobby.contains_member(member_id))
            .map(Lobby::id)
            .ok_or(MatchmakingError::PlayerNotFound { member_id })?;

        Self::leave_locked(&mut lobbies, lobby_id, member_id)
    }

    /// Remove a custom lobby on behalf of its creator
    pub async fn cancel_custom(&self, lobby_id: LobbyId, member_id: MemberId) -> Result<Lobby> {
        let mut lobbies = self.lobbies.lock().await;
        let lobby = Self::lobby_mut(&mut lobbies, lobby_id)?;

        if !lobby.is_creator(member_id) {
            return Err(MatchmakingError::NotAuthorized {
                member_id,
                action: format!("cancel lobby {}", lobby_id),
            }
            .into());
        }
        if lobby.state() == LobbyState::Starting {
            return Err(MatchmakingError::LobbyNotReady {
                lobby_id: lobby_id.to_string(),
                reason: "a match is being started".to_string(),
            }
            .into());
        }

        let removed = lobbies.remove(&lobby_id).ok_or_else(|| MatchmakingError::LobbyNotFound {
            lobby_id: lobby_id.to_string(),
        })?;
        info!("Custom lobby {} cancelled by member {}", lobby_id, member_id);
        Ok(removed)
    }

    /// Change map, region or match parameters of a custom lobby
    pub async fn configure_custom(
        &self,
        lobby_id: LobbyId,
        member_id: MemberId,
        map: Option<MapId>,
        region: Option<Region>,
        match_config: Option<MatchConfig>,
    ) -> Result<()> {
        let mut lobbies = self.lobbies.lock().await;
        Self::lobby_mut(&mut lobbies, lobby_id)?.configure(member_id, map, region, match_config)
    }

    /// Validate a start, mark the lobby `Starting` and build the request.
    ///
    /// The caller performs the network call without any lock and then either
    /// promotes the lobby or aborts the start.
    pub async fn begin_start(
        &self,
        lobby_id: LobbyId,
        requester: StartRequester,
        callback_url: &str,
    ) -> Result<CreateMatchRequest> {
        let mut lobbies = self.lobbies.lock().await;
        let lobby = Self::lobby_mut(&mut lobbies, lobby_id)?;

        match requester {
            StartRequester::System => {
                if !lobby.kind().is_matchmaking() || !lobby.is_full() {
                    return Err(MatchmakingError::LobbyNotReady {
                        lobby_id: lobby_id.to_string(),
                        reason: "only full matchmaking lobbies start automatically".to_string(),
                    }
                    .into());
                }
            }
            StartRequester::Member(member_id) => {
                if !lobby.is_creator(member_id) {
                    return Err(MatchmakingError::NotAuthorized {
                        member_id,
                        action: format!("start lobby {}", lobby_id),
                    }
                    .into());
                }
                lobby.ensure_startable()?;
            }
        }

        lobby.mark_starting()?;
        debug!("Lobby {} is starting", lobby_id);
        Ok(lobby.build_match_request(callback_url))
    }

    /// Return a `Starting` lobby to `Waiting`; false if it no longer exists
    pub async fn abort_start(&self, lobby_id: LobbyId) -> bool {
        let mut lobbies = self.lobbies.lock().await;
        match lobbies.get_mut(&lobby_id) {
            Some(lobby) => {
                lobby.mark_waiting();
                true
            }
            None => false,
        }
    }

    /// Move a started lobby into the match registry as one step
    pub async fn promote(
        &self,
        lobby_id: LobbyId,
        match_id: MatchId,
        status: MatchStatus,
        now: DateTime<Utc>,
    ) -> Result<MatchStarted> {
        let mut lobbies = self.lobbies.lock().await;
        let mut matches = self.matches.lock().await;

        if !lobbies.contains_key(&lobby_id) {
            return Err(MatchmakingError::LobbyNotFound {
                lobby_id: lobby_id.to_string(),
            }
            .into());
        }
        if matches.contains_key(&match_id) {
            return Err(MatchmakingError::InternalError {
                message: format!("match {} is already registered", match_id),
            }
            .into());
        }

        let mut lobby = lobbies.remove(&lobby_id).ok_or_else(|| MatchmakingError::LobbyNotFound {
            lobby_id: lobby_id.to_string(),
        })?;
        lobby.mark_started(match_id.clone(), now);

        let started = MatchStarted {
            lobby_id,
            match_id: match_id.clone(),
            league: lobby.league(),
            mode: lobby.mode(),
            map: lobby.map(),
            region: lobby.region(),
            teams: lobby.team_views(),
            timestamp: now,
        };

        MatchRegistry::insert_locked(&mut matches, Match::new(match_id, lobby, status, now))?;

        info!(
            "Lobby {} promoted to match {} ({} lobbies, {} matches)",
            lobby_id,
            started.match_id,
            lobbies.len(),
            matches.len()
        );
        Ok(started)
    }

    /// Run `f` against a lobby under the lock
    pub async fn with_lobby<R>(&self, lobby_id: LobbyId, f: impl FnOnce(&Lobby) -> R) -> Option<R> {
        self.lobbies.lock().await.get(&lobby_id).map(f)
    }

    /// Where a member sits, if anywhere
    pub async fn find_member(&self, member_id: MemberId) -> Option<(LobbyId, Seat)> {
        self.lobbies
            .lock()
            .await
            .values()
            .find_map(|lobby| lobby.seat(member_id).map(|seat| (lobby.id(), seat)))
    }

    /// Owned copies of every lobby
    pub async fn snapshot(&self) -> Vec<Lobby> {
        self.lobbies.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.lobbies.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lobbies.lock().await.is_empty()
    }

    /// Players seated across all lobbies
    pub async fn player_count(&self) -> usize {
        self.lobbies
            .lock()
            .await
            .values()
            .map(Lobby::player_count)
            .sum()
    }
}
