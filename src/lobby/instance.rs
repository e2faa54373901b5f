//! Lobby model and lifecycle
//!
//! A lobby holds two competitive teams (plus spectators for custom lobbies)
//! while players assemble. Every mutation keeps the member index and the team
//! rosters consistent; nothing here performs I/O, so the registry can run all of
//! it under its lock.

use crate::error::{MatchmakingError, Result};
use crate::lobby::team::{LobbyPlayer, Team};
use crate::match_service::{CreateMatchRequest, MatchInfo, TeamRoster};
use crate::rating::RatingEngine;
use crate::store::{MatchRecord, PlayerRecord, StatsChange, TeamRecord};
use crate::types::{
    GameMode, League, LobbyChange, LobbyId, LobbyUpdated, MapId, MatchConfig, MatchId,
    MatchStatus, MemberId, PlayerProfile, Region, TeamSlot, TeamView, UserId,
};
use crate::utils::{current_timestamp, generate_lobby_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// How a lobby came to exist, and who controls it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyKind {
    /// Created by the matchmaker, started automatically once full
    Matchmaking,
    /// Created by a member, started and cancelled only by them
    Custom { creator: MemberId },
}

impl LobbyKind {
    pub fn is_matchmaking(&self) -> bool {
        matches!(self, LobbyKind::Matchmaking)
    }

    pub fn creator(&self) -> Option<MemberId> {
        match self {
            LobbyKind::Matchmaking => None,
            LobbyKind::Custom { creator } => Some(*creator),
        }
    }

    /// Only custom lobbies have a spectator slot
    pub fn has_spectators(&self) -> bool {
        matches!(self, LobbyKind::Custom { .. })
    }
}

/// Possible states of a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyState {
    /// Accepting joins and leaves
    Waiting,
    /// A create-match request is in flight
    Starting,
}

/// Where a member sits inside a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub user_id: UserId,
    pub slot: TeamSlot,
}

/// League-derived parameters a lobby is created with
#[derive(Debug, Clone, PartialEq)]
pub struct LobbyTemplate {
    pub team_size: Option<usize>,
    pub match_config: MatchConfig,
}

/// Result of applying a match outcome to a lobby
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// The outcome was not `complete`; nothing changed
    NotComplete(MatchStatus),
    Settled(Settlement),
}

/// Everything produced by settling a completed match
#[derive(Debug, Clone)]
pub struct Settlement {
    pub summary: String,
    /// `None` on a draw
    pub winner: Option<TeamSlot>,
    pub changes: Vec<StatsChange>,
    pub record: MatchRecord,
    pub participants: Vec<UserId>,
}

/// Concrete lobby instance
#[derive(Debug, Clone)]
pub struct Lobby {
    id: LobbyId,
    kind: LobbyKind,
    league: League,
    mode: GameMode,
    map: MapId,
    region: Region,
    team_size: Option<usize>,
    match_config: MatchConfig,
    teams: [Team; 3],
    player_index: HashMap<MemberId, Seat>,
    state: LobbyState,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    match_id: Option<MatchId>,
    last_winner: Option<TeamSlot>,
}

impl Lobby {
    /// Create an empty lobby
    pub fn new(
        kind: LobbyKind,
        league: League,
        mode: GameMode,
        map: MapId,
        region: Region,
        template: LobbyTemplate,
    ) -> Self {
        Self::with_id(generate_lobby_id(), kind, league, mode, map, region, template)
    }

    /// Create an empty lobby with a specific ID
    pub fn with_id(
        id: LobbyId,
        kind: LobbyKind,
        league: League,
        mode: GameMode,
        map: MapId,
        region: Region,
        template: LobbyTemplate,
    ) -> Self {
        Self {
            id,
            kind,
            league,
            mode,
            map,
            region,
            team_size: template.team_size,
            match_config: template.match_config,
            teams: [
                Team::new(TeamSlot::A),
                Team::new(TeamSlot::B),
                Team::new(TeamSlot::Spectators),
            ],
            player_index: HashMap::new(),
            state: LobbyState::Waiting,
            created_at: current_timestamp(),
            started_at: None,
            match_id: None,
            last_winner: None,
        }
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn kind(&self) -> LobbyKind {
        self.kind
    }

    pub fn league(&self) -> League {
        self.league
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn map(&self) -> MapId {
        self.map
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn team_size(&self) -> Option<usize> {
        self.team_size
    }

    pub fn match_config(&self) -> &MatchConfig {
        &self.match_config
    }

    pub fn state(&self) -> LobbyState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn match_id(&self) -> Option<&str> {
        self.match_id.as_deref()
    }

    pub fn last_winner(&self) -> Option<TeamSlot> {
        self.last_winner
    }

    pub fn team(&self, slot: TeamSlot) -> &Team {
        &self.teams[slot.index()]
    }

    pub fn teams(&self) -> &[Team; 3] {
        &self.teams
    }

    pub fn seat(&self, member_id: MemberId) -> Option<Seat> {
        self.player_index.get(&member_id).copied()
    }

    pub fn contains_member(&self, member_id: MemberId) -> bool {
        self.player_index.contains_key(&member_id)
    }

    pub fn member_ids(&self) -> impl Iterator<Item = MemberId> + '_ {
        self.player_index.keys().copied()
    }

    /// Number of seated players, spectators included
    pub fn player_count(&self) -> usize {
        self.player_index.len()
    }

    /// Both competitive teams hold exactly `team_size` players
    pub fn is_full(&self) -> bool {
        match self.team_size {
            Some(size) => TeamSlot::COMPETITIVE
                .iter()
                .all(|slot| self.team(*slot).len() == size),
            None => false,
        }
    }

    /// Both competitive teams are empty
    pub fn is_empty(&self) -> bool {
        TeamSlot::COMPETITIVE
            .iter()
            .all(|slot| self.team(*slot).is_empty())
    }

    /// Whether another player fits into `slot`
    pub fn is_team_joinable(&self, slot: TeamSlot) -> bool {
        match (slot, self.team_size) {
            (TeamSlot::Spectators, _) => self.kind.has_spectators(),
            (_, None) => true,
            (_, Some(size)) => self.team(slot).len() < size,
        }
    }

    fn ensure_waiting(&self) -> Result<()> {
        if self.state == LobbyState::Starting {
            return Err(MatchmakingError::LobbyNotReady {
                lobby_id: self.id.to_string(),
                reason: "a match is being started".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Seat a player, moving them if they already sit elsewhere in this lobby
    pub fn join(&mut self, slot: TeamSlot, profile: &PlayerProfile) -> Result<()> {
        self.ensure_waiting()?;

        if slot == TeamSlot::Spectators && !self.kind.has_spectators() {
            return Err(MatchmakingError::InvalidRequest {
                reason: "matchmaking lobbies have no spectator slot".to_string(),
            }
            .into());
        }

        let current = self.seat(profile.member_id);
        if current.map(|seat| seat.slot) == Some(slot) {
            return Ok(());
        }

        if !self.is_team_joinable(slot) {
            return Err(MatchmakingError::TeamFull {
                lobby_id: self.id.to_string(),
                team: slot.to_string(),
            }
            .into());
        }

        let user_taken = self
            .teams
            .iter()
            .any(|team| team.contains(profile.user_id));
        if current.is_none() && user_taken {
            return Err(MatchmakingError::AlreadySeated {
                member_id: profile.member_id,
                container: format!("lobby {}", self.id),
            }
            .into());
        }

        if let Some(seat) = current {
            self.teams[seat.slot.index()].remove(seat.user_id);
        }

        self.teams[slot.index()].insert(LobbyPlayer::from_profile(profile));
        self.player_index.insert(
            profile.member_id,
            Seat {
                user_id: profile.user_id,
                slot,
            },
        );

        debug!(
            "Seated member {} in team {} of lobby {} ({} players)",
            profile.member_id,
            slot,
            self.id,
            self.player_count()
        );
        Ok(())
    }

    /// Remove a player from whichever team they sit in
    pub fn leave(&mut self, member_id: MemberId) -> Result<LobbyPlayer> {
        self.ensure_waiting()?;

        let seat = self
            .player_index
            .remove(&member_id)
            .ok_or(MatchmakingError::PlayerNotFound { member_id })?;

        self.teams[seat.slot.index()]
            .remove(seat.user_id)
            .ok_or_else(|| {
                MatchmakingError::InternalError {
                    message: format!(
                        "member {} indexed in team {} of lobby {} but not seated",
                        member_id, seat.slot, self.id
                    ),
                }
                .into()
            })
    }

    /// Whether `member_id` created this lobby
    pub fn is_creator(&self, member_id: MemberId) -> bool {
        self.kind.creator() == Some(member_id)
    }

    /// Check that a custom lobby may be started
    pub fn ensure_startable(&self) -> Result<()> {
        self.ensure_waiting()?;

        let reason = if TeamSlot::COMPETITIVE
            .iter()
            .any(|slot| self.team(*slot).is_empty())
        {
            Some("both teams need at least one player")
        } else if self.team_size.is_some() && !self.is_full() {
            Some("both teams must be full")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(MatchmakingError::LobbyNotReady {
                lobby_id: self.id.to_string(),
                reason: reason.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Change map, region or match parameters of a custom lobby
    pub fn configure(
        &mut self,
        member_id: MemberId,
        map: Option<MapId>,
        region: Option<Region>,
        match_config: Option<MatchConfig>,
    ) -> Result<()> {
        if !self.is_creator(member_id) {
            return Err(MatchmakingError::NotAuthorized {
                member_id,
                action: format!("configure lobby {}", self.id),
            }
            .into());
        }
        self.ensure_waiting()?;

        if match_config.is_some() && self.mode == GameMode::Competitive {
            return Err(MatchmakingError::InvalidRequest {
                reason: "match parameters are fixed in competitive lobbies".to_string(),
            }
            .into());
        }

        if let Some(map) = map {
            self.map = map;
        }
        if let Some(region) = region {
            self.region = region;
        }
        if let Some(config) = match_config {
            self.match_config = config;
        }
        Ok(())
    }

    pub(crate) fn mark_starting(&mut self) -> Result<()> {
        self.ensure_waiting()?;
        self.state = LobbyState::Starting;
        Ok(())
    }

    pub(crate) fn mark_waiting(&mut self) {
        self.state = LobbyState::Waiting;
    }

    /// Record the external match id once the match service accepted the lobby
    pub(crate) fn mark_started(&mut self, match_id: MatchId, now: DateTime<Utc>) {
        self.match_id = Some(match_id);
        self.started_at = Some(now);
        self.last_winner = None;
        self.state = LobbyState::Waiting;
    }

    /// Build the create-match request for the current roster
    pub fn build_match_request(&self, callback_url: &str) -> CreateMatchRequest {
        let mut teams: Vec<TeamRoster> = TeamSlot::COMPETITIVE
            .iter()
            .map(|slot| TeamRoster::from_accounts(self.team(*slot).user_ids()))
            .collect();

        let spectators = self.team(TeamSlot::Spectators);
        if !spectators.is_empty() {
            teams.push(TeamRoster::from_accounts(spectators.user_ids()));
        }

        CreateMatchRequest {
            config: self.match_config.clone(),
            map_id: self.map,
            region: self.region,
            teams,
            callback_url: callback_url.to_string(),
        }
    }

    /// User ids of every seated player
    pub fn participants(&self) -> Vec<UserId> {
        self.teams.iter().flat_map(Team::user_ids).collect()
    }

    pub fn team_views(&self) -> Vec<TeamView> {
        self.teams
            .iter()
            .filter(|team| team.slot().is_competitive() || !team.is_empty())
            .map(Team::view)
            .collect()
    }

    /// Notification describing the lobby after `change`
    pub fn updated_event(&self, change: LobbyChange) -> LobbyUpdated {
        LobbyUpdated {
            lobby_id: self.id,
            league: self.league,
            mode: self.mode,
            map: self.map,
            region: self.region,
            change,
            teams: self.team_views(),
            timestamp: current_timestamp(),
        }
    }

    /// Apply a completed match outcome to the roster.
    ///
    /// Lower placement wins, equal placements draw. Ratings move only for
    /// competitive, decided matches and always against the opposing team's
    /// pre-match average.
    pub fn settle(&mut self, outcome: &MatchInfo, engine: &RatingEngine) -> Result<SettleOutcome> {
        if outcome.status != MatchStatus::Complete {
            return Ok(SettleOutcome::NotComplete(outcome.status));
        }

        let (placement_a, placement_b) = match (outcome.placement(0), outcome.placement(1)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(MatchmakingError::InvalidRequest {
                    reason: format!(
                        "match {} is complete but does not report both placements",
                        outcome.match_id
                    ),
                }
                .into())
            }
        };

        let draw = placement_a == placement_b;
        let winner = if draw {
            None
        } else if placement_a < placement_b {
            Some(TeamSlot::A)
        } else {
            Some(TeamSlot::B)
        };
        let rated = self.mode == GameMode::Competitive && !draw;

        let pre_match_averages = [
            self.team(TeamSlot::A).average_rating(),
            self.team(TeamSlot::B).average_rating(),
        ];

        let mut changes = Vec::new();
        for slot in TeamSlot::COMPETITIVE {
            let opponent_average = slot
                .opponent()
                .map(|opponent| pre_match_averages[opponent.index()])
                .unwrap_or_default();
            let won = winner == Some(slot);

            for reported in &outcome.teams[slot.index()].players {
                let Some(user_id) = reported.user_id() else {
                    warn!(
                        "Match {} reported an unreadable account {:?}",
                        outcome.match_id, reported.account
                    );
                    continue;
                };
                let Some(player) = self.teams[slot.index()].get_mut(user_id) else {
                    warn!(
                        "Match {} reported user {} who is not in team {} of lobby {}",
                        outcome.match_id, user_id, slot, self.id
                    );
                    continue;
                };

                let stats = reported.stats.clone().unwrap_or_default();
                player.kills += stats.kills;
                player.deaths += stats.deaths;
                player.assists += stats.assists;

                let rating_delta = if rated {
                    engine.rating_delta(player.rating, opponent_average, won)
                } else {
                    0
                };
                player.rating += rating_delta;

                changes.push(StatsChange {
                    user_id,
                    league: self.league,
                    won: !draw && won,
                    lost: !draw && !won,
                    draw,
                    kills: stats.kills,
                    deaths: stats.deaths,
                    assists: stats.assists,
                    rating_delta,
                });
            }
        }

        for team in self.teams.iter_mut() {
            team.recompute_average();
        }
        self.last_winner = winner;

        let summary = match winner {
            Some(slot) => format!("Team {} is the winner!", slot),
            None => "Draw!".to_string(),
        };

        let record = self.history_record(
            outcome.match_id.clone(),
            MatchStatus::Complete,
            |slot| outcome.placement(slot.index()),
            |slot, user_id| {
                outcome
                    .teams
                    .get(slot.index())
                    .and_then(|team| team.players.iter().find(|p| p.user_id() == Some(user_id)))
                    .and_then(|p| p.stats.as_ref())
                    .and_then(|stats| stats.score)
            },
            None,
        );

        Ok(SettleOutcome::Settled(Settlement {
            summary,
            winner,
            changes,
            record,
            participants: self.participants(),
        }))
    }

    /// History record for a match dropped without results
    pub fn cancellation_record(&self, match_id: MatchId, comment: Option<String>) -> MatchRecord {
        self.history_record(match_id, MatchStatus::Cancelled, |_| None, |_, _| None, comment)
    }

    fn history_record<P, S>(
        &self,
        match_id: MatchId,
        status: MatchStatus,
        placement: P,
        score: S,
        comment: Option<String>,
    ) -> MatchRecord
    where
        P: Fn(TeamSlot) -> Option<u32>,
        S: Fn(TeamSlot, UserId) -> Option<i64>,
    {
        let competitive = self.mode == GameMode::Competitive;
        let teams = self
            .teams
            .iter()
            .filter(|team| team.slot().is_competitive() || !team.is_empty())
            .map(|team| TeamRecord {
                placement: placement(team.slot()),
                players: team
                    .players()
                    .map(|player| PlayerRecord {
                        user_id: player.user_id,
                        display_name: player.display_name.clone(),
                        kills: player.kills,
                        deaths: player.deaths,
                        assists: player.assists,
                        score: score(team.slot(), player.user_id),
                        rating: competitive.then_some(player.rating),
                    })
                    .collect(),
            })
            .collect();

        MatchRecord {
            match_id,
            league: self.league,
            mode: self.mode,
            status,
            config: self.match_config.clone(),
            teams,
            map: self.map,
            region: self.region,
            comment,
            created_at: self.started_at.unwrap_or_else(current_timestamp),
        }
    }
}
