//! Lobby manager coordinating lobbies, matches and their collaborators
//!
//! This module provides the `LobbyManager` that turns player requests into
//! registry operations, hands full lobbies to the match service and reconciles
//! finished or abandoned matches with the persistence store.

use crate::error::{error_kind, ErrorKind, MatchmakingError, Result};
use crate::events::EventPublisher;
use crate::lobby::instance::{LobbyTemplate, LobbyState, SettleOutcome};
use crate::lobby::registry::{Departure, LobbyRegistry, Placement, StartRequester};
use crate::match_service::{MatchInfo, MatchServiceClient};
use crate::matches::{AbandonReason, Match, MatchRegistry};
use crate::metrics::MetricsCollector;
use crate::rating::RatingEngine;
use crate::store::PersistenceStore;
use crate::types::{
    GameMode, League, LobbyChange, LobbyId, LobbyUpdated, MapId, MatchAbandoned, MatchConfig,
    MatchFailed, MatchFinished, MatchStarted, MatchStatus, MemberId, PlayerProfile, Region,
    SearchCriteria, TeamSlot,
};
use crate::utils::current_timestamp;
use std::sync::{Arc, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Notice sent when a match ends without results
pub const ABANDONED_MESSAGE: &str = "Match has been abandoned. Stats will not be tracked.";

/// Notice sent when a finished match could not be recorded
pub const FAILURE_MESSAGE: &str =
    "Something went wrong with the match. The results could not be recorded.";

/// Statistics about lobby manager operations
#[derive(Debug, Clone, Default)]
pub struct LobbyManagerStats {
    /// Total number of lobbies created
    pub lobbies_created: u64,
    /// Total number of matchmaking requests
    pub players_queued: u64,
    /// Total number of matches started
    pub matches_started: u64,
    /// Total number of matches settled
    pub matches_finished: u64,
    /// Total number of matches abandoned
    pub matches_abandoned: u64,
    /// Total number of matches whose reconciliation failed
    pub matches_failed: u64,
    /// Total number of rejected start attempts
    pub start_failures: u64,
    /// Current number of waiting lobbies
    pub active_lobbies: usize,
    /// Current number of tracked matches
    pub active_matches: usize,
    /// Current number of players seated in lobbies
    pub players_waiting: usize,
}

/// What happened to a match description delivered by the match service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Results were recorded
    Finished { summary: String },
    /// The match was dropped without results
    Abandoned,
    /// A non-terminal status was stored; the match stays tracked
    StatusRecorded(MatchStatus),
    /// The match is not tracked (already handled or from an earlier run)
    UnknownMatch,
    /// Reconciliation failed and a failure notice was published
    Failed { message: String },
}

impl CallbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackOutcome::Finished { .. } => "finished",
            CallbackOutcome::Abandoned => "abandoned",
            CallbackOutcome::StatusRecorded(_) => "status_recorded",
            CallbackOutcome::UnknownMatch => "unknown_match",
            CallbackOutcome::Failed { .. } => "failed",
        }
    }
}

/// The main lobby manager
#[derive(Clone)]
pub struct LobbyManager {
    /// Waiting lobbies
    lobbies: LobbyRegistry,
    /// Started matches
    matches: MatchRegistry,
    /// External match service
    match_service: Arc<dyn MatchServiceClient>,
    /// Player, rating and history storage
    store: Arc<dyn PersistenceStore>,
    /// Event publisher for lifecycle notifications
    event_publisher: Arc<dyn EventPublisher>,
    /// Rating adjustments
    rating_engine: RatingEngine,
    /// Manager statistics
    stats: Arc<RwLock<LobbyManagerStats>>,
    /// Metrics collector for recording performance data
    metrics_collector: Arc<MetricsCollector>,
    /// URL the match service reports results to
    callback_url: String,
    /// Maps used when a search names none
    default_map_pool: Vec<MapId>,
}

impl LobbyManager {
    /// Create a new lobby manager
    pub fn new(
        match_service: Arc<dyn MatchServiceClient>,
        store: Arc<dyn PersistenceStore>,
        event_publisher: Arc<dyn EventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
        rating_engine: RatingEngine,
        callback_url: impl Into<String>,
    ) -> Self {
        let matches = MatchRegistry::new();
        Self {
            lobbies: LobbyRegistry::new(matches.clone(), rating_engine),
            matches,
            match_service,
            store,
            event_publisher,
            rating_engine,
            stats: Arc::new(RwLock::new(LobbyManagerStats::default())),
            metrics_collector,
            callback_url: callback_url.into(),
            default_map_pool: Vec::new(),
        }
    }

    /// Use `pool` for searches that do not name any map
    pub fn with_default_map_pool(mut self, pool: Vec<MapId>) -> Self {
        self.default_map_pool = pool;
        self
    }

    pub fn lobbies(&self) -> &LobbyRegistry {
        &self.lobbies
    }

    pub fn matches(&self) -> &MatchRegistry {
        &self.matches
    }

    pub fn match_service(&self) -> Arc<dyn MatchServiceClient> {
        self.match_service.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    fn update_stats(&self, update: impl FnOnce(&mut LobbyManagerStats)) -> Result<()> {
        let mut stats = self
            .stats
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
        update(&mut stats);
        Ok(())
    }

    async fn load_profile(&self, member_id: MemberId, league: League) -> Result<PlayerProfile> {
        self.store
            .get_player(member_id, league)
            .await?
            .ok_or_else(|| MatchmakingError::NotRegistered { member_id }.into())
    }

    async fn load_template(&self, league: League) -> Result<LobbyTemplate> {
        Ok(LobbyTemplate {
            team_size: self.store.get_team_size(league).await?,
            match_config: self.store.get_match_config(league).await?,
        })
    }

    async fn lobby_event(&self, lobby_id: LobbyId, change: LobbyChange) -> Option<LobbyUpdated> {
        let event = self
            .lobbies
            .with_lobby(lobby_id, |lobby| lobby.updated_event(change))
            .await;
        if event.is_none() {
            debug!("Lobby {} is gone, skipping update notification", lobby_id);
        }
        event
    }

    async fn publish_lobby_event(&self, event: LobbyUpdated) {
        let lobby_id = event.lobby_id;
        if let Err(e) = self.event_publisher.publish_lobby_updated(event).await {
            warn!("Failed to publish update for lobby {}: {}", lobby_id, e);
        }
    }

    async fn publish_lobby_update(&self, lobby_id: LobbyId, change: LobbyChange) {
        if let Some(event) = self.lobby_event(lobby_id, change).await {
            self.publish_lobby_event(event).await;
        }
    }

    /// Place a player through matchmaking, starting the lobby once it is full
    pub async fn find_match(&self, member_id: MemberId, mut criteria: SearchCriteria) -> Result<Placement> {
        let start_time = Instant::now();
        if criteria.map_pool.is_empty() {
            criteria.map_pool = self.default_map_pool.clone();
        }

        info!(
            "Processing matchmaking request - member_id: {}, league: {}, mode: {}, region: {}, maps: {:?}",
            member_id, criteria.league, criteria.mode, criteria.region, criteria.map_pool
        );

        if criteria.league == League::Custom {
            return Err(MatchmakingError::InvalidRequest {
                reason: "the custom league is only played in custom lobbies".to_string(),
            }
            .into());
        }

        let player = self.load_profile(member_id, criteria.league).await?;
        let template = self.load_template(criteria.league).await?;
        let placement = self.lobbies.find_or_create(&criteria, &player, template).await?;

        self.update_stats(|stats| {
            stats.players_queued += 1;
            if placement.created {
                stats.lobbies_created += 1;
            }
        })?;
        if placement.created {
            self.metrics_collector.record_lobby_created(false);
        }

        let change = if placement.created {
            LobbyChange::Created
        } else {
            LobbyChange::PlayerJoined {
                member_id,
                slot: placement.slot,
            }
        };
        // Snapshot the seat change now; a started lobby leaves the registry
        let event = self.lobby_event(placement.lobby_id, change).await;

        if placement.full {
            info!("Lobby {} is full, starting match", placement.lobby_id);
            if let Err(e) = self
                .start_lobby(placement.lobby_id, StartRequester::System)
                .await
            {
                warn!(
                    "Lobby {} could not be started and stays open: {}",
                    placement.lobby_id, e
                );
            }
        }
        if let Some(event) = event {
            self.publish_lobby_event(event).await;
        }

        self.metrics_collector.record_queue_request(
            criteria.league,
            criteria.mode,
            start_time.elapsed(),
        );
        Ok(placement)
    }

    /// Create a custom lobby owned by `member_id`
    pub async fn create_custom_lobby(
        &self,
        member_id: MemberId,
        league: League,
        mode: GameMode,
        map: MapId,
        region: Region,
    ) -> Result<LobbyId> {
        let creator = self.load_profile(member_id, league).await?;
        let template = self.load_template(league).await?;

        let lobby_id = self
            .lobbies
            .create_custom(&creator, league, mode, map, region, template)
            .await?;

        self.update_stats(|stats| stats.lobbies_created += 1)?;
        self.metrics_collector.record_lobby_created(true);
        self.publish_lobby_update(lobby_id, LobbyChange::Created).await;
        Ok(lobby_id)
    }

    /// Join a custom lobby at `slot`
    pub async fn join_custom(&self, member_id: MemberId, lobby_id: LobbyId, slot: TeamSlot) -> Result<()> {
        let start_time = Instant::now();
        let league = self
            .lobbies
            .with_lobby(lobby_id, |lobby| lobby.league())
            .await
            .ok_or_else(|| MatchmakingError::LobbyNotFound {
                lobby_id: lobby_id.to_string(),
            })?;

        let player = self.load_profile(member_id, league).await?;
        self.lobbies.join_custom(lobby_id, slot, &player).await?;

        self.publish_lobby_update(lobby_id, LobbyChange::PlayerJoined { member_id, slot })
            .await;
        self.metrics_collector
            .record_lobby_operation("join_custom", start_time.elapsed());
        Ok(())
    }

    async fn after_departure(&self, member_id: MemberId, departure: &Departure) {
        info!(
            "Member {} left team {} of lobby {} (lobby removed: {})",
            member_id, departure.slot, departure.lobby_id, departure.lobby_removed
        );
        if !departure.lobby_removed {
            self.publish_lobby_update(departure.lobby_id, LobbyChange::PlayerLeft { member_id })
                .await;
        }
    }

    /// Leave a specific lobby
    pub async fn leave(&self, member_id: MemberId, lobby_id: LobbyId) -> Result<Departure> {
        let departure = self.lobbies.leave(lobby_id, member_id).await?;
        self.after_departure(member_id, &departure).await;
        Ok(departure)
    }

    /// Leave whichever lobby the member sits in.
    ///
    /// A creator leaving this way cancels their custom lobby.
    pub async fn leave_current(&self, member_id: MemberId) -> Result<Departure> {
        if let Some((lobby_id, seat)) = self.lobbies.find_member(member_id).await {
            let is_creator = self
                .lobbies
                .with_lobby(lobby_id, |lobby| lobby.is_creator(member_id))
                .await
                .unwrap_or(false);
            if is_creator {
                self.cancel_custom(member_id, lobby_id).await?;
                return Ok(Departure {
                    lobby_id,
                    slot: seat.slot,
                    lobby_removed: true,
                });
            }
        }

        let departure = self.lobbies.leave_current(member_id).await?;
        self.after_departure(member_id, &departure).await;
        Ok(departure)
    }

    /// Start a custom lobby on behalf of its creator
    pub async fn start_custom(&self, member_id: MemberId, lobby_id: LobbyId) -> Result<MatchStarted> {
        self.start_lobby(lobby_id, StartRequester::Member(member_id))
            .await
    }

    /// Cancel a custom lobby on behalf of its creator
    pub async fn cancel_custom(&self, member_id: MemberId, lobby_id: LobbyId) -> Result<()> {
        let lobby = self.lobbies.cancel_custom(lobby_id, member_id).await?;

        self.metrics_collector.record_lobby_cancelled();
        if let Err(e) = self
            .event_publisher
            .publish_lobby_updated(lobby.updated_event(LobbyChange::Cancelled))
            .await
        {
            warn!("Failed to publish cancellation of lobby {}: {}", lobby_id, e);
        }
        Ok(())
    }

    /// Change map, region or match parameters of a custom lobby
    pub async fn configure_custom(
        &self,
        member_id: MemberId,
        lobby_id: LobbyId,
        map: Option<MapId>,
        region: Option<Region>,
        match_config: Option<MatchConfig>,
    ) -> Result<()> {
        self.lobbies
            .configure_custom(lobby_id, member_id, map, region, match_config)
            .await?;
        self.publish_lobby_update(lobby_id, LobbyChange::Configured)
            .await;
        Ok(())
    }

    /// Hand a lobby to the match service and move it into the match registry.
    ///
    /// No lock is held while the match service is called. A failed call puts
    /// the lobby back into `Waiting` so the start can be retried.
    pub async fn start_lobby(&self, lobby_id: LobbyId, requester: StartRequester) -> Result<MatchStarted> {
        let request = self
            .lobbies
            .begin_start(lobby_id, requester, &self.callback_url)
            .await?;

        let timer = self.metrics_collector.start_timer();
        let created = self.match_service.create_match(request).await;
        self.metrics_collector
            .record_match_service_call("create_match", created.is_ok(), timer.stop());

        let info = match created {
            Ok(info) => info,
            Err(e) => {
                self.lobbies.abort_start(lobby_id).await;
                self.update_stats(|stats| stats.start_failures += 1)?;
                self.metrics_collector.record_start_failure();

                warn!("Match service refused lobby {}: {}", lobby_id, e);
                self.publish_lobby_update(
                    lobby_id,
                    LobbyChange::StartFailed {
                        reason: e.to_string(),
                    },
                )
                .await;

                return Err(if error_kind(&e) == ErrorKind::ServiceUnavailable {
                    e
                } else {
                    MatchmakingError::ServiceUnavailable {
                        message: e.to_string(),
                    }
                    .into()
                });
            }
        };

        let started = match self
            .lobbies
            .promote(lobby_id, info.match_id.clone(), info.status, current_timestamp())
            .await
        {
            Ok(started) => started,
            Err(e) => {
                error!(
                    "Match {} was created but lobby {} could not be promoted: {}",
                    info.match_id, lobby_id, e
                );
                self.lobbies.abort_start(lobby_id).await;
                return Err(e);
            }
        };

        self.update_stats(|stats| stats.matches_started += 1)?;
        self.metrics_collector.record_match_started(started.league);

        info!(
            "Match {} started from lobby {} - league: {}, mode: {}, map: {}, region: {}",
            started.match_id, lobby_id, started.league, started.mode, started.map, started.region
        );
        for team in &started.teams {
            info!(
                "  Team {}: {} players, average rating {}",
                team.slot,
                team.players.len(),
                team.average_rating
            );
        }

        if let Err(e) = self
            .event_publisher
            .publish_match_started(started.clone())
            .await
        {
            warn!("Failed to publish start of match {}: {}", started.match_id, e);
        }
        Ok(started)
    }

    /// Retry every full matchmaking lobby still waiting to be started
    pub async fn start_ready_lobbies(&self) -> usize {
        let ready: Vec<LobbyId> = self
            .lobbies
            .snapshot()
            .await
            .into_iter()
            .filter(|lobby| {
                lobby.kind().is_matchmaking()
                    && lobby.state() == LobbyState::Waiting
                    && lobby.is_full()
            })
            .map(|lobby| lobby.id())
            .collect();

        let mut started = 0;
        for lobby_id in ready {
            match self.start_lobby(lobby_id, StartRequester::System).await {
                Ok(_) => started += 1,
                Err(e) => debug!("Lobby {} still cannot be started: {}", lobby_id, e),
            }
        }
        started
    }

    /// Apply a match description pushed by (or polled from) the match service
    pub async fn handle_match_update(&self, info: MatchInfo) -> CallbackOutcome {
        let outcome = match info.status {
            MatchStatus::Complete => match self.matches.remove(&info.match_id).await {
                Some(m) => self.finish_match(m, &info).await,
                None => CallbackOutcome::UnknownMatch,
            },
            MatchStatus::Cancelled => match self.matches.remove(&info.match_id).await {
                Some(m) => self.abandon_match(m, AbandonReason::Cancelled).await,
                None => CallbackOutcome::UnknownMatch,
            },
            status @ (MatchStatus::Pending | MatchStatus::Running) => {
                if self.matches.update_status(&info.match_id, status).await {
                    CallbackOutcome::StatusRecorded(status)
                } else {
                    CallbackOutcome::UnknownMatch
                }
            }
        };

        debug!(
            "Match {} update ({}) handled: {}",
            info.match_id,
            info.status,
            outcome.as_str()
        );
        outcome
    }

    /// Settle a match already removed from the registry.
    ///
    /// Failures are logged and published as a failure notice; nothing is
    /// rolled back.
    pub async fn finish_match(&self, m: Match, info: &MatchInfo) -> CallbackOutcome {
        let match_id = m.match_id().to_string();
        match self.record_results(m, info).await {
            Ok(summary) => CallbackOutcome::Finished { summary },
            Err(e) => {
                error!("Failed to finish match {}: {:#}", match_id, e);
                self.report_failure(&match_id).await;
                CallbackOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn record_results(&self, m: Match, info: &MatchInfo) -> Result<String> {
        let match_id = m.match_id().to_string();
        let mut lobby = m.into_lobby();

        let settlement = match lobby.settle(info, &self.rating_engine)? {
            SettleOutcome::Settled(settlement) => settlement,
            SettleOutcome::NotComplete(status) => {
                return Err(MatchmakingError::InvalidRequest {
                    reason: format!("match {} is not complete yet ({})", match_id, status),
                }
                .into())
            }
        };

        self.store
            .record_settlement(
                &settlement.changes,
                settlement.record,
                &settlement.participants,
            )
            .await
            .map_err(|e| MatchmakingError::PersistenceFailure {
                message: format!("results of match {}: {}", match_id, e),
            })?;

        let deltas: Vec<i64> = settlement
            .changes
            .iter()
            .map(|change| change.rating_delta)
            .collect();
        self.metrics_collector
            .record_match_finished(lobby.league(), &deltas);
        self.update_stats(|stats| stats.matches_finished += 1)?;

        info!(
            "Match {} finished: {} ({} players updated)",
            match_id,
            settlement.summary,
            settlement.changes.len()
        );

        let event = MatchFinished {
            match_id: match_id.clone(),
            summary: settlement.summary.clone(),
            winner: settlement.winner,
            changes: settlement.changes,
            teams: lobby.team_views(),
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.event_publisher.publish_match_finished(event).await {
            warn!("Failed to publish results of match {}: {}", match_id, e);
        }

        Ok(settlement.summary)
    }

    /// Drop a match already removed from the registry without touching ratings
    pub async fn abandon_match(&self, m: Match, reason: AbandonReason) -> CallbackOutcome {
        let match_id = m.match_id().to_string();
        let teams = m.team_snapshot().to_vec();
        let lobby = m.into_lobby();

        let record = lobby.cancellation_record(match_id.clone(), Some(reason.to_string()));
        if let Err(e) = self
            .store
            .insert_match_history(record, &lobby.participants())
            .await
        {
            error!("Failed to record abandoned match {}: {:#}", match_id, e);
            self.report_failure(&match_id).await;
            return CallbackOutcome::Failed {
                message: e.to_string(),
            };
        }

        if let Err(e) = self.update_stats(|stats| stats.matches_abandoned += 1) {
            warn!("{}", e);
        }
        self.metrics_collector.record_match_abandoned(reason.as_str());
        info!("Match {} abandoned ({})", match_id, reason);

        let event = MatchAbandoned {
            match_id: match_id.clone(),
            lobby_id: lobby.id(),
            reason: ABANDONED_MESSAGE.to_string(),
            teams,
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.event_publisher.publish_match_abandoned(event).await {
            warn!("Failed to publish abandonment of match {}: {}", match_id, e);
        }
        CallbackOutcome::Abandoned
    }

    async fn report_failure(&self, match_id: &str) {
        if let Err(e) = self.update_stats(|stats| stats.matches_failed += 1) {
            warn!("{}", e);
        }
        self.metrics_collector.record_match_failed();

        let event = MatchFailed {
            match_id: match_id.to_string(),
            message: FAILURE_MESSAGE.to_string(),
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.event_publisher.publish_match_failed(event).await {
            warn!("Failed to publish failure notice for match {}: {}", match_id, e);
        }
    }

    /// Get current manager statistics
    pub async fn get_stats(&self) -> Result<LobbyManagerStats> {
        let mut snapshot = self
            .stats
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?
            .clone();

        snapshot.active_lobbies = self.lobbies.len().await;
        snapshot.players_waiting = self.lobbies.player_count().await;
        snapshot.active_matches = self.matches.len().await;

        self.metrics_collector.update_from_lobby_stats(&snapshot);
        Ok(snapshot)
    }
}
