//! In-memory persistence store
//!
//! Backs the service when no external database is wired in, and every test.

use crate::config::{LeagueSettings, RatingConfig};
use crate::error::{MatchmakingError, Result};
use crate::store::{MatchRecord, PersistenceStore, PlayerStats, StatsChange};
use crate::types::{League, MatchConfig, MemberId, PlayerProfile, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct RegisteredPlayer {
    user_id: UserId,
    display_name: String,
}

/// A match record together with its participants
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub record: MatchRecord,
    pub participants: Vec<UserId>,
}

#[derive(Debug, Default)]
struct StoreState {
    players: HashMap<MemberId, RegisteredPlayer>,
    stats: HashMap<(UserId, League), PlayerStats>,
    leagues: HashMap<League, LeagueSettings>,
    history: Vec<HistoryEntry>,
}

impl StoreState {
    fn check_stats(&self, changes: &[StatsChange]) -> Result<()> {
        match changes
            .iter()
            .find(|change| !self.stats.contains_key(&(change.user_id, change.league)))
        {
            Some(missing) => Err(MatchmakingError::PersistenceFailure {
                message: format!(
                    "no stats row for user {} in {}",
                    missing.user_id, missing.league
                ),
            }
            .into()),
            None => Ok(()),
        }
    }

    fn check_history(&self, record: &MatchRecord) -> Result<()> {
        if self
            .history
            .iter()
            .any(|entry| entry.record.match_id == record.match_id)
        {
            return Err(MatchmakingError::PersistenceFailure {
                message: format!("match {} is already recorded", record.match_id),
            }
            .into());
        }
        Ok(())
    }

    fn apply_stats(&mut self, changes: &[StatsChange]) {
        for change in changes {
            if let Some(stats) = self.stats.get_mut(&(change.user_id, change.league)) {
                stats.apply(change);
            }
        }
        debug!("Applied {} stats changes", changes.len());
    }

    fn push_history(&mut self, record: MatchRecord, participants: &[UserId]) {
        debug!(
            "Recording match {} ({}) with {} participants",
            record.match_id,
            record.status,
            participants.len()
        );
        self.history.push(HistoryEntry {
            record,
            participants: participants.to_vec(),
        });
    }
}

/// In-memory `PersistenceStore` implementation
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    initial_rating: i64,
}

impl InMemoryStore {
    /// Create a store with the built-in league settings
    pub fn new(rating_config: RatingConfig) -> Self {
        Self::with_leagues(rating_config, crate::config::default_leagues())
    }

    /// Create a store with explicit league settings
    pub fn with_leagues(rating_config: RatingConfig, leagues: Vec<LeagueSettings>) -> Self {
        let state = StoreState {
            leagues: leagues
                .into_iter()
                .map(|settings| (settings.league, settings))
                .collect(),
            ..StoreState::default()
        };

        Self {
            state: RwLock::new(state),
            initial_rating: rating_config.initial_rating,
        }
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire store read lock".to_string(),
            }
            .into()
        })
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire store write lock".to_string(),
            }
            .into()
        })
    }

    /// Register a player and open a stats row in every league
    pub fn register_player(
        &self,
        member_id: MemberId,
        user_id: UserId,
        display_name: impl Into<String>,
    ) -> Result<()> {
        let mut state = self.write_state()?;

        if state.players.contains_key(&member_id) {
            return Err(MatchmakingError::InvalidRequest {
                reason: format!("member {} is already registered", member_id),
            }
            .into());
        }

        let display_name = display_name.into();
        info!(
            "Registering player - member_id: {}, user_id: {}, name: '{}'",
            member_id, user_id, display_name
        );

        state.players.insert(
            member_id,
            RegisteredPlayer {
                user_id,
                display_name,
            },
        );
        for league in League::ALL {
            state
                .stats
                .entry((user_id, league))
                .or_insert_with(|| PlayerStats::new(self.initial_rating));
        }

        Ok(())
    }

    /// Overwrite a player's rating in one league
    pub fn set_rating(&self, user_id: UserId, league: League, rating: i64) -> Result<()> {
        let mut state = self.write_state()?;
        let stats = state.stats.get_mut(&(user_id, league)).ok_or_else(|| {
            MatchmakingError::InvalidRequest {
                reason: format!("user {} has no stats in {}", user_id, league),
            }
        })?;
        stats.rating = rating;
        Ok(())
    }

    /// Counters of a player in one league
    pub fn stats(&self, user_id: UserId, league: League) -> Result<Option<PlayerStats>> {
        Ok(self.read_state()?.stats.get(&(user_id, league)).cloned())
    }

    /// Every stored match, oldest first
    pub fn match_history(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.read_state()?.history.clone())
    }

    /// Number of registered players
    pub fn player_count(&self) -> Result<usize> {
        Ok(self.read_state()?.players.len())
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn get_player(&self, member_id: MemberId, league: League) -> Result<Option<PlayerProfile>> {
        let state = self.read_state()?;

        let Some(player) = state.players.get(&member_id) else {
            return Ok(None);
        };

        let rating = state
            .stats
            .get(&(player.user_id, league))
            .map(|stats| stats.rating)
            .unwrap_or(self.initial_rating);

        Ok(Some(PlayerProfile {
            member_id,
            user_id: player.user_id,
            display_name: player.display_name.clone(),
            rating,
        }))
    }

    async fn get_rating(&self, user_id: UserId, league: League) -> Result<i64> {
        let state = self.read_state()?;
        Ok(state
            .stats
            .get(&(user_id, league))
            .map(|stats| stats.rating)
            .unwrap_or(self.initial_rating))
    }

    async fn get_team_size(&self, league: League) -> Result<Option<usize>> {
        let state = self.read_state()?;
        state
            .leagues
            .get(&league)
            .map(|settings| settings.team_size)
            .ok_or_else(|| {
                MatchmakingError::ConfigurationError {
                    message: format!("league {} is not configured", league),
                }
                .into()
            })
    }

    async fn get_match_config(&self, league: League) -> Result<MatchConfig> {
        let state = self.read_state()?;
        state
            .leagues
            .get(&league)
            .map(|settings| settings.match_config.clone())
            .ok_or_else(|| {
                MatchmakingError::ConfigurationError {
                    message: format!("league {} is not configured", league),
                }
                .into()
            })
    }

    async fn apply_stats_changes(&self, changes: &[StatsChange]) -> Result<()> {
        let mut state = self.write_state()?;
        state.check_stats(changes)?;
        state.apply_stats(changes);
        Ok(())
    }

    async fn insert_match_history(&self, record: MatchRecord, participants: &[UserId]) -> Result<()> {
        let mut state = self.write_state()?;
        state.check_history(&record)?;
        state.push_history(record, participants);
        Ok(())
    }

    async fn record_settlement(
        &self,
        changes: &[StatsChange],
        record: MatchRecord,
        participants: &[UserId],
    ) -> Result<()> {
        let mut state = self.write_state()?;
        state.check_stats(changes)?;
        state.check_history(&record)?;

        state.apply_stats(changes);
        state.push_history(record, participants);
        Ok(())
    }
}
