//! Registry of started matches
//!
//! Owns every in-flight match. The registry never takes the lobby lock; the
//! lobby registry locks lobbies first and this map second when it promotes a
//! lobby.

use crate::error::{MatchmakingError, Result};
use crate::matches::instance::Match;
use crate::types::{MatchId, MatchStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Owned view of a started match for the watchdog sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedMatch {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub started_at: DateTime<Utc>,
}

pub(crate) type MatchMap = HashMap<MatchId, Match>;

/// Shared registry of started matches
#[derive(Debug, Clone, Default)]
pub struct MatchRegistry {
    matches: Arc<Mutex<MatchMap>>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, MatchMap> {
        self.matches.lock().await
    }

    pub(crate) fn insert_locked(matches: &mut MatchMap, m: Match) -> Result<()> {
        if matches.contains_key(m.match_id()) {
            return Err(MatchmakingError::InternalError {
                message: format!("match {} is already registered", m.match_id()),
            }
            .into());
        }
        matches.insert(m.match_id().to_string(), m);
        Ok(())
    }

    /// Register a started match
    #[cfg(test)]
    pub async fn insert(&self, m: Match) -> Result<()> {
        let mut matches = self.matches.lock().await;
        Self::insert_locked(&mut matches, m)
    }

    /// Remove a match; `None` when it was already removed
    pub async fn remove(&self, match_id: &str) -> Option<Match> {
        let removed = self.matches.lock().await.remove(match_id);
        if removed.is_some() {
            debug!("Removed match {} from registry", match_id);
        }
        removed
    }

    pub async fn contains(&self, match_id: &str) -> bool {
        self.matches.lock().await.contains_key(match_id)
    }

    /// Snapshot of every started match
    pub async fn started_matches(&self) -> Vec<StartedMatch> {
        self.matches
            .lock()
            .await
            .values()
            .map(|m| StartedMatch {
                match_id: m.match_id().to_string(),
                status: m.status(),
                started_at: m.started_at(),
            })
            .collect()
    }

    /// Run `f` against a match under the lock
    pub async fn with_match<R>(&self, match_id: &str, f: impl FnOnce(&Match) -> R) -> Option<R> {
        self.matches.lock().await.get(match_id).map(f)
    }

    /// Record a non-terminal status; false for unknown matches
    pub async fn update_status(&self, match_id: &str, status: MatchStatus) -> bool {
        match self.matches.lock().await.get_mut(match_id) {
            Some(m) => {
                m.set_status(status);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.matches.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.matches.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::{Lobby, LobbyKind, LobbyTemplate};
    use crate::types::{GameMode, League, MatchConfig, MemberId, PlayerProfile, Region, TeamSlot};

    fn started(match_id: &str, member_id: MemberId) -> Match {
        let mut lobby = Lobby::new(
            LobbyKind::Matchmaking,
            League::Solo,
            GameMode::Casual,
            232,
            Region::Amsterdam,
            LobbyTemplate {
                team_size: Some(1),
                match_config: MatchConfig::default(),
            },
        );
        lobby
            .join(
                TeamSlot::A,
                &PlayerProfile {
                    member_id,
                    user_id: member_id as i64,
                    display_name: "p".to_string(),
                    rating: 2000,
                },
            )
            .unwrap();
        Match::new(match_id.to_string(), lobby, MatchStatus::Pending, Utc::now())
    }

    #[tokio::test]
    async fn test_insert_and_remove_once() {
        let registry = MatchRegistry::new();
        registry.insert(started("m1", 1)).await.unwrap();
        assert!(registry.insert(started("m1", 2)).await.is_err());

        assert!(registry.contains("m1").await);
        assert_eq!(
            registry.with_match("m1", |m| m.contains_member(1)).await,
            Some(true)
        );

        assert!(registry.remove("m1").await.is_some());
        assert!(registry.remove("m1").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_status_updates() {
        let registry = MatchRegistry::new();
        registry.insert(started("m1", 1)).await.unwrap();

        assert!(registry.update_status("m1", MatchStatus::Running).await);
        assert!(!registry.update_status("m2", MatchStatus::Running).await);

        let snapshot = registry.started_matches().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, MatchStatus::Running);
        assert_eq!(
            registry.with_match("m1", |m| m.lobby().league()).await,
            Some(League::Solo)
        );
    }
}
