//! Persistence store interface
//!
//! The store owns player identity, per-league ratings and counters, league
//! settings and the match history. The matchmaking core only reads ratings and
//! league settings and writes settled results back through this trait.

pub mod memory;

use crate::error::Result;
use crate::types::{
    GameMode, League, MapId, MatchConfig, MatchId, MatchStatus, MemberId, PlayerProfile, Region,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::InMemoryStore;

/// One row of a settled match: counter increments and rating delta for a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsChange {
    pub user_id: UserId,
    pub league: League,
    pub won: bool,
    pub lost: bool,
    pub draw: bool,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub rating_delta: i64,
}

/// Per-league counters of a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub won: u32,
    pub lost: u32,
    pub draw: u32,
    pub kills: u64,
    pub deaths: u64,
    pub assists: u64,
    pub rating: i64,
}

impl PlayerStats {
    pub fn new(initial_rating: i64) -> Self {
        Self {
            won: 0,
            lost: 0,
            draw: 0,
            kills: 0,
            deaths: 0,
            assists: 0,
            rating: initial_rating,
        }
    }

    /// Fold a settled change into the counters
    pub fn apply(&mut self, change: &StatsChange) {
        self.won += u32::from(change.won);
        self.lost += u32::from(change.lost);
        self.draw += u32::from(change.draw);
        self.kills += u64::from(change.kills);
        self.deaths += u64::from(change.deaths);
        self.assists += u64::from(change.assists);
        self.rating += change.rating_delta;
    }
}

/// A player's line in the match history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub score: Option<i64>,
    /// Rating after settlement, only for competitive matches
    pub rating: Option<i64>,
}

/// A team's line in the match history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub placement: Option<u32>,
    pub players: Vec<PlayerRecord>,
}

/// Historical record of a finished or cancelled match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub league: League,
    pub mode: GameMode,
    pub status: MatchStatus,
    pub config: MatchConfig,
    pub teams: Vec<TeamRecord>,
    pub map: MapId,
    pub region: Region,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Storage operations the matchmaking core depends on
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Look up a registered player with their rating in `league`
    async fn get_player(&self, member_id: MemberId, league: League) -> Result<Option<PlayerProfile>>;

    /// Current rating of a player in a league
    async fn get_rating(&self, user_id: UserId, league: League) -> Result<i64>;

    /// Players per competitive team, `None` when uncapped
    async fn get_team_size(&self, league: League) -> Result<Option<usize>>;

    /// Default match parameters of a league
    async fn get_match_config(&self, league: League) -> Result<MatchConfig>;

    /// Apply a batch of stats changes; either every row applies or none does
    async fn apply_stats_changes(&self, changes: &[StatsChange]) -> Result<()>;

    /// Store a match record and link it to its participants
    async fn insert_match_history(&self, record: MatchRecord, participants: &[UserId]) -> Result<()>;

    /// Persist a settled match in one transaction: the stats batch and its
    /// history record are both written or neither is
    async fn record_settlement(
        &self,
        changes: &[StatsChange],
        record: MatchRecord,
        participants: &[UserId],
    ) -> Result<()>;
}
