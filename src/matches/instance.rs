//! Started matches

use crate::lobby::Lobby;
use crate::types::{MatchId, MatchStatus, MemberId, TeamView};
use chrono::{DateTime, Utc};

/// Why a match is dropped without results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The match service reported `cancelled`
    Cancelled,
    /// The match stayed `pending` past the grace period
    PendingTimeout,
}

impl AbandonReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbandonReason::Cancelled => "cancelled",
            AbandonReason::PendingTimeout => "pending_timeout",
        }
    }
}

impl std::fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lobby handed off to the match service, tracked until a terminal status
#[derive(Debug, Clone)]
pub struct Match {
    match_id: MatchId,
    lobby: Lobby,
    status: MatchStatus,
    started_at: DateTime<Utc>,
    team_snapshot: Vec<TeamView>,
}

impl Match {
    pub fn new(match_id: MatchId, lobby: Lobby, status: MatchStatus, started_at: DateTime<Utc>) -> Self {
        let team_snapshot = lobby.team_views();
        Self {
            match_id,
            lobby,
            status,
            started_at,
            team_snapshot,
        }
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Rosters as they were when the match started
    pub fn team_snapshot(&self) -> &[TeamView] {
        &self.team_snapshot
    }

    pub fn contains_member(&self, member_id: MemberId) -> bool {
        self.lobby.contains_member(member_id)
    }

    pub(crate) fn set_status(&mut self, status: MatchStatus) {
        self.status = status;
    }

    /// Hand the lobby back for settlement once the match left the registry
    pub fn into_lobby(self) -> Lobby {
        self.lobby
    }
}
