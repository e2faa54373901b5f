//! Common types used throughout the scrim-room service

use crate::store::StatsChange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User-facing identifier of a player (the id the chat surface knows them by)
pub type MemberId = u64;

/// Internal account identifier, also used as the match service account id
pub type UserId = i64;

/// Unique identifier for lobbies
pub type LobbyId = Uuid;

/// Identifier assigned by the external match service
pub type MatchId = String;

/// Identifier of a playable map
pub type MapId = u32;

/// League tier a lobby is played in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Custom,
    Solo,
    Duo,
    Trio,
    Quadro,
    Penta,
}

impl League {
    /// All leagues, in tier order
    pub const ALL: [League; 6] = [
        League::Custom,
        League::Solo,
        League::Duo,
        League::Trio,
        League::Quadro,
        League::Penta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            League::Custom => "custom",
            League::Solo => "solo",
            League::Duo => "duo",
            League::Trio => "trio",
            League::Quadro => "quadro",
            League::Penta => "penta",
        }
    }
}

impl std::fmt::Display for League {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            League::Custom => write!(f, "Custom"),
            League::Solo => write!(f, "Solo"),
            League::Duo => write!(f, "Duo"),
            League::Trio => write!(f, "Trio"),
            League::Quadro => write!(f, "Quadro"),
            League::Penta => write!(f, "Penta"),
        }
    }
}

/// Whether a lobby affects ratings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Casual,
    Competitive,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Casual => "casual",
            GameMode::Competitive => "competitive",
        }
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameMode::Casual => write!(f, "Casual"),
            GameMode::Competitive => write!(f, "Competitive"),
        }
    }
}

/// Server region a match is hosted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    Amsterdam,
    SanFrancisco,
    NewJersey,
    Singapore,
}

impl Region {
    /// Wire name understood by the match service
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Amsterdam => "amsterdam",
            Region::SanFrancisco => "san-francisco",
            Region::NewJersey => "new-jersey",
            Region::Singapore => "singapore",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Region {
    type Err = crate::error::MatchmakingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "amsterdam" => Ok(Region::Amsterdam),
            "san-francisco" => Ok(Region::SanFrancisco),
            "new-jersey" => Ok(Region::NewJersey),
            "singapore" => Ok(Region::Singapore),
            other => Err(crate::error::MatchmakingError::InvalidRequest {
                reason: format!("unknown region '{}'", other),
            }),
        }
    }
}

/// Lifecycle status reported by the match service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Running,
    Complete,
    Cancelled,
}

impl MatchStatus {
    /// `complete` and `cancelled` end a match's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Complete | MatchStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Running => "running",
            MatchStatus::Complete => "complete",
            MatchStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three team slots of a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TeamSlot {
    A,
    B,
    Spectators,
}

impl TeamSlot {
    /// The two slots that actually play
    pub const COMPETITIVE: [TeamSlot; 2] = [TeamSlot::A, TeamSlot::B];

    pub fn index(&self) -> usize {
        match self {
            TeamSlot::A => 0,
            TeamSlot::B => 1,
            TeamSlot::Spectators => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(TeamSlot::A),
            1 => Some(TeamSlot::B),
            2 => Some(TeamSlot::Spectators),
            _ => None,
        }
    }

    /// The opposing competitive slot; spectators have none
    pub fn opponent(&self) -> Option<TeamSlot> {
        match self {
            TeamSlot::A => Some(TeamSlot::B),
            TeamSlot::B => Some(TeamSlot::A),
            TeamSlot::Spectators => None,
        }
    }

    pub fn is_competitive(&self) -> bool {
        !matches!(self, TeamSlot::Spectators)
    }
}

impl std::fmt::Display for TeamSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamSlot::A => write!(f, "A"),
            TeamSlot::B => write!(f, "B"),
            TeamSlot::Spectators => write!(f, "Spectators"),
        }
    }
}

/// Match parameters sent to the match service, configured per league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfig {
    /// Match length in seconds
    pub duration: u32,
    pub gravity: f64,
    pub time_velocity: f64,
    pub damage_multiplier: f64,
    pub kills_to_win: u32,
    pub game_mode: String,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            duration: 300,
            gravity: 0.07,
            time_velocity: 1.0,
            damage_multiplier: 1.0,
            kills_to_win: 30,
            game_mode: "team_deathmatch".to_string(),
        }
    }
}

/// A registered player as seen by the matchmaking core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub member_id: MemberId,
    pub user_id: UserId,
    pub display_name: String,
    /// Rating in the league the profile was loaded for
    pub rating: i64,
}

/// What a player is searching for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub league: League,
    pub mode: GameMode,
    pub map_pool: Vec<MapId>,
    pub region: Region,
}

/// Summary of a player for lifecycle notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub user_id: UserId,
    pub display_name: String,
    pub rating: i64,
}

/// Summary of a team for lifecycle notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamView {
    pub slot: TeamSlot,
    pub average_rating: i64,
    pub players: Vec<PlayerView>,
}

/// Why a lobby update was published
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LobbyChange {
    Created,
    PlayerJoined { member_id: MemberId, slot: TeamSlot },
    PlayerLeft { member_id: MemberId },
    Configured,
    StartFailed { reason: String },
    Cancelled,
}

/// Event emitted whenever the roster or state of a lobby changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyUpdated {
    pub lobby_id: LobbyId,
    pub league: League,
    pub mode: GameMode,
    pub map: MapId,
    pub region: Region,
    pub change: LobbyChange,
    pub teams: Vec<TeamView>,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a lobby has been handed to the match service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStarted {
    pub lobby_id: LobbyId,
    pub match_id: MatchId,
    pub league: League,
    pub mode: GameMode,
    pub map: MapId,
    pub region: Region,
    pub teams: Vec<TeamView>,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted once a completed match has been recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFinished {
    pub match_id: MatchId,
    pub summary: String,
    pub winner: Option<TeamSlot>,
    pub changes: Vec<StatsChange>,
    pub teams: Vec<TeamView>,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a match is dropped without results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchAbandoned {
    pub match_id: MatchId,
    pub lobby_id: LobbyId,
    pub reason: String,
    /// Rosters as they were when the match started
    pub teams: Vec<TeamView>,
    pub timestamp: DateTime<Utc>,
}

/// Degraded-outcome notice for a match whose reconciliation failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFailed {
    pub match_id: MatchId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all presentation events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PresentationEvent {
    LobbyUpdated(LobbyUpdated),
    MatchStarted(MatchStarted),
    MatchFinished(MatchFinished),
    MatchAbandoned(MatchAbandoned),
    MatchFailed(MatchFailed),
}

impl PresentationEvent {
    /// Short routing name for the event
    pub fn kind(&self) -> &'static str {
        match self {
            PresentationEvent::LobbyUpdated(_) => "lobby.updated",
            PresentationEvent::MatchStarted(_) => "match.started",
            PresentationEvent::MatchFinished(_) => "match.finished",
            PresentationEvent::MatchAbandoned(_) => "match.abandoned",
            PresentationEvent::MatchFailed(_) => "match.failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_wire_names() {
        assert_eq!(
            serde_json::to_string(&Region::SanFrancisco).unwrap(),
            "\"san-francisco\""
        );
        assert_eq!("new-jersey".parse::<Region>().unwrap(), Region::NewJersey);
        assert!("mars".parse::<Region>().is_err());
    }

    #[test]
    fn test_team_slot_opponents() {
        assert_eq!(TeamSlot::A.opponent(), Some(TeamSlot::B));
        assert_eq!(TeamSlot::B.opponent(), Some(TeamSlot::A));
        assert_eq!(TeamSlot::Spectators.opponent(), None);
        assert_eq!(TeamSlot::from_index(2), Some(TeamSlot::Spectators));
        assert_eq!(TeamSlot::from_index(3), None);
    }

    #[test]
    fn test_match_config_wire_format() {
        let json = serde_json::to_value(MatchConfig::default()).unwrap();
        assert_eq!(json["killsToWin"], 30);
        assert_eq!(json["timeVelocity"], 1.0);
        assert_eq!(json["gameMode"], "team_deathmatch");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(MatchStatus::Complete.is_terminal());
        assert!(MatchStatus::Cancelled.is_terminal());
        assert!(!MatchStatus::Pending.is_terminal());
        assert!(!MatchStatus::Running.is_terminal());
    }
}
