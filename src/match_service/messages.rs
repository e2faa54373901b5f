//! Wire types exchanged with the match service
//!
//! Every body is wrapped in a `{"match": ...}` envelope. Identifiers coming back
//! from the service may be numbers or strings, so they are normalized on read.

use crate::types::{MapId, MatchConfig, MatchId, MatchStatus, Region, UserId};
use serde::{Deserialize, Serialize};

/// `{"match": ...}` envelope used in both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEnvelope<T> {
    #[serde(rename = "match")]
    pub body: T,
}

impl<T> MatchEnvelope<T> {
    pub fn new(body: T) -> Self {
        Self { body }
    }
}

/// An identifier that may be encoded as a JSON number or a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(i64),
    String(String),
}

impl NumberOrString {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NumberOrString::Number(n) => Some(*n),
            NumberOrString::String(s) => s.trim().parse().ok(),
        }
    }
}

/// Player entry in a create-match roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterPlayer {
    pub account: String,
}

/// Team entry in a create-match roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRoster {
    pub players: Vec<RosterPlayer>,
}

impl TeamRoster {
    pub fn from_accounts<I>(accounts: I) -> Self
    where
        I: IntoIterator<Item = UserId>,
    {
        Self {
            players: accounts
                .into_iter()
                .map(|account| RosterPlayer {
                    account: account.to_string(),
                })
                .collect(),
        }
    }
}

/// Request body for creating a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchRequest {
    #[serde(flatten)]
    pub config: MatchConfig,
    pub map_id: MapId,
    pub region: Region,
    pub teams: Vec<TeamRoster>,
    pub callback_url: String,
}

/// Per-player statistics reported by the match service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerMatchStats {
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub score: Option<i64>,
}

/// Player entry of a match description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPlayerInfo {
    pub account: NumberOrString,
    #[serde(default)]
    pub stats: Option<PlayerMatchStats>,
}

impl MatchPlayerInfo {
    pub fn user_id(&self) -> Option<UserId> {
        self.account.as_i64()
    }
}

/// Team entry of a match description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTeamInfo {
    #[serde(default)]
    pub placement: Option<u32>,
    #[serde(default)]
    pub players: Vec<MatchPlayerInfo>,
}

/// Match description returned by the service and pushed to the callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    #[serde(alias = "match_id", alias = "id")]
    pub match_id: MatchId,
    pub status: MatchStatus,
    #[serde(default)]
    pub teams: Vec<MatchTeamInfo>,
    #[serde(default, alias = "map_id")]
    pub map_id: Option<NumberOrString>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub config: Option<MatchConfig>,
}

impl MatchInfo {
    /// Bare description carrying only an id and a status
    pub fn with_status(match_id: impl Into<MatchId>, status: MatchStatus) -> Self {
        Self {
            match_id: match_id.into(),
            status,
            teams: Vec::new(),
            map_id: None,
            region: None,
            config: None,
        }
    }

    pub fn map(&self) -> Option<MapId> {
        self.map_id
            .as_ref()
            .and_then(NumberOrString::as_i64)
            .and_then(|id| MapId::try_from(id).ok())
    }

    pub fn placement(&self, team_index: usize) -> Option<u32> {
        self.teams.get(team_index).and_then(|team| team.placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_wire_format() {
        let request = CreateMatchRequest {
            config: MatchConfig::default(),
            map_id: 232,
            region: Region::NewJersey,
            teams: vec![TeamRoster::from_accounts([1, 2]), TeamRoster::from_accounts([3])],
            callback_url: "http://localhost:8080/matchCallback".to_string(),
        };

        let json = serde_json::to_value(MatchEnvelope::new(request)).unwrap();
        let body = &json["match"];
        assert_eq!(body["mapId"], 232);
        assert_eq!(body["region"], "new-jersey");
        assert_eq!(body["killsToWin"], 30);
        assert_eq!(body["damageMultiplier"], 1.0);
        assert_eq!(body["teams"][0]["players"][1]["account"], "2");
        assert_eq!(body["callbackUrl"], "http://localhost:8080/matchCallback");
    }

    #[test]
    fn test_match_info_normalizes_identifiers() {
        let payload = json!({
            "match": {
                "matchId": "abc",
                "status": "complete",
                "mapId": "1460",
                "teams": [
                    {"placement": 1, "players": [{"account": "11", "stats": {"kills": 5}}]},
                    {"placement": 2, "players": [{"account": 12}]}
                ]
            }
        });

        let envelope: MatchEnvelope<MatchInfo> = serde_json::from_value(payload).unwrap();
        let info = envelope.body;
        assert_eq!(info.match_id, "abc");
        assert_eq!(info.status, MatchStatus::Complete);
        assert_eq!(info.map(), Some(1460));
        assert_eq!(info.placement(0), Some(1));
        assert_eq!(info.teams[0].players[0].user_id(), Some(11));
        assert_eq!(info.teams[1].players[0].user_id(), Some(12));

        let stats = info.teams[0].players[0].stats.clone().unwrap();
        assert_eq!(stats.kills, 5);
        assert_eq!(stats.deaths, 0);
        assert!(info.teams[1].players[0].stats.is_none());
    }

    #[test]
    fn test_match_info_minimal_body() {
        let info: MatchInfo =
            serde_json::from_value(json!({"match_id": "m1", "status": "pending"})).unwrap();
        assert_eq!(info.match_id, "m1");
        assert!(info.teams.is_empty());
        assert_eq!(info.placement(0), None);
    }
}
