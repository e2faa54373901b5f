//! League configuration
//!
//! Each league fixes the team size and the default match parameters sent to
//! the match service. The Custom league has no team size cap.

use crate::types::{League, MatchConfig};
use serde::{Deserialize, Serialize};

/// Team size and default match parameters of a league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueSettings {
    pub league: League,
    /// Players per competitive team; `None` means uncapped
    pub team_size: Option<usize>,
    pub match_config: MatchConfig,
}

impl LeagueSettings {
    /// Built-in settings for a league
    pub fn defaults_for(league: League) -> Self {
        let (team_size, duration, kills_to_win) = match league {
            League::Custom => (None, 300, 30),
            League::Solo => (Some(1), 300, 25),
            League::Duo => (Some(2), 480, 50),
            League::Trio => (Some(3), 480, 50),
            League::Quadro => (Some(4), 900, 150),
            League::Penta => (Some(5), 900, 250),
        };

        Self {
            league,
            team_size,
            match_config: MatchConfig {
                duration,
                kills_to_win,
                ..MatchConfig::default()
            },
        }
    }
}

/// Built-in settings for every league
pub fn default_leagues() -> Vec<LeagueSettings> {
    League::ALL
        .iter()
        .map(|league| LeagueSettings::defaults_for(*league))
        .collect()
}
