//! Test fixtures and fake collaborators for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use scrim_room::config::RatingConfig;
use scrim_room::error::{MatchmakingError, Result};
use scrim_room::events::{EventPublisher, MockEventPublisher};
use scrim_room::lobby::LobbyManager;
use scrim_room::match_service::{
    CreateMatchRequest, MatchInfo, MatchPlayerInfo, MatchServiceClient, MatchTeamInfo,
    NumberOrString, PlayerMatchStats,
};
use scrim_room::metrics::MetricsCollector;
use scrim_room::rating::RatingEngine;
use scrim_room::store::{InMemoryStore, MatchRecord, PersistenceStore, StatsChange};
use scrim_room::types::{
    GameMode, League, MatchConfig, MatchStatus, MemberId, PlayerProfile, Region, SearchCriteria,
    UserId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const CALLBACK_URL: &str = "http://scrim-room.test/matchCallback";

/// Match service double: hands out sequential ids and answers polls from a
/// per-match table of descriptions
#[derive(Debug, Default)]
pub struct ScriptedMatchService {
    next_id: AtomicUsize,
    unavailable: AtomicBool,
    matches: Mutex<HashMap<String, MatchInfo>>,
    requests: Mutex<Vec<CreateMatchRequest>>,
}

impl ScriptedMatchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail as if the service were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Status reported for `match_id` from now on
    pub fn set_status(&self, match_id: &str, status: MatchStatus) {
        if let Ok(mut matches) = self.matches.lock() {
            matches
                .entry(match_id.to_string())
                .or_insert_with(|| MatchInfo::with_status(match_id, status))
                .status = status;
        }
    }

    /// Full description reported for its match from now on
    pub fn set_result(&self, info: MatchInfo) {
        if let Ok(mut matches) = self.matches.lock() {
            matches.insert(info.match_id.clone(), info);
        }
    }

    pub fn created_requests(&self) -> Vec<CreateMatchRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MatchmakingError::ServiceUnavailable {
                message: "connection refused".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl MatchServiceClient for ScriptedMatchService {
    async fn create_match(&self, request: CreateMatchRequest) -> Result<MatchInfo> {
        self.check_available()?;

        let match_id = format!("match-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.set_status(&match_id, MatchStatus::Pending);
        Ok(MatchInfo::with_status(match_id, MatchStatus::Pending))
    }

    async fn get_match(&self, match_id: &str) -> Result<MatchInfo> {
        self.check_available()?;

        self.matches
            .lock()
            .ok()
            .and_then(|matches| matches.get(match_id).cloned())
            .ok_or_else(|| {
                MatchmakingError::MatchNotFound {
                    match_id: match_id.to_string(),
                }
                .into()
            })
    }
}

/// Store wrapper whose writes can be switched to fail
pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("database is read-only"));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceStore for FlakyStore {
    async fn get_player(&self, member_id: MemberId, league: League) -> Result<Option<PlayerProfile>> {
        self.inner.get_player(member_id, league).await
    }

    async fn get_rating(&self, user_id: UserId, league: League) -> Result<i64> {
        self.inner.get_rating(user_id, league).await
    }

    async fn get_team_size(&self, league: League) -> Result<Option<usize>> {
        self.inner.get_team_size(league).await
    }

    async fn get_match_config(&self, league: League) -> Result<MatchConfig> {
        self.inner.get_match_config(league).await
    }

    async fn apply_stats_changes(&self, changes: &[StatsChange]) -> Result<()> {
        self.check_writes()?;
        self.inner.apply_stats_changes(changes).await
    }

    async fn insert_match_history(&self, record: MatchRecord, participants: &[UserId]) -> Result<()> {
        self.check_writes()?;
        self.inner.insert_match_history(record, participants).await
    }

    async fn record_settlement(
        &self,
        changes: &[StatsChange],
        record: MatchRecord,
        participants: &[UserId],
    ) -> Result<()> {
        self.check_writes()?;
        self.inner
            .record_settlement(changes, record, participants)
            .await
    }
}

/// A complete system wired with fakes
pub struct TestSystem {
    pub manager: LobbyManager,
    pub store: Arc<InMemoryStore>,
    pub match_service: Arc<ScriptedMatchService>,
    pub publisher: Arc<MockEventPublisher>,
}

/// User id registered for `member_id`
pub fn user_of(member_id: MemberId) -> UserId {
    member_id as UserId + 1000
}

/// Build a system with members `1..=players` registered at the initial rating
pub fn create_test_system(players: u64) -> TestSystem {
    let store = Arc::new(InMemoryStore::new(RatingConfig::default()));
    register_players(&store, players);
    build_system(store.clone(), store)
}

/// Like `create_test_system`, with writes going through a `FlakyStore`
pub fn create_flaky_system(players: u64) -> (TestSystem, Arc<FlakyStore>) {
    let store = Arc::new(InMemoryStore::new(RatingConfig::default()));
    register_players(&store, players);
    let flaky = Arc::new(FlakyStore::new(store.clone()));
    (build_system(store, flaky.clone()), flaky)
}

fn register_players(store: &InMemoryStore, players: u64) {
    for member_id in 1..=players {
        store
            .register_player(member_id, user_of(member_id), format!("player{}", member_id))
            .expect("register player");
    }
}

/// Manager over registered members `1..=players` that publishes to `publisher`
pub fn create_manager_with_publisher(
    players: u64,
    publisher: Arc<dyn EventPublisher>,
) -> (LobbyManager, Arc<InMemoryStore>, Arc<ScriptedMatchService>) {
    let store = Arc::new(InMemoryStore::new(RatingConfig::default()));
    register_players(&store, players);
    let match_service = Arc::new(ScriptedMatchService::new());
    let manager = LobbyManager::new(
        match_service.clone(),
        store.clone(),
        publisher,
        Arc::new(MetricsCollector::new().expect("metrics collector")),
        RatingEngine::default(),
        CALLBACK_URL,
    );
    (manager, store, match_service)
}

fn build_system(store: Arc<InMemoryStore>, persistence: Arc<dyn PersistenceStore>) -> TestSystem {
    let match_service = Arc::new(ScriptedMatchService::new());
    let publisher = Arc::new(MockEventPublisher::new());
    let manager = LobbyManager::new(
        match_service.clone(),
        persistence,
        publisher.clone(),
        Arc::new(MetricsCollector::new().expect("metrics collector")),
        RatingEngine::default(),
        CALLBACK_URL,
    );

    TestSystem {
        manager,
        store,
        match_service,
        publisher,
    }
}

pub fn criteria(league: League) -> SearchCriteria {
    SearchCriteria {
        league,
        mode: GameMode::Competitive,
        map_pool: vec![232],
        region: Region::Amsterdam,
    }
}

/// A `complete` description with team A on `placements[0]` and team B on
/// `placements[1]`
pub fn completed(
    match_id: &str,
    team_a: &[UserId],
    team_b: &[UserId],
    placements: [u32; 2],
) -> MatchInfo {
    let team = |users: &[UserId], placement: u32| MatchTeamInfo {
        placement: Some(placement),
        players: users
            .iter()
            .map(|user_id| MatchPlayerInfo {
                account: NumberOrString::String(user_id.to_string()),
                stats: Some(PlayerMatchStats {
                    kills: 5,
                    deaths: 3,
                    assists: 2,
                    score: Some(500),
                }),
            })
            .collect(),
    };

    MatchInfo {
        teams: vec![team(team_a, placements[0]), team(team_b, placements[1])],
        map_id: Some(NumberOrString::String("232".to_string())),
        ..MatchInfo::with_status(match_id, MatchStatus::Complete)
    }
}
