//! Integration tests for the scrim-room service
//!
//! These tests drive the whole system through `LobbyManager`, the watchdog and
//! the HTTP router, with fake match service and store collaborators:
//! - Complete matchmaking and settlement workflows
//! - Custom lobby ownership rules
//! - Match service outages and watchdog eviction
//! - Completion callbacks over HTTP

mod fixtures;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use scrim_room::error::{error_kind, ErrorKind, MatchmakingError};
use scrim_room::events::{HttpEventPublisher, PublisherConfig, QueuedEventPublisher};
use scrim_room::http::{HttpServer, HttpServerConfig};
use scrim_room::lobby::{CallbackOutcome, LobbyState, StartRequester};
use scrim_room::matches::{TimeoutWatchdog, WatchdogConfig};
use scrim_room::metrics::MetricsCollector;
use scrim_room::service::ServiceHandle;
use scrim_room::store::{MatchRecord, PersistenceStore};
use scrim_room::types::{GameMode, League, MatchStatus, PresentationEvent, Region, TeamSlot};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;

use fixtures::{
    completed, create_flaky_system, create_manager_with_publisher, create_test_system, criteria,
    user_of,
};

fn assert_kind(err: &anyhow::Error, kind: ErrorKind) {
    assert_eq!(error_kind(err), kind, "unexpected error: {}", err);
}

#[tokio::test]
async fn test_solo_match_end_to_end() {
    let system = create_test_system(2);

    let first = system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    assert!(first.created);
    assert_eq!(first.slot, TeamSlot::A);

    let second = system.manager.find_match(2, criteria(League::Solo)).await.unwrap();
    assert_eq!(second.lobby_id, first.lobby_id);
    assert_eq!(second.slot, TeamSlot::B);
    assert!(second.full);

    assert!(system.manager.lobbies().is_empty().await);
    assert!(system.manager.matches().contains("match-1").await);

    let request = &system.match_service.created_requests()[0];
    assert_eq!(request.teams.len(), 2);
    assert_eq!(request.callback_url, fixtures::CALLBACK_URL);

    let outcome = system
        .manager
        .handle_match_update(completed("match-1", &[user_of(1)], &[user_of(2)], [1, 2]))
        .await;
    assert_eq!(
        outcome,
        CallbackOutcome::Finished {
            summary: "Team A is the winner!".to_string()
        }
    );

    let winner = system.store.stats(user_of(1), League::Solo).unwrap().unwrap();
    let loser = system.store.stats(user_of(2), League::Solo).unwrap().unwrap();
    assert_eq!(winner.rating, 2030);
    assert_eq!(winner.won, 1);
    assert_eq!(winner.kills, 5);
    assert_eq!(loser.rating, 1970);
    assert_eq!(loser.lost, 1);

    let history = system.store.match_history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].record.status, MatchStatus::Complete);
    assert_eq!(history[0].participants.len(), 2);

    let events = system.publisher.get_published_events();
    assert!(events.contains(&"match.started".to_string()));
    assert!(events.contains(&"match.finished".to_string()));

    // Players are free to queue again
    assert!(system.manager.find_match(1, criteria(League::Solo)).await.is_ok());
}

#[tokio::test]
async fn test_duplicate_callback_is_ignored() {
    let system = create_test_system(2);
    system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    system.manager.find_match(2, criteria(League::Solo)).await.unwrap();

    let info = completed("match-1", &[user_of(1)], &[user_of(2)], [2, 1]);
    let first = system.manager.handle_match_update(info.clone()).await;
    assert_eq!(
        first,
        CallbackOutcome::Finished {
            summary: "Team B is the winner!".to_string()
        }
    );

    let second = system.manager.handle_match_update(info).await;
    assert_eq!(second, CallbackOutcome::UnknownMatch);

    assert_eq!(system.store.match_history().unwrap().len(), 1);
    assert_eq!(
        system.store.stats(user_of(2), League::Solo).unwrap().unwrap().rating,
        2030
    );
}

#[tokio::test]
async fn test_draw_moves_no_rating() {
    let system = create_test_system(2);
    system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    system.manager.find_match(2, criteria(League::Solo)).await.unwrap();

    let outcome = system
        .manager
        .handle_match_update(completed("match-1", &[user_of(1)], &[user_of(2)], [1, 1]))
        .await;
    assert_eq!(
        outcome,
        CallbackOutcome::Finished {
            summary: "Draw!".to_string()
        }
    );

    let stats = system.store.stats(user_of(1), League::Solo).unwrap().unwrap();
    assert_eq!(stats.rating, 2000);
    assert_eq!(stats.draw, 1);
}

#[tokio::test]
async fn test_cancelled_callback_records_cancelled_match() {
    let system = create_test_system(2);
    system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    system.manager.find_match(2, criteria(League::Solo)).await.unwrap();

    let outcome = system
        .manager
        .handle_match_update(scrim_room::match_service::MatchInfo::with_status(
            "match-1",
            MatchStatus::Cancelled,
        ))
        .await;
    assert_eq!(outcome, CallbackOutcome::Abandoned);
    assert!(system.manager.matches().is_empty().await);

    let history = system.store.match_history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].record.status, MatchStatus::Cancelled);
    assert_eq!(
        system.store.stats(user_of(1), League::Solo).unwrap().unwrap().rating,
        2000
    );
    let rosters = system
        .publisher
        .events()
        .into_iter()
        .find_map(|event| match event {
            PresentationEvent::MatchAbandoned(abandoned) => Some(abandoned.teams),
            _ => None,
        })
        .expect("abandon notice");
    assert_eq!(rosters.len(), 2);
}

#[tokio::test]
async fn test_rating_gate_splits_lobbies() {
    let system = create_test_system(3);
    system.store.set_rating(user_of(2), League::Solo, 2501).unwrap();
    system.store.set_rating(user_of(3), League::Solo, 2500).unwrap();

    let first = system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    let second = system.manager.find_match(2, criteria(League::Solo)).await.unwrap();
    assert!(second.created);
    assert_ne!(second.lobby_id, first.lobby_id);

    // 2500 is exactly on the gate boundary of the 2000 lobby and of the 2501 lobby
    let third = system.manager.find_match(3, criteria(League::Solo)).await.unwrap();
    assert!(third.full);
    assert_eq!(system.manager.matches().len().await, 1);
    assert_eq!(system.manager.lobbies().len().await, 1);
}

#[tokio::test]
async fn test_duo_lobby_starts_only_when_full() {
    let system = create_test_system(4);

    for member in 1..=3 {
        let placement = system
            .manager
            .find_match(member, criteria(League::Duo))
            .await
            .unwrap();
        assert!(!placement.full);
    }
    assert!(system.manager.matches().is_empty().await);

    let last = system.manager.find_match(4, criteria(League::Duo)).await.unwrap();
    assert!(last.full);
    assert_eq!(system.manager.matches().len().await, 1);

    let stats = system.manager.get_stats().await.unwrap();
    assert_eq!(stats.players_queued, 4);
    assert_eq!(stats.lobbies_created, 1);
    assert_eq!(stats.players_waiting, 0);
}

#[tokio::test]
async fn test_player_cannot_be_seated_twice() {
    let system = create_test_system(3);

    system.manager.find_match(1, criteria(League::Duo)).await.unwrap();
    let err = system
        .manager
        .find_match(1, criteria(League::Duo))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MatchmakingError>(),
        Some(MatchmakingError::AlreadySeated { member_id: 1, .. })
    ));

    let err = system
        .manager
        .create_custom_lobby(1, League::Custom, GameMode::Casual, 232, Region::Amsterdam)
        .await
        .unwrap_err();
    assert_kind(&err, ErrorKind::Validation);

    // Seated players in a started match are rejected as well
    system.manager.find_match(2, criteria(League::Solo)).await.unwrap();
    system.manager.find_match(3, criteria(League::Solo)).await.unwrap();
    let err = system
        .manager
        .find_match(2, criteria(League::Duo))
        .await
        .unwrap_err();
    assert_kind(&err, ErrorKind::Validation);
}

#[tokio::test]
async fn test_leaving_matchmaking_lobby() {
    let system = create_test_system(2);
    let placement = system.manager.find_match(1, criteria(League::Duo)).await.unwrap();
    system.manager.find_match(2, criteria(League::Duo)).await.unwrap();

    let departure = system.manager.leave_current(2).await.unwrap();
    assert!(!departure.lobby_removed);

    let departure = system.manager.leave(1, placement.lobby_id).await.unwrap();
    assert!(departure.lobby_removed);
    assert!(system.manager.lobbies().is_empty().await);

    let err = system.manager.leave_current(1).await.unwrap_err();
    assert_kind(&err, ErrorKind::Validation);
}

#[tokio::test]
async fn test_custom_lobby_authorization() {
    let system = create_test_system(4);
    let lobby_id = system
        .manager
        .create_custom_lobby(1, League::Custom, GameMode::Competitive, 232, Region::Singapore)
        .await
        .unwrap();

    system.manager.join_custom(2, lobby_id, TeamSlot::B).await.unwrap();
    system
        .manager
        .join_custom(3, lobby_id, TeamSlot::Spectators)
        .await
        .unwrap();

    // Only the creator may start, cancel or configure
    let err = system.manager.start_custom(2, lobby_id).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MatchmakingError>(),
        Some(MatchmakingError::NotAuthorized { member_id: 2, .. })
    ));
    assert!(system.manager.cancel_custom(3, lobby_id).await.is_err());
    assert!(system
        .manager
        .configure_custom(2, lobby_id, Some(724), None, None)
        .await
        .is_err());

    // Match parameters are fixed in competitive lobbies
    let err = system
        .manager
        .configure_custom(1, lobby_id, None, None, Some(Default::default()))
        .await
        .unwrap_err();
    assert_kind(&err, ErrorKind::Validation);

    // The creator cannot walk out of their own lobby
    assert!(system.manager.leave(1, lobby_id).await.is_err());

    // Seats can be switched inside the same lobby
    system.manager.join_custom(3, lobby_id, TeamSlot::A).await.unwrap();

    system
        .manager
        .configure_custom(1, lobby_id, Some(724), Some(Region::SanFrancisco), None)
        .await
        .unwrap();
    let started = system.manager.start_custom(1, lobby_id).await.unwrap();
    assert_eq!(started.map, 724);
    assert_eq!(started.region, Region::SanFrancisco);
    assert_eq!(started.teams.len(), 2);

    // A started lobby is gone
    let err = system.manager.cancel_custom(1, lobby_id).await.unwrap_err();
    assert_kind(&err, ErrorKind::StaleReference);
}

#[tokio::test]
async fn test_custom_lobby_cancel() {
    let system = create_test_system(2);
    let lobby_id = system
        .manager
        .create_custom_lobby(1, League::Custom, GameMode::Casual, 232, Region::Amsterdam)
        .await
        .unwrap();
    system.manager.join_custom(2, lobby_id, TeamSlot::B).await.unwrap();

    system.manager.cancel_custom(1, lobby_id).await.unwrap();
    assert!(system.manager.lobbies().is_empty().await);

    // Both players may queue again
    assert!(system.manager.find_match(2, criteria(League::Solo)).await.is_ok());
}

#[tokio::test]
async fn test_creator_leaving_cancels_custom_lobby() {
    let system = create_test_system(2);
    let lobby_id = system
        .manager
        .create_custom_lobby(1, League::Custom, GameMode::Casual, 232, Region::Amsterdam)
        .await
        .unwrap();
    system.manager.join_custom(2, lobby_id, TeamSlot::B).await.unwrap();

    let departure = system.manager.leave_current(1).await.unwrap();
    assert_eq!(departure.lobby_id, lobby_id);
    assert_eq!(departure.slot, TeamSlot::A);
    assert!(departure.lobby_removed);
    assert!(system.manager.lobbies().is_empty().await);

    // Everyone seated there is free again
    assert!(system.manager.find_match(2, criteria(League::Solo)).await.is_ok());
}

#[tokio::test]
async fn test_outage_leaves_lobby_joinable() {
    let system = create_test_system(3);
    system.match_service.set_unavailable(true);

    system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    let placement = system.manager.find_match(2, criteria(League::Solo)).await.unwrap();
    assert!(placement.full);

    let state = system
        .manager
        .lobbies()
        .with_lobby(placement.lobby_id, |lobby| lobby.state())
        .await;
    assert_eq!(state, Some(LobbyState::Waiting));
    assert!(system.manager.matches().is_empty().await);
    assert!(system
        .publisher
        .get_published_events()
        .iter()
        .all(|kind| kind != "match.started"));

    // A seat freed up during the outage can be taken again
    system.manager.leave_current(2).await.unwrap();
    system.manager.find_match(3, criteria(League::Solo)).await.unwrap();

    let err = system
        .manager
        .start_lobby(placement.lobby_id, StartRequester::System)
        .await
        .unwrap_err();
    assert_kind(&err, ErrorKind::ServiceUnavailable);

    system.match_service.set_unavailable(false);
    assert_eq!(system.manager.start_ready_lobbies().await, 1);
    assert!(system.manager.matches().contains("match-1").await);
}

#[tokio::test]
async fn test_persistence_failure_publishes_notice() {
    let (system, flaky) = create_flaky_system(2);
    system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    system.manager.find_match(2, criteria(League::Solo)).await.unwrap();

    flaky.set_fail_writes(true);
    let outcome = system
        .manager
        .handle_match_update(completed("match-1", &[user_of(1)], &[user_of(2)], [1, 2]))
        .await;
    assert!(matches!(outcome, CallbackOutcome::Failed { .. }));

    assert!(system.manager.matches().is_empty().await);
    assert!(system.store.match_history().unwrap().is_empty());
    assert!(system
        .publisher
        .get_published_events()
        .contains(&"match.failed".to_string()));
    assert_eq!(system.manager.get_stats().await.unwrap().matches_failed, 1);
}

#[tokio::test]
async fn test_watchdog_abandons_stale_pending_match() {
    let system = create_test_system(2);
    system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    system.manager.find_match(2, criteria(League::Solo)).await.unwrap();

    let started_at = system.manager.matches().started_matches().await[0].started_at;
    let watchdog = TimeoutWatchdog::new(
        system.manager.clone(),
        WatchdogConfig {
            jitter_max_ms: 0,
            ..WatchdogConfig::default()
        },
    );

    let report = watchdog
        .sweep_at(started_at + chrono::Duration::minutes(1))
        .await;
    assert_eq!(report.polled, 1);
    assert_eq!(report.abandoned, 0);
    assert!(system.manager.matches().contains("match-1").await);

    let report = watchdog
        .sweep_at(started_at + chrono::Duration::minutes(3))
        .await;
    assert_eq!(report.abandoned, 1);
    assert!(system.manager.matches().is_empty().await);

    let history = system.store.match_history().unwrap();
    assert_eq!(history[0].record.status, MatchStatus::Cancelled);

    // A late callback for the evicted match changes nothing
    let outcome = system
        .manager
        .handle_match_update(completed("match-1", &[user_of(1)], &[user_of(2)], [1, 2]))
        .await;
    assert_eq!(outcome, CallbackOutcome::UnknownMatch);
    assert_eq!(
        system.store.stats(user_of(1), League::Solo).unwrap().unwrap().rating,
        2000
    );
}

#[tokio::test]
async fn test_watchdog_finishes_polled_completion() {
    let system = create_test_system(2);
    system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    system.manager.find_match(2, criteria(League::Solo)).await.unwrap();
    system
        .match_service
        .set_status("match-1", MatchStatus::Running);

    let watchdog = TimeoutWatchdog::new(
        system.manager.clone(),
        WatchdogConfig {
            jitter_max_ms: 0,
            ..WatchdogConfig::default()
        },
    );
    watchdog.sweep().await;
    assert_eq!(
        system
            .manager
            .matches()
            .with_match("match-1", |m| m.status())
            .await,
        Some(MatchStatus::Running)
    );

    system
        .match_service
        .set_result(completed("match-1", &[user_of(1)], &[user_of(2)], [2, 1]));
    let report = watchdog.sweep().await;
    assert_eq!(report.finished, 1);
    assert!(system.manager.matches().is_empty().await);
    assert_eq!(
        system.store.stats(user_of(2), League::Solo).unwrap().unwrap().rating,
        2030
    );
    assert!(system
        .publisher
        .get_published_events()
        .contains(&"match.finished".to_string()));
}

#[tokio::test]
async fn test_watchdog_keeps_matches_it_cannot_poll() {
    let system = create_test_system(2);
    system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    system.manager.find_match(2, criteria(League::Solo)).await.unwrap();
    system.match_service.set_unavailable(true);

    let watchdog = TimeoutWatchdog::new(
        system.manager.clone(),
        WatchdogConfig {
            jitter_max_ms: 0,
            ..WatchdogConfig::default()
        },
    );
    let started_at = system.manager.matches().started_matches().await[0].started_at;
    let report = watchdog
        .sweep_at(started_at + chrono::Duration::minutes(10))
        .await;
    assert_eq!(report.poll_failures, 1);
    assert!(system.manager.matches().contains("match-1").await);
}

#[tokio::test]
async fn test_failed_history_write_keeps_ratings() {
    let system = create_test_system(2);
    system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    system.manager.find_match(2, criteria(League::Solo)).await.unwrap();

    // A stale row for the same match id makes the history write fail
    let stale = completed("match-1", &[user_of(1)], &[user_of(2)], [1, 2]);
    let record = MatchRecord {
        match_id: stale.match_id.clone(),
        league: League::Solo,
        mode: GameMode::Competitive,
        status: MatchStatus::Cancelled,
        config: Default::default(),
        teams: vec![],
        map: 232,
        region: Region::Amsterdam,
        comment: Some("stale".to_string()),
        created_at: chrono::Utc::now(),
    };
    system
        .store
        .insert_match_history(record, &[user_of(1), user_of(2)])
        .await
        .unwrap();

    let outcome = system.manager.handle_match_update(stale).await;
    assert!(matches!(outcome, CallbackOutcome::Failed { .. }));

    for member in [1, 2] {
        let stats = system.store.stats(user_of(member), League::Solo).unwrap().unwrap();
        assert_eq!(stats.rating, 2000);
        assert_eq!(stats.won + stats.lost, 0);
    }
    assert_eq!(system.store.match_history().unwrap().len(), 1);
    assert!(system
        .publisher
        .get_published_events()
        .contains(&"match.failed".to_string()));
}

#[tokio::test]
async fn test_unreachable_webhook_does_not_delay_match_start() {
    let webhook = Arc::new(
        HttpEventPublisher::new(
            "http://127.0.0.1:1/events",
            PublisherConfig {
                max_retries: 3,
                retry_delay_ms: 500,
                publish_timeout_ms: 5000,
            },
        )
        .unwrap(),
    );
    let (publisher, queue) = QueuedEventPublisher::new(64);
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let drain = queue.spawn(webhook, shutdown_rx);
    let (manager, _store, _match_service) = create_manager_with_publisher(2, Arc::new(publisher));

    let started = std::time::Instant::now();
    manager.find_match(1, criteria(League::Solo)).await.unwrap();
    let placement = manager.find_match(2, criteria(League::Solo)).await.unwrap();
    assert!(placement.full);
    assert!(manager.matches().contains("match-1").await);
    assert!(started.elapsed() < std::time::Duration::from_secs(1));

    drop(shutdown_tx);
    drain.abort();
}

#[tokio::test]
async fn test_callback_over_http() {
    let system = create_test_system(2);
    system.manager.find_match(1, criteria(League::Solo)).await.unwrap();
    system.manager.find_match(2, criteria(League::Solo)).await.unwrap();

    let app = HttpServer::new(
        HttpServerConfig::default(),
        Arc::new(MetricsCollector::new().unwrap()),
    )
    .with_service(ServiceHandle::new(
        "scrim-room",
        system.manager.clone(),
        Arc::new(RwLock::new(true)),
    ))
    .router();

    let body = serde_json::json!({
        "match": {
            "matchId": "match-1",
            "status": "complete",
            "mapId": "232",
            "teams": [
                { "placement": 1, "players": [{ "account": user_of(1).to_string(), "stats": { "kills": 7, "deaths": 1, "assists": 0 } }] },
                { "placement": 2, "players": [{ "account": user_of(2), "stats": { "kills": 1, "deaths": 7, "assists": 0 } }] }
            ]
        }
    });

    let request = || {
        Request::builder()
            .method("POST")
            .uri("/matchCallback")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        system.store.stats(user_of(1), League::Solo).unwrap().unwrap().kills,
        7
    );

    // Redelivery is acknowledged and ignored
    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(system.store.match_history().unwrap().len(), 1);

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
