//! Completion callback pushed by the match service

use crate::http::server::ServerState;
use crate::match_service::{MatchEnvelope, MatchInfo};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::{info, warn};

/// Accept a `{"match": ...}` body and reconcile it.
///
/// Every well-formed body is acknowledged with 200, including unknown match
/// ids and reconciliation failures; malformed bodies are rejected by the
/// extractor before reaching this handler.
pub async fn match_callback_handler(
    State(state): State<ServerState>,
    Json(envelope): Json<MatchEnvelope<MatchInfo>>,
) -> impl IntoResponse {
    let info = envelope.body;
    let Some(service) = &state.service else {
        warn!(
            "Callback for match {} arrived before the service was ready",
            info.match_id
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Service not initialized" })),
        );
    };

    info!(
        "Callback received for match {} with status {}",
        info.match_id, info.status
    );

    let match_id = info.match_id.clone();
    let outcome = service.manager.handle_match_update(info).await;
    state.metrics_collector.record_callback(outcome.as_str());

    (
        StatusCode::OK,
        Json(json!({
            "matchId": match_id,
            "outcome": outcome.as_str()
        })),
    )
}
