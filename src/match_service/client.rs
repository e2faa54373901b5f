//! Client for the external match service

use crate::config::MatchServiceSettings;
use crate::error::{MatchmakingError, Result};
use crate::match_service::messages::{CreateMatchRequest, MatchEnvelope, MatchInfo};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

/// Operations the matchmaking core needs from the match service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MatchServiceClient: Send + Sync {
    /// Create a match for a started lobby
    async fn create_match(&self, request: CreateMatchRequest) -> Result<MatchInfo>;

    /// Fetch the live description of a match
    async fn get_match(&self, match_id: &str) -> Result<MatchInfo>;
}

/// HTTP implementation of `MatchServiceClient`
#[derive(Debug, Clone)]
pub struct HttpMatchServiceClient {
    client: Client,
    base_url: String,
}

impl HttpMatchServiceClient {
    pub fn new(settings: &MatchServiceSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .map_err(|e| MatchmakingError::ConfigurationError {
                message: format!("Failed to build match service HTTP client: {}", e),
            })?;

        info!("Match service client targeting {}", settings.base_url);

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn unavailable(context: &str, error: impl std::fmt::Display) -> anyhow::Error {
        MatchmakingError::ServiceUnavailable {
            message: format!("{}: {}", context, error),
        }
        .into()
    }

    async fn read_match(response: reqwest::Response, context: &str) -> Result<MatchInfo> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} returned {}: {}", context, status, body);
            return Err(Self::unavailable(context, format!("HTTP {}", status)));
        }

        let envelope: MatchEnvelope<MatchInfo> = response
            .json()
            .await
            .map_err(|e| Self::unavailable(context, e))?;
        Ok(envelope.body)
    }
}

#[async_trait]
impl MatchServiceClient for HttpMatchServiceClient {
    async fn create_match(&self, request: CreateMatchRequest) -> Result<MatchInfo> {
        let url = format!("{}/v1/matches", self.base_url);
        debug!(
            "Creating match on map {} in {} with {} teams",
            request.map_id,
            request.region,
            request.teams.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&MatchEnvelope::new(request))
            .send()
            .await
            .map_err(|e| Self::unavailable("create match", e))?;

        let info = Self::read_match(response, "create match").await?;
        info!("Match service created match {} ({})", info.match_id, info.status);
        Ok(info)
    }

    async fn get_match(&self, match_id: &str) -> Result<MatchInfo> {
        let url = format!("{}/v1/matches/{}", self.base_url, match_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::unavailable("get match", e))?;

        Self::read_match(response, "get match").await
    }
}
