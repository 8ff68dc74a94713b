//! HTTP implementation of [`ScrambleBackend`]

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use clipduel_common::model::{
    CreateSessionResponse, SportSummary, SubmitOutcomeRequest, SubmitOutcomeResponse,
};
use clipduel_common::{MomentId, SessionId};

use super::ScrambleBackend;
use crate::config::ApiConfig;
use crate::{Error, Result};

const USER_AGENT: &str = concat!("clipduel-scramble/", env!("CARGO_PKG_VERSION"));

/// Everything a request needs, passed explicitly instead of living in a global
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ApiContext {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Error body the backend sends alongside non-success statuses
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    error: Option<String>,
}

/// `GET /api/v1/scramble/sports` answers either a bare list or a wrapper
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SportsPayload {
    List(Vec<SportSummary>),
    Wrapped { sports: Vec<SportSummary> },
}

/// Backend client over reqwest
pub struct HttpBackend {
    http_client: reqwest::Client,
    context: ApiContext,
}

impl HttpBackend {
    pub fn new(context: ApiContext) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(context.timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http_client,
            context,
        })
    }

    pub fn context(&self) -> &ApiContext {
        &self.context
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.context.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| Error::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or(body);

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Unauthorized(message));
        }
        Err(Error::Backend {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ScrambleBackend for HttpBackend {
    async fn create_session(&self, sport: Option<&str>) -> Result<CreateSessionResponse> {
        if self.context.token.is_none() {
            warn!("Creating a session without a token; the backend will likely refuse");
        }

        let body = match sport {
            Some(sport) => serde_json::json!({ "sport": sport }),
            None => serde_json::json!({}),
        };
        let url = self.context.url("api/v1/scramble");
        debug!(url = %url, sport = ?sport, "Creating scramble session");

        let response = self
            .authorize(self.http_client.post(&url))
            .json(&body)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn submit_outcome(
        &self,
        session_id: &SessionId,
        winner_id: &MomentId,
        round_index: usize,
    ) -> Result<SubmitOutcomeResponse> {
        let url = self
            .context
            .url(&format!("api/v1/scramble/{}/submit_duel", session_id));
        let request = SubmitOutcomeRequest {
            session_id: session_id.clone(),
            winner_id: winner_id.clone(),
            round_index,
        };
        debug!(url = %url, round = round_index, winner = %winner_id, "Submitting duel outcome");

        let response = self
            .authorize(self.http_client.post(&url))
            .json(&request)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn fetch_sports(&self) -> Result<Vec<SportSummary>> {
        let url = self.context.url("api/v1/scramble/sports");
        debug!(url = %url, "Fetching sports list");

        let response = self.authorize(self.http_client.get(&url)).send().await?;
        let payload: SportsPayload = Self::read(response).await?;
        Ok(match payload {
            SportsPayload::List(sports) => sports,
            SportsPayload::Wrapped { sports } => sports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_normalises_url_and_token() {
        let config = ApiConfig {
            base_url: "https://api.example/".to_string(),
            timeout_ms: 2_500,
            token: Some("   ".to_string()),
        };
        let context = ApiContext::from_config(&config);

        assert_eq!(context.url("/api/v1/scramble"), "https://api.example/api/v1/scramble");
        assert_eq!(context.token, None);
        assert_eq!(context.timeout, Duration::from_millis(2_500));
    }

    #[test]
    fn test_sports_payload_shapes() {
        let bare: SportsPayload =
            serde_json::from_str(r#"[{"id": 1, "name": "Football", "slug": "football"}]"#).unwrap();
        let wrapped: SportsPayload =
            serde_json::from_str(r#"{"sports": [{"name": "Rugby"}]}"#).unwrap();

        match bare {
            SportsPayload::List(sports) => assert_eq!(sports[0].slug.as_deref(), Some("football")),
            other => panic!("unexpected {:?}", other),
        }
        match wrapped {
            SportsPayload::Wrapped { sports } => assert_eq!(sports[0].name, "Rugby"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_body_message() {
        let body: ErrorBody = serde_json::from_str(r#"{"error": "session expired"}"#).unwrap();
        assert_eq!(body.error.as_deref(), Some("session expired"));
    }
}
