use std::time::Duration;

use async_trait::async_trait;
use mindmoney_schema::{
    ChatRequest, ChatResponse, HistoryMessage, SessionHistory, SessionList, SessionSummary,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::{BackendError, CoachBackend};

/// JSON-over-HTTP client for the coaching backend.
#[derive(Debug, Clone)]
pub struct HttpCoachBackend {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

/// FastAPI error body: `{"detail": "..."}`.
#[derive(Debug, Deserialize)]
struct ApiError {
    detail: serde_json::Value,
}

impl HttpCoachBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| BackendError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(BackendError::InvalidBaseUrl(base_url.to_string()));
        }

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url,
            timeout,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn map_send_error(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else if err.is_connect() {
            BackendError::Connect(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            return Err(format_api_error(status, &text));
        }
        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn format_api_error(status: StatusCode, body: &str) -> BackendError {
    let detail = match serde_json::from_str::<ApiError>(body) {
        Ok(ApiError {
            detail: serde_json::Value::String(text),
        }) => text,
        Ok(ApiError { detail }) => detail.to_string(),
        Err(_) => body.trim().to_string(),
    };
    BackendError::Status {
        status: status.as_u16(),
        detail,
    }
}

#[async_trait]
impl CoachBackend for HttpCoachBackend {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, BackendError> {
        let url = self.endpoint(&["api", "chat"])?;
        tracing::debug!(%url, session_id = %request.session_id, history = request.history.len(), "sending chat request");

        let resp = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        self.read_json(resp).await
    }

    async fn list_sessions(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<SessionSummary>, BackendError> {
        let mut url = self.endpoint(&["api", "sessions"])?;
        if let Some(user_id) = user_id {
            url.query_pairs_mut().append_pair("user_id", user_id);
        }

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let list: SessionList = self.read_json(resp).await?;
        Ok(list.sessions)
    }

    async fn load_history(&self, session_id: &str) -> Result<Vec<HistoryMessage>, BackendError> {
        let url = self.endpoint(&["api", "sessions", session_id, "history"])?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let history: SessionHistory = self.read_json(resp).await?;
        Ok(history.messages)
    }
}
