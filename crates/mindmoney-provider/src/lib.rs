pub mod error;
pub mod http;

pub use error::*;
pub use http::HttpCoachBackend;

use async_trait::async_trait;
use mindmoney_schema::{
    AgentTraceStep, ChatRequest, ChatResponse, HistoryMessage, SessionSummary, TraceStatus,
};

/// The external coaching service: chat plus the session history API.
#[async_trait]
pub trait CoachBackend: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, BackendError>;

    async fn list_sessions(&self, user_id: Option<&str>)
        -> Result<Vec<SessionSummary>, BackendError>;

    async fn load_history(&self, session_id: &str) -> Result<Vec<HistoryMessage>, BackendError>;
}

/// Offline backend that answers every message locally.
pub struct StubBackend;

#[async_trait]
impl CoachBackend for StubBackend {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, BackendError> {
        let agent_logs = vec![
            AgentTraceStep {
                source_agent_name: "Intake Specialist".into(),
                status: TraceStatus::Complete,
                reasoning_text: format!("Read {} characters of input", request.message.len()),
                result_summary: None,
            },
            AgentTraceStep {
                source_agent_name: "Care Manager".into(),
                status: TraceStatus::Complete,
                reasoning_text: "Response synthesized.".into(),
                result_summary: None,
            },
        ];
        Ok(ChatResponse {
            response: format!("[stub:{}] {}", request.session_id, request.message),
            agent_logs: Some(agent_logs),
            action_plan: None,
        })
    }

    async fn list_sessions(
        &self,
        _user_id: Option<&str>,
    ) -> Result<Vec<SessionSummary>, BackendError> {
        Ok(vec![])
    }

    async fn load_history(&self, _session_id: &str) -> Result<Vec<HistoryMessage>, BackendError> {
        Ok(vec![])
    }
}
