//! Request and response bodies for the chat and session history APIs.

use serde::{Deserialize, Serialize};

use crate::{lenient, ActionPlanPayload, AgentTraceStep};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<HistoryMessage>,
    pub session_id: String,
}

/// Every field is optional on the wire. Missing logs mean zero trace steps and
/// a missing plan means nothing to merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChatResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default, deserialize_with = "lenient::list_of")]
    pub agent_logs: Option<Vec<AgentTraceStep>>,
    /// A plan that cannot be decoded at all is logged and dropped; the reply
    /// text still goes through.
    #[serde(default, deserialize_with = "lenient::action_plan")]
    pub action_plan: Option<ActionPlanPayload>,
}

impl ChatResponse {
    pub fn trace_steps(&self) -> Vec<AgentTraceStep> {
        self.agent_logs.clone().unwrap_or_default()
    }

    /// The plan, if it carries anything. The backend sends `{}` when no plan
    /// was produced.
    pub fn plan(&self) -> Option<&ActionPlanPayload> {
        self.action_plan.as_ref().filter(|plan| !plan.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SessionList {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SessionHistory {
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}
