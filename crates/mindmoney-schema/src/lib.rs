pub mod form;
mod lenient;
pub mod wire;

pub use form::*;
pub use wire::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// History rows use "ai" in some older clients; anything that is not the
    /// user is treated as the assistant.
    pub fn from_label(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("user") {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

/// One message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub attached_plan: Option<ActionPlanPayload>,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            text: text.into(),
            attached_plan: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(
        id: impl Into<String>,
        text: impl Into<String>,
        attached_plan: Option<ActionPlanPayload>,
    ) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            text: text.into(),
            attached_plan,
            created_at: Utc::now(),
        }
    }

    pub fn to_history(&self) -> HistoryMessage {
        HistoryMessage {
            role: self.role.as_str().to_string(),
            content: self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl From<String> for Difficulty {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

impl From<Difficulty> for String {
    fn from(value: Difficulty) -> Self {
        value.as_str().to_string()
    }
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// 1-3 urgency derived from a free-text deadline.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct PriorityScore(u8);

impl PriorityScore {
    pub const HIGH: Self = Self(3);
    pub const MEDIUM: Self = Self(2);
    pub const LOW: Self = Self(1);

    /// Case-sensitive substring match: "week" wins over "month".
    pub fn from_deadline(deadline: &str) -> Self {
        if deadline.contains("week") {
            Self::HIGH
        } else if deadline.contains("month") {
            Self::MEDIUM
        } else {
            Self::LOW
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

/// An action as proposed by the backend, before it becomes an [`ActionItem`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposedAction {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub deadline: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub expected_impact: String,
}

/// A tracked action on the dashboard.
///
/// The priority is always recomputed from the deadline, including when an
/// item is read back from storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "StoredActionItem")]
pub struct ActionItem {
    pub id: String,
    #[serde(rename = "action")]
    pub description: String,
    #[serde(rename = "expected_impact")]
    pub impact_summary: String,
    pub difficulty: Difficulty,
    #[serde(rename = "deadline")]
    pub deadline_label: String,
    #[serde(rename = "isCompleted")]
    pub is_completed: bool,
    #[serde(rename = "priorityScore")]
    priority_score: PriorityScore,
}

impl ActionItem {
    pub fn from_proposal(id: impl Into<String>, proposal: ProposedAction) -> Self {
        let priority_score = PriorityScore::from_deadline(&proposal.deadline);
        Self {
            id: id.into(),
            description: proposal.action,
            impact_summary: proposal.expected_impact,
            difficulty: proposal.difficulty,
            deadline_label: proposal.deadline,
            is_completed: false,
            priority_score,
        }
    }

    pub fn priority_score(&self) -> PriorityScore {
        self.priority_score
    }

    pub fn toggle(&mut self) {
        self.is_completed = !self.is_completed;
    }
}

#[derive(Deserialize)]
struct StoredActionItem {
    id: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    expected_impact: String,
    #[serde(default)]
    difficulty: Difficulty,
    #[serde(default)]
    deadline: String,
    #[serde(rename = "isCompleted", default)]
    is_completed: bool,
}

impl From<StoredActionItem> for ActionItem {
    fn from(stored: StoredActionItem) -> Self {
        let mut item = ActionItem::from_proposal(
            stored.id,
            ProposedAction {
                action: stored.action,
                deadline: stored.deadline,
                difficulty: stored.difficulty,
                expected_impact: stored.expected_impact,
            },
        );
        item.is_completed = stored.is_completed;
        item
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum TraceStatus {
    Active,
    Complete,
    Failed,
}

impl From<String> for TraceStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "complete" | "completed" | "done" => TraceStatus::Complete,
            "failed" | "error" => TraceStatus::Failed,
            _ => TraceStatus::Active,
        }
    }
}

impl From<TraceStatus> for String {
    fn from(value: TraceStatus) -> Self {
        match value {
            TraceStatus::Active => "active",
            TraceStatus::Complete => "complete",
            TraceStatus::Failed => "failed",
        }
        .to_string()
    }
}

fn default_trace_status() -> TraceStatus {
    TraceStatus::Complete
}

/// One reasoning step reported by a backend agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentTraceStep {
    #[serde(rename = "agent", default)]
    pub source_agent_name: String,
    #[serde(default = "default_trace_status")]
    pub status: TraceStatus,
    #[serde(rename = "thought", default)]
    pub reasoning_text: String,
    #[serde(rename = "output", default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
}

/// Structured part of an assistant response.
///
/// Fields of the wrong shape decode as `None` (or drop the offending entries)
/// rather than failing the response they arrive in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ActionPlanPayload {
    #[serde(
        default,
        deserialize_with = "lenient::list_of",
        skip_serializing_if = "Option::is_none"
    )]
    pub immediate_actions: Option<Vec<ProposedAction>>,
    #[serde(
        default,
        deserialize_with = "lenient::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub financial_planning_form: Option<ProfileFormSchema>,
    #[serde(
        default,
        deserialize_with = "lenient::string_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub quick_wins: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "lenient::health_score",
        skip_serializing_if = "Option::is_none"
    )]
    pub financial_health_score: Option<u8>,
}

impl ActionPlanPayload {
    pub fn is_empty(&self) -> bool {
        self.immediate_actions.is_none()
            && self.financial_planning_form.is_none()
            && self.quick_wins.is_none()
            && self.financial_health_score.is_none()
    }
}
