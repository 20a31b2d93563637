use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mindmoney_memory::{load_or_create_session_id, KeyValueStore, SqliteKeyValueStore};
use mindmoney_provider::{BackendError, CoachBackend};
use mindmoney_schema::{ChatRequest, ChatTurn, HistoryMessage, Role, SessionSummary};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    ActionPlanStore, AgentTraceAnimator, ConversationStore, IdGenerator, MindMoneyConfig,
    RandomIds, TimestampIds,
};

/// Reply shown when the backend cannot be reached or fails.
pub const CONNECTION_APOLOGY: &str =
    "I'm having trouble connecting to the financial brain. Please check the backend connection.";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// File name of the durable store inside the data dir.
pub const STORE_FILE: &str = "mindmoney.db";

#[derive(Debug, Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("a request is already in flight")]
    Busy,
    #[error("chat session is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a request is already in flight")]
    Busy,
    #[error("chat session is closed")]
    Closed,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug)]
pub enum SendOutcome {
    /// The reply was revealed and appended.
    Answered(ChatTurn),
    /// The backend failed; the apology turn was appended instead.
    Failed { reply: ChatTurn, error: BackendError },
    /// The session shut down mid-request. Nothing further was recorded.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub session_id: String,
    pub user_id: Option<String>,
    pub request_timeout: Duration,
}

impl SessionOptions {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// One chat session: drives a request cycle across the conversation, the
/// trace animator, and the action plan.
pub struct ChatSession {
    backend: Arc<dyn CoachBackend>,
    conversation: Arc<ConversationStore>,
    action_plan: Arc<ActionPlanStore>,
    animator: Arc<AgentTraceAnimator>,
    turn_ids: Arc<dyn IdGenerator>,
    options: SessionOptions,
    closed: CancellationToken,
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn CoachBackend>,
        conversation: Arc<ConversationStore>,
        action_plan: Arc<ActionPlanStore>,
        animator: Arc<AgentTraceAnimator>,
        options: SessionOptions,
    ) -> Self {
        Self {
            backend,
            conversation,
            action_plan,
            animator,
            turn_ids: Arc::new(TimestampIds::new()),
            options,
            closed: CancellationToken::new(),
        }
    }

    pub fn with_turn_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.turn_ids = ids;
        self
    }

    /// Wires a session from configuration: the durable store under the data
    /// dir, the tab-scoped session id, and the greeting turn.
    pub async fn open(
        config: &MindMoneyConfig,
        root: &Path,
        backend: Arc<dyn CoachBackend>,
        tab_store: &dyn KeyValueStore,
    ) -> Result<Self> {
        let store_path = config.data_dir(root).join(STORE_FILE);
        let storage: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::open(&store_path)?);
        let session_id = load_or_create_session_id(tab_store).await?;

        let turn_ids: Arc<dyn IdGenerator> = Arc::new(TimestampIds::new());
        let greeting = config.chat.greeting.trim();
        let conversation = if greeting.is_empty() {
            ConversationStore::new()
        } else {
            ConversationStore::with_turns(vec![ChatTurn::assistant(
                turn_ids.next_id(),
                greeting,
                None,
            )])
        };

        let action_plan = ActionPlanStore::open(storage, Arc::new(RandomIds)).await;
        let animator = AgentTraceAnimator::new(config.animation.timing());

        tracing::info!(
            session_id = %session_id,
            store = %store_path.display(),
            signed_in = config.user_id().is_some(),
            "chat session opened"
        );

        Ok(Self::new(
            backend,
            Arc::new(conversation),
            Arc::new(action_plan),
            Arc::new(animator),
            SessionOptions {
                session_id,
                user_id: config.user_id().map(str::to_owned),
                request_timeout: config.backend.request_timeout(),
            },
        )
        .with_turn_ids(turn_ids))
    }

    pub fn session_id(&self) -> &str {
        &self.options.session_id
    }

    pub fn user_present(&self) -> bool {
        self.options.user_id.is_some()
    }

    pub fn conversation(&self) -> &Arc<ConversationStore> {
        &self.conversation
    }

    pub fn action_plan(&self) -> &Arc<ActionPlanStore> {
        &self.action_plan
    }

    pub fn animator(&self) -> &Arc<AgentTraceAnimator> {
        &self.animator
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Runs one request cycle for `text`.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        let message = text.trim();
        if message.is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let user_turn = ChatTurn::user(self.turn_ids.next_id(), message);
        let Some(history) = self.conversation.start_exchange(user_turn).await else {
            return Err(SendError::Busy);
        };
        self.animator.begin_cycle().await;

        tracing::info!(
            session_id = %self.options.session_id,
            history = history.len(),
            "request cycle started"
        );

        let request = ChatRequest {
            message: message.to_string(),
            history,
            session_id: self.options.session_id.clone(),
        };

        let result = tokio::select! {
            biased;
            () = self.closed.cancelled() => return Ok(SendOutcome::Cancelled),
            result = self.call_backend(self.backend.chat(request)) => result,
        };

        let response = match result {
            Ok(response) => response,
            Err(error) => return Ok(self.fail(error).await),
        };

        let steps = response.trace_steps();
        let step_count = steps.len();
        if !self.animator.play(steps).wait().await || self.is_closed() {
            return Ok(SendOutcome::Cancelled);
        }

        let plan = response.plan().cloned();
        if let Some(plan) = &plan {
            tokio::select! {
                biased;
                () = self.closed.cancelled() => return Ok(SendOutcome::Cancelled),
                () = self.action_plan.merge_plan(plan) => {}
            }
        }
        let reply = ChatTurn::assistant(self.turn_ids.next_id(), response.response, plan);
        if !self
            .conversation
            .finish_exchange_unless(reply.clone(), &self.closed)
            .await
        {
            return Ok(SendOutcome::Cancelled);
        }

        tracing::info!(
            session_id = %self.options.session_id,
            steps = step_count,
            has_plan = reply.attached_plan.is_some(),
            "request cycle finished"
        );
        Ok(SendOutcome::Answered(reply))
    }

    /// Replaces the transcript with a stored session's history.
    ///
    /// Signed-out users have no stored sessions; this returns `Ok(0)` for them
    /// without contacting the backend.
    pub async fn restore(&self, session_id: &str) -> Result<usize, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        if !self.user_present() {
            tracing::debug!(session_id, "restore skipped: no signed-in user");
            return Ok(0);
        }
        if self.conversation.is_busy().await {
            return Err(SessionError::Busy);
        }

        let messages = self
            .call_backend(self.backend.load_history(session_id))
            .await?;
        let turns: Vec<ChatTurn> = messages
            .into_iter()
            .map(|message| self.restored_turn(message))
            .collect();
        let count = turns.len();

        if !self.conversation.replace_if_idle(turns).await {
            return Err(SessionError::Busy);
        }
        self.animator.clear().await;

        tracing::info!(session_id, turns = count, "restored session history");
        Ok(count)
    }

    /// Sessions stored for the signed-in user; empty when signed out.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let Some(user_id) = self.options.user_id.as_deref() else {
            return Ok(Vec::new());
        };
        Ok(self
            .call_backend(self.backend.list_sessions(Some(user_id)))
            .await?)
    }

    /// Cancels any in-flight request and reveal. Later sends fail with
    /// [`SendError::Closed`].
    ///
    /// Once this returns the transcript no longer changes.
    pub async fn shutdown(&self) {
        self.closed.cancel();
        self.animator.shutdown().await;
        self.conversation.wait_for_writers().await;
        tracing::info!(session_id = %self.options.session_id, "chat session closed");
    }

    async fn call_backend<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        let timeout = self.options.request_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(Err(BackendError::Timeout(timeout)))
    }

    async fn fail(&self, error: BackendError) -> SendOutcome {
        tracing::warn!(
            session_id = %self.options.session_id,
            error = %error,
            retryable = error.is_retryable(),
            "chat request failed"
        );
        self.animator.clear().await;
        let reply = ChatTurn::assistant(self.turn_ids.next_id(), CONNECTION_APOLOGY, None);
        if !self
            .conversation
            .finish_exchange_unless(reply.clone(), &self.closed)
            .await
        {
            return SendOutcome::Cancelled;
        }
        SendOutcome::Failed { reply, error }
    }

    fn restored_turn(&self, message: HistoryMessage) -> ChatTurn {
        let id = self.turn_ids.next_id();
        match Role::from_label(&message.role) {
            Role::User => ChatTurn::user(id, message.content),
            Role::Assistant => ChatTurn::assistant(id, message.content, None),
        }
    }
}
