use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mindmoney_core::*;
use mindmoney_memory::{KeyValueStore, MemoryKeyValueStore};
use mindmoney_provider::{BackendError, BackendErrorKind, CoachBackend};
use mindmoney_schema::{
    ActionPlanPayload, ChatRequest, ChatResponse, HistoryMessage, PriorityScore, Role,
    SessionSummary,
};
use tokio::time::Instant;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn credit_card_response() -> serde_json::Value {
    serde_json::json!({
        "response": "Let's start with the highest-interest balance.",
        "agent_logs": [
            {"agent": "Intake Specialist", "thought": "User reports credit card debt", "status": "complete"},
            {"agent": "Debt Analyst", "thought": "Prioritising by APR", "status": "complete", "output": "Avalanche method"},
            {"agent": "Care Manager", "thought": "Drafting plan", "status": "complete"}
        ],
        "action_plan": {
            "immediate_actions": [
                {
                    "action": "Call card issuer to request a lower APR",
                    "deadline": "This week",
                    "difficulty": "easy",
                    "expected_impact": "Cuts interest by ~5%"
                }
            ],
            "financial_planning_form": {
                "title": "Debt Profile",
                "description": "Help us understand your balances",
                "debts": {
                    "title": "Debts",
                    "fields": [
                        {"name": "balance", "type": "number", "label": "Total balance", "required": true, "unit": "USD"}
                    ]
                }
            }
        }
    })
}

fn decode(value: serde_json::Value) -> ChatResponse {
    serde_json::from_value(value).expect("valid chat response")
}

/// Replies with a fixed response after an optional delay and records every
/// request it receives.
struct ScriptedBackend {
    reply: serde_json::Value,
    delay: Duration,
    requests: Mutex<Vec<ChatRequest>>,
    history: Vec<HistoryMessage>,
}

impl ScriptedBackend {
    fn new(reply: serde_json::Value) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            history: Vec::new(),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CoachBackend for ScriptedBackend {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, BackendError> {
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(decode(self.reply.clone()))
    }

    async fn list_sessions(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<SessionSummary>, BackendError> {
        Ok(vec![SessionSummary {
            session_id: format!("sess-of-{}", user_id.unwrap_or("nobody")),
            preview: Some("credit card debt".into()),
            last_message_at: None,
            created_at: None,
        }])
    }

    async fn load_history(&self, _session_id: &str) -> Result<Vec<HistoryMessage>, BackendError> {
        Ok(self.history.clone())
    }
}

struct UnreachableBackend;

#[async_trait]
impl CoachBackend for UnreachableBackend {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, BackendError> {
        Err(BackendError::Connect("connection refused".into()))
    }

    async fn list_sessions(
        &self,
        _user_id: Option<&str>,
    ) -> Result<Vec<SessionSummary>, BackendError> {
        Err(BackendError::Connect("connection refused".into()))
    }

    async fn load_history(&self, _session_id: &str) -> Result<Vec<HistoryMessage>, BackendError> {
        Err(BackendError::Connect("connection refused".into()))
    }
}

struct HangingBackend;

#[async_trait]
impl CoachBackend for HangingBackend {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, BackendError> {
        std::future::pending().await
    }

    async fn list_sessions(
        &self,
        _user_id: Option<&str>,
    ) -> Result<Vec<SessionSummary>, BackendError> {
        std::future::pending().await
    }

    async fn load_history(&self, _session_id: &str) -> Result<Vec<HistoryMessage>, BackendError> {
        std::future::pending().await
    }
}

/// Storage whose writes take a full second.
struct SlowStore {
    inner: MemoryKeyValueStore,
}

#[async_trait]
impl KeyValueStore for SlowStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        tokio::time::sleep(ms(1000)).await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.remove(key).await
    }
}

async fn build_session(backend: Arc<dyn CoachBackend>, user_id: Option<&str>) -> ChatSession {
    build_session_with_storage(backend, user_id, Arc::new(MemoryKeyValueStore::new())).await
}

async fn build_session_with_storage(
    backend: Arc<dyn CoachBackend>,
    user_id: Option<&str>,
    storage: Arc<dyn KeyValueStore>,
) -> ChatSession {
    let plan = ActionPlanStore::open(storage, Arc::new(SequentialIds::new("item"))).await;
    let mut options = SessionOptions::new("sess-abc123xyz");
    options.user_id = user_id.map(str::to_owned);

    ChatSession::new(
        backend,
        Arc::new(ConversationStore::new()),
        Arc::new(plan),
        Arc::new(AgentTraceAnimator::new(TraceTiming::default())),
        options,
    )
    .with_turn_ids(Arc::new(SequentialIds::new("turn")))
}

fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed <= expected + ms(5),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn credit_card_debt_cycle() {
    let backend = Arc::new(ScriptedBackend::new(credit_card_response()));
    let session = build_session(backend.clone(), None).await;

    let start = Instant::now();
    let outcome = session.send("I have credit card debt").await.unwrap();
    // three steps at 400ms apart, then the settle delay
    assert_elapsed(start, ms(3 * 400 + 500));

    let SendOutcome::Answered(reply) = outcome else {
        panic!("expected an answer, got {outcome:?}");
    };
    assert_eq!(reply.text, "Let's start with the highest-interest balance.");

    let turns = session.conversation().turns().await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].text, "I have credit card debt");
    assert_eq!(turns[1].role, Role::Assistant);
    assert!(!session.conversation().is_busy().await);

    let expected_plan: ActionPlanPayload =
        serde_json::from_value(credit_card_response()["action_plan"].clone()).unwrap();
    assert_eq!(turns[1].attached_plan.as_ref(), Some(&expected_plan));

    let items = session.action_plan().items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].priority_score(), PriorityScore::HIGH);
    assert!(!items[0].is_completed);
    assert_eq!(
        session.action_plan().form_schema().await,
        expected_plan.financial_planning_form
    );

    let steps = session.animator().visible_steps().await;
    let agents: Vec<&str> = steps
        .iter()
        .map(|s| s.source_agent_name.as_str())
        .collect();
    assert_eq!(agents, vec!["Intake Specialist", "Debt Analyst", "Care Manager"]);

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].message, "I have credit card debt");
    assert_eq!(requests[0].session_id, "sess-abc123xyz");
    assert!(requests[0].history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn five_k_card_debt_scenario() {
    let reply = serde_json::json!({
        "response": "Let's tackle that $5k balance.",
        "agent_logs": [
            {"agent": "Intake Specialist", "thought": "User owes $5k on a credit card", "status": "complete"},
            {"agent": "Debt Analyst", "thought": "Checking the APR", "status": "complete"}
        ],
        "action_plan": {
            "immediate_actions": [
                {
                    "action": "List every card with its APR",
                    "deadline": "next week",
                    "difficulty": "easy",
                    "expected_impact": "Know where to focus"
                }
            ],
            "financial_planning_form": {
                "title": "Debt Profile",
                "debts": {
                    "title": "Debts",
                    "fields": [
                        {"name": "balance", "type": "number", "label": "Balance", "required": true}
                    ]
                }
            }
        }
    });
    let session = build_session(Arc::new(ScriptedBackend::new(reply.clone())), None).await;

    let start = Instant::now();
    let outcome = session
        .send("I have $5k in credit card debt")
        .await
        .unwrap();
    assert_elapsed(start, ms(2 * 400 + 500));
    assert!(matches!(outcome, SendOutcome::Answered(_)));

    let turns = session.conversation().turns().await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].text, "I have $5k in credit card debt");

    let items = session.action_plan().items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].deadline_label, "next week");
    assert_eq!(items[0].priority_score(), PriorityScore::HIGH);
    assert_eq!(items[0].priority_score().value(), 3);

    let expected_plan: ActionPlanPayload =
        serde_json::from_value(reply["action_plan"].clone()).unwrap();
    assert!(expected_plan.financial_planning_form.is_some());
    assert_eq!(
        session.action_plan().form_schema().await,
        expected_plan.financial_planning_form
    );
    assert_eq!(session.animator().visible_steps().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn oddly_typed_plan_fields_still_answer() {
    let reply = serde_json::json!({
        "response": "Here is your plan.",
        "action_plan": {
            "financial_health_score": 72.5,
            "quick_wins": ["Cancel unused subscriptions", 3, {"tip": "nested"}],
            "immediate_actions": [
                {"action": "Set up autopay", "deadline": "This week"}
            ]
        }
    });
    let session = build_session(Arc::new(ScriptedBackend::new(reply)), None).await;

    let outcome = session.send("help").await.unwrap();
    let SendOutcome::Answered(answer) = outcome else {
        panic!("expected an answer, got {outcome:?}");
    };
    assert_eq!(answer.text, "Here is your plan.");
    let plan = answer.attached_plan.expect("plan attached");
    assert_eq!(plan.financial_health_score, Some(73));
    assert_eq!(
        plan.quick_wins,
        Some(vec!["Cancel unused subscriptions".to_string(), "3".to_string()])
    );
    assert_eq!(session.action_plan().items().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn history_excludes_the_message_being_sent() {
    let backend = Arc::new(ScriptedBackend::new(serde_json::json!({"response": "ok"})));
    let session = build_session(backend.clone(), None).await;

    session.send("first").await.unwrap();
    session.send("second").await.unwrap();

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    let history: Vec<(&str, &str)> = requests[1]
        .history
        .iter()
        .map(|m| (m.role.as_str(), m.content.as_str()))
        .collect();
    assert_eq!(history, vec![("user", "first"), ("assistant", "ok")]);
    assert_eq!(session.conversation().len().await, 4);
}

#[tokio::test(start_paused = true)]
async fn reply_without_trace_waits_for_settle_only() {
    let backend = Arc::new(ScriptedBackend::new(
        serde_json::json!({"response": "Noted.", "action_plan": {}}),
    ));
    let session = build_session(backend, None).await;

    let start = Instant::now();
    let outcome = session.send("thanks").await.unwrap();
    assert_elapsed(start, ms(500));

    let SendOutcome::Answered(reply) = outcome else {
        panic!("expected an answer, got {outcome:?}");
    };
    assert!(reply.attached_plan.is_none());
    assert!(session.action_plan().items().await.is_empty());
    assert!(session.animator().visible_steps().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn repeated_plans_are_tracked_twice() {
    let backend = Arc::new(ScriptedBackend::new(credit_card_response()));
    let session = build_session(backend, None).await;

    session.send("I have credit card debt").await.unwrap();
    session.send("same again").await.unwrap();

    let items = session.action_plan().items().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].description, items[1].description);
    assert_ne!(items[0].id, items[1].id);
}

#[tokio::test(start_paused = true)]
async fn unreachable_backend_yields_apology() {
    let session = build_session(Arc::new(UnreachableBackend), None).await;

    let outcome = session.send("hello").await.unwrap();
    let SendOutcome::Failed { reply, error } = outcome else {
        panic!("expected a failure, got {outcome:?}");
    };
    assert_eq!(reply.text, CONNECTION_APOLOGY);
    assert_eq!(error.kind(), BackendErrorKind::Connect);

    let turns = session.conversation().turns().await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].text, CONNECTION_APOLOGY);
    assert!(turns[1].attached_plan.is_none());
    assert!(!session.conversation().is_busy().await);
    assert!(session.animator().visible_steps().await.is_empty());
    assert!(session.action_plan().items().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn hung_backend_times_out() {
    let session = build_session(Arc::new(HangingBackend), None).await;

    let start = Instant::now();
    let outcome = session.send("hello").await.unwrap();
    assert_elapsed(start, DEFAULT_REQUEST_TIMEOUT);

    let SendOutcome::Failed { reply, error } = outcome else {
        panic!("expected a failure, got {outcome:?}");
    };
    assert_eq!(reply.text, CONNECTION_APOLOGY);
    assert_eq!(error.kind(), BackendErrorKind::Timeout);
    assert!(!session.conversation().is_busy().await);
}

#[tokio::test(start_paused = true)]
async fn second_send_while_busy_is_rejected() {
    let backend = Arc::new(ScriptedBackend::new(credit_card_response()).with_delay(ms(1000)));
    let session = Arc::new(build_session(backend.clone(), None).await);

    let first = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send("first").await }
    });
    tokio::time::sleep(ms(10)).await;
    assert!(session.conversation().is_busy().await);

    assert!(matches!(session.send("second").await, Err(SendError::Busy)));

    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, SendOutcome::Answered(_)));
    assert_eq!(session.conversation().len().await, 2);
    assert_eq!(backend.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_request_records_nothing_more() {
    let backend = Arc::new(ScriptedBackend::new(credit_card_response()).with_delay(ms(1000)));
    let session = Arc::new(build_session(backend, None).await);

    let pending = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send("first").await }
    });
    tokio::time::sleep(ms(10)).await;
    session.shutdown().await;

    assert!(matches!(
        pending.await.unwrap().unwrap(),
        SendOutcome::Cancelled
    ));
    tokio::time::sleep(ms(5000)).await;
    assert_eq!(session.conversation().len().await, 1);
    assert!(session.action_plan().items().await.is_empty());
    assert!(session.animator().visible_steps().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_while_plan_persists_records_nothing_more() {
    let reply = serde_json::json!({
        "response": "Start with the smallest balance.",
        "action_plan": {
            "immediate_actions": [{"action": "Pay $50 extra", "deadline": "Today"}]
        }
    });
    let storage = Arc::new(SlowStore {
        inner: MemoryKeyValueStore::new(),
    });
    let session = Arc::new(
        build_session_with_storage(Arc::new(ScriptedBackend::new(reply)), None, storage).await,
    );

    let pending = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send("where do I start?").await }
    });
    // the reveal is ready at 500ms; the plan write is still running at 600ms
    tokio::time::sleep(ms(600)).await;
    session.shutdown().await;
    assert_eq!(session.conversation().len().await, 1);

    assert!(matches!(
        pending.await.unwrap().unwrap(),
        SendOutcome::Cancelled
    ));
    tokio::time::sleep(ms(5000)).await;
    assert_eq!(session.conversation().len().await, 1);
    assert_eq!(session.conversation().turns().await[0].role, Role::User);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_reveal_freezes_trace() {
    let backend = Arc::new(ScriptedBackend::new(credit_card_response()));
    let session = Arc::new(build_session(backend, None).await);

    let pending = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send("I have credit card debt").await }
    });
    tokio::time::sleep(ms(500)).await;
    assert_eq!(session.animator().visible_steps().await.len(), 2);

    session.shutdown().await;
    assert!(matches!(
        pending.await.unwrap().unwrap(),
        SendOutcome::Cancelled
    ));

    tokio::time::sleep(ms(5000)).await;
    assert_eq!(session.animator().visible_steps().await.len(), 2);
    assert_eq!(session.conversation().len().await, 1);
    assert!(session.action_plan().items().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn restore_replaces_transcript_for_signed_in_user() {
    let backend = Arc::new(
        ScriptedBackend::new(serde_json::json!({"response": "ok"})).with_history(vec![
            HistoryMessage {
                role: "user".into(),
                content: "How do I budget?".into(),
            },
            HistoryMessage {
                role: "ai".into(),
                content: "Start with the 50/30/20 rule.".into(),
            },
        ]),
    );
    let session = build_session(backend, Some("user-7")).await;
    session.send("hello").await.unwrap();

    let restored = session.restore("sess-older0001").await.unwrap();
    assert_eq!(restored, 2);

    let turns = session.conversation().turns().await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].text, "How do I budget?");
    assert_eq!(turns[1].role, Role::Assistant);
    assert!(session.animator().visible_steps().await.is_empty());

    let sessions = session.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, "sess-of-user-7");
}

#[tokio::test(start_paused = true)]
async fn restore_is_refused_while_busy() {
    let backend = Arc::new(ScriptedBackend::new(credit_card_response()).with_delay(ms(1000)));
    let session = Arc::new(build_session(backend, Some("user-7")).await);

    let pending = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send("first").await }
    });
    tokio::time::sleep(ms(10)).await;

    assert!(matches!(
        session.restore("sess-older0001").await,
        Err(SessionError::Busy)
    ));
    pending.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn restore_failure_keeps_transcript() {
    let session = build_session(Arc::new(UnreachableBackend), Some("user-7")).await;
    session
        .conversation()
        .append(mindmoney_schema::ChatTurn::user("t0", "keep me"))
        .await;

    let err = session.restore("sess-older0001").await.unwrap_err();
    assert!(matches!(err, SessionError::Backend(_)));
    assert_eq!(session.conversation().len().await, 1);

    assert!(session.list_sessions().await.is_err());
}
