use mindmoney_schema::{ChatTurn, HistoryMessage};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct ConversationState {
    turns: Vec<ChatTurn>,
    busy: bool,
}

/// Ordered chat transcript plus the "request in flight" flag.
#[derive(Debug, Default)]
pub struct ConversationStore {
    state: RwLock<ConversationState>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_turns(turns: Vec<ChatTurn>) -> Self {
        Self {
            state: RwLock::new(ConversationState { turns, busy: false }),
        }
    }

    pub async fn append(&self, turn: ChatTurn) {
        self.state.write().await.turns.push(turn);
    }

    /// Swap the whole transcript, e.g. when a past session is restored.
    pub async fn replace_all(&self, turns: Vec<ChatTurn>) {
        self.state.write().await.turns = turns;
    }

    /// Like [`replace_all`](Self::replace_all) but refuses while a request is
    /// in flight. Returns whether the transcript was replaced.
    pub async fn replace_if_idle(&self, turns: Vec<ChatTurn>) -> bool {
        let mut state = self.state.write().await;
        if state.busy {
            return false;
        }
        state.turns = turns;
        true
    }

    pub async fn set_busy(&self, busy: bool) {
        self.state.write().await.busy = busy;
    }

    pub async fn is_busy(&self) -> bool {
        self.state.read().await.busy
    }

    pub async fn turns(&self) -> Vec<ChatTurn> {
        self.state.read().await.turns.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.turns.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.turns.is_empty()
    }

    pub async fn history(&self) -> Vec<HistoryMessage> {
        self.state
            .read()
            .await
            .turns
            .iter()
            .map(ChatTurn::to_history)
            .collect()
    }

    /// Appends the user's turn and marks the store busy in one step.
    ///
    /// Returns the history as it was before the new turn, or `None` when a
    /// request is already in flight (nothing is appended in that case).
    pub async fn start_exchange(&self, user_turn: ChatTurn) -> Option<Vec<HistoryMessage>> {
        let mut state = self.state.write().await;
        if state.busy {
            return None;
        }
        let history = state.turns.iter().map(ChatTurn::to_history).collect();
        state.turns.push(user_turn);
        state.busy = true;
        Some(history)
    }

    /// Appends the reply and clears the busy flag, unless `closed` has fired.
    ///
    /// The token is checked while the write lock is held, so a caller that
    /// cancels and then calls [`wait_for_writers`](Self::wait_for_writers)
    /// never sees a reply land afterwards. Returns whether the reply was
    /// recorded.
    pub async fn finish_exchange_unless(
        &self,
        reply: ChatTurn,
        closed: &CancellationToken,
    ) -> bool {
        let mut state = self.state.write().await;
        if closed.is_cancelled() {
            return false;
        }
        state.busy = false;
        state.turns.push(reply);
        true
    }

    /// Waits until no writer holds the transcript.
    pub async fn wait_for_writers(&self) {
        drop(self.state.write().await);
    }
}
