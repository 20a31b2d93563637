//! Staged reveal of the agent reasoning steps returned with a reply.
//!
//! Step `i` becomes visible `i × step_delay` after [`AgentTraceAnimator::play`]
//! and the reveal reports ready `len × step_delay + settle_delay` after it.
//! Every reveal runs under a child of the animator's root
//! [`CancellationToken`]; starting a new cycle cancels the previous one and
//! [`AgentTraceAnimator::shutdown`] cancels all of them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mindmoney_schema::AgentTraceStep;
use tokio::sync::{oneshot, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(400);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceTiming {
    pub step_delay: Duration,
    pub settle_delay: Duration,
}

impl Default for TraceTiming {
    fn default() -> Self {
        Self {
            step_delay: DEFAULT_STEP_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl TraceTiming {
    pub fn new(step_delay: Duration, settle_delay: Duration) -> Self {
        Self {
            step_delay,
            settle_delay,
        }
    }

    pub fn reveal_offset(&self, index: usize) -> Duration {
        self.step_delay.saturating_mul(index as u32)
    }

    pub fn ready_offset(&self, step_count: usize) -> Duration {
        self.reveal_offset(step_count)
            .saturating_add(self.settle_delay)
    }
}

/// Handle to one running reveal.
#[derive(Debug)]
pub struct TraceReveal {
    ready: oneshot::Receiver<()>,
}

impl TraceReveal {
    /// Resolves `true` once the final answer may be shown, `false` if the
    /// reveal was cancelled first.
    pub async fn wait(self) -> bool {
        self.ready.await.is_ok()
    }
}

pub struct AgentTraceAnimator {
    timing: TraceTiming,
    visible: Arc<RwLock<Vec<AgentTraceStep>>>,
    root: CancellationToken,
    cycle: Mutex<CancellationToken>,
}

impl Default for AgentTraceAnimator {
    fn default() -> Self {
        Self::new(TraceTiming::default())
    }
}

impl AgentTraceAnimator {
    pub fn new(timing: TraceTiming) -> Self {
        let root = CancellationToken::new();
        let cycle = Mutex::new(root.child_token());
        Self {
            timing,
            visible: Arc::new(RwLock::new(Vec::new())),
            root,
            cycle,
        }
    }

    pub fn timing(&self) -> TraceTiming {
        self.timing
    }

    /// Starts a new request cycle: any pending reveal is cancelled and the
    /// visible steps are cleared.
    pub async fn begin_cycle(&self) {
        self.clear().await;
    }

    pub async fn clear(&self) {
        self.cancel_pending();
        self.visible.write().await.clear();
    }

    /// Reveals `steps` in order on the configured schedule.
    ///
    /// Must be called from within a tokio runtime.
    pub fn play(&self, steps: Vec<AgentTraceStep>) -> TraceReveal {
        let token = self.root.child_token();
        {
            let mut cycle = self.cycle.lock().unwrap_or_else(|e| e.into_inner());
            cycle.cancel();
            *cycle = token.clone();
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let visible = Arc::clone(&self.visible);
        let timing = self.timing;

        tokio::spawn(async move {
            let started = Instant::now();
            let total = steps.len();

            for (index, step) in steps.into_iter().enumerate() {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    () = tokio::time::sleep_until(started + timing.reveal_offset(index)) => {}
                }

                let mut guard = visible.write().await;
                if token.is_cancelled() {
                    return;
                }
                tracing::debug!(index, agent = %step.source_agent_name, "revealing trace step");
                guard.push(step);
            }

            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep_until(started + timing.ready_offset(total)) => {
                    let _ = ready_tx.send(());
                }
            }
        });

        TraceReveal { ready: ready_rx }
    }

    pub async fn visible_steps(&self) -> Vec<AgentTraceStep> {
        self.visible.read().await.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancels every reveal. Once this returns no further steps are added.
    pub async fn shutdown(&self) {
        self.root.cancel();
        // Wait out any reveal that is mid-push; it re-checks the token under
        // this lock.
        drop(self.visible.write().await);
    }

    fn cancel_pending(&self) {
        self.cycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }
}
