use std::sync::Arc;

use mindmoney_memory::{load_json, save_json, KeyValueStore};
use mindmoney_schema::{ActionItem, ActionPlanPayload, ProfileFormSchema};
use tokio::sync::RwLock;

use crate::IdGenerator;

/// Storage key for the tracked action list.
pub const ACTIONS_KEY: &str = "mindmoney_actions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlanProgress {
    pub completed: usize,
    pub total: usize,
    /// Rounded to the nearest whole percent; 0 when there are no items.
    pub percent: u8,
}

#[derive(Debug, Default)]
struct PlanState {
    items: Vec<ActionItem>,
    form_schema: Option<ProfileFormSchema>,
}

/// Tracked action items plus the most recent profile form schema.
///
/// Every change to the item list is written through to durable storage.
/// Storage failures are logged and never surface to callers; the in-memory
/// list stays authoritative for the running process.
pub struct ActionPlanStore {
    state: RwLock<PlanState>,
    storage: Arc<dyn KeyValueStore>,
    ids: Arc<dyn IdGenerator>,
}

impl ActionPlanStore {
    /// Opens the store and loads any previously persisted items.
    pub async fn open(storage: Arc<dyn KeyValueStore>, ids: Arc<dyn IdGenerator>) -> Self {
        let items = load_persisted(storage.as_ref()).await;
        tracing::debug!(count = items.len(), "loaded persisted action items");
        Self {
            state: RwLock::new(PlanState {
                items,
                form_schema: None,
            }),
            storage,
            ids,
        }
    }

    /// Folds a backend plan into the store.
    ///
    /// A schema replaces the previous one. Proposed actions become new
    /// incomplete items placed ahead of the existing ones, in payload order.
    /// Items are never de-duplicated, so merging the same payload twice
    /// tracks each action twice.
    pub async fn merge_plan(&self, payload: &ActionPlanPayload) {
        let mut state = self.state.write().await;

        if let Some(schema) = &payload.financial_planning_form {
            state.form_schema = Some(schema.clone());
        }

        let Some(proposals) = &payload.immediate_actions else {
            return;
        };

        let mut merged: Vec<ActionItem> = proposals
            .iter()
            .cloned()
            .map(|proposal| ActionItem::from_proposal(self.ids.next_id(), proposal))
            .collect();
        merged.append(&mut state.items);
        state.items = merged;

        tracing::info!(
            added = proposals.len(),
            total = state.items.len(),
            "merged action plan"
        );
        self.persist(&state.items).await;
    }

    /// Flips one item's completion flag. Unknown ids are ignored.
    ///
    /// Returns whether an item was found.
    pub async fn toggle_completion(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(item) = state.items.iter_mut().find(|item| item.id == id) else {
            tracing::debug!(id, "toggle requested for unknown action item");
            return false;
        };
        item.toggle();
        self.persist(&state.items).await;
        true
    }

    pub async fn items(&self) -> Vec<ActionItem> {
        self.state.read().await.items.clone()
    }

    /// Dashboard order: open items first, then by priority, highest first.
    /// Items that tie keep their stored order.
    pub async fn sorted_items(&self) -> Vec<ActionItem> {
        let mut items = self.items().await;
        items.sort_by(|a, b| {
            a.is_completed
                .cmp(&b.is_completed)
                .then_with(|| b.priority_score().cmp(&a.priority_score()))
        });
        items
    }

    pub async fn progress(&self) -> PlanProgress {
        let state = self.state.read().await;
        let total = state.items.len();
        let completed = state.items.iter().filter(|item| item.is_completed).count();
        let percent = if total == 0 {
            0
        } else {
            (completed as f64 / total as f64 * 100.0).round() as u8
        };
        PlanProgress {
            completed,
            total,
            percent,
        }
    }

    pub async fn form_schema(&self) -> Option<ProfileFormSchema> {
        self.state.read().await.form_schema.clone()
    }

    // Called with the write lock held so writes land in mutation order.
    async fn persist(&self, items: &[ActionItem]) {
        if let Err(err) = save_json(self.storage.as_ref(), ACTIONS_KEY, items).await {
            tracing::warn!(error = %err, "failed to persist action items");
        }
    }
}

async fn load_persisted(storage: &dyn KeyValueStore) -> Vec<ActionItem> {
    match load_json::<Vec<ActionItem>>(storage, ACTIONS_KEY).await {
        Ok(Some(items)) => items,
        Ok(None) => Vec::new(),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable persisted action items");
            Vec::new()
        }
    }
}
