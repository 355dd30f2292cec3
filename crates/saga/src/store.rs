//! Saga state persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{PartnerId, SagaId};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::state::SagaState;

/// Keyed storage for saga state.
///
/// Saves are read-modify-write with no optimistic locking: two concurrent
/// saves for one saga silently overwrite each other (last write wins). The
/// orchestrator is the only writer, which keeps this acceptable in-process;
/// a multi-writer deployment would need versioned saves.
#[async_trait]
pub trait SagaStateStore: Send + Sync {
    /// Persists `state`, replacing any previous state for its saga id.
    async fn save(&self, state: &SagaState) -> Result<()>;

    /// Loads the state for `saga_id`.
    async fn get(&self, saga_id: SagaId) -> Result<Option<SagaState>>;

    /// Removes the state for `saga_id`, if present.
    async fn delete(&self, saga_id: SagaId) -> Result<()>;

    /// Loads the most recently updated saga for `partner_id`.
    async fn find_by_partner(&self, partner_id: PartnerId) -> Result<Option<SagaState>>;

    /// Every stored saga, oldest first.
    async fn list(&self) -> Result<Vec<SagaState>>;
}

/// In-memory state store behind one coarse lock.
#[derive(Clone, Default)]
pub struct InMemorySagaStateStore {
    sagas: Arc<RwLock<HashMap<SagaId, SagaState>>>,
}

impl InMemorySagaStateStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sagas.
    pub async fn saga_count(&self) -> usize {
        self.sagas.read().await.len()
    }
}

#[async_trait]
impl SagaStateStore for InMemorySagaStateStore {
    async fn save(&self, state: &SagaState) -> Result<()> {
        self.sagas
            .write()
            .await
            .insert(state.saga_id, state.clone());
        Ok(())
    }

    async fn get(&self, saga_id: SagaId) -> Result<Option<SagaState>> {
        Ok(self.sagas.read().await.get(&saga_id).cloned())
    }

    async fn delete(&self, saga_id: SagaId) -> Result<()> {
        self.sagas.write().await.remove(&saga_id);
        Ok(())
    }

    async fn find_by_partner(&self, partner_id: PartnerId) -> Result<Option<SagaState>> {
        let sagas = self.sagas.read().await;
        Ok(sagas
            .values()
            .filter(|state| state.partner_id == partner_id)
            .max_by_key(|state| state.updated_at)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<SagaState>> {
        let sagas = self.sagas.read().await;
        let mut all: Vec<_> = sagas.values().cloned().collect();
        all.sort_by_key(|state| state.created_at);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CorrelationId;

    fn new_state(partner_id: PartnerId) -> SagaState {
        SagaState::new(partner_id, serde_json::json!({}), CorrelationId::new())
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = InMemorySagaStateStore::new();
        let state = new_state(PartnerId::new());

        store.save(&state).await.unwrap();

        let loaded = store.get(state.saga_id).await.unwrap().unwrap();
        assert_eq!(loaded.saga_id, state.saga_id);
        assert_eq!(store.saga_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = InMemorySagaStateStore::new();
        assert!(store.get(SagaId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_is_last_write_wins() {
        let store = InMemorySagaStateStore::new();
        let mut state = new_state(PartnerId::new());
        store.save(&state).await.unwrap();

        state.record_completed(common::OnboardingStep::RegisterPartner, None);
        store.save(&state).await.unwrap();

        let loaded = store.get(state.saga_id).await.unwrap().unwrap();
        assert_eq!(loaded.completed_steps.len(), 1);
        assert_eq!(store.saga_count().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemorySagaStateStore::new();
        let state = new_state(PartnerId::new());
        store.save(&state).await.unwrap();

        store.delete(state.saga_id).await.unwrap();
        assert!(store.get(state.saga_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_partner_prefers_most_recent() {
        let store = InMemorySagaStateStore::new();
        let partner_id = PartnerId::new();

        let older = new_state(partner_id);
        store.save(&older).await.unwrap();

        let mut newer = new_state(partner_id);
        newer.touch();
        store.save(&newer).await.unwrap();

        let found = store.find_by_partner(partner_id).await.unwrap().unwrap();
        assert_eq!(found.saga_id, newer.saga_id);

        assert!(
            store
                .find_by_partner(PartnerId::new())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_creation() {
        let store = InMemorySagaStateStore::new();
        let first = new_state(PartnerId::new());
        let second = new_state(PartnerId::new());
        store.save(&second).await.unwrap();
        store.save(&first).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at <= all[1].created_at);
    }
}
