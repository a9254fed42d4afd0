use std::{collections::HashMap, sync::Arc};

use shared::domain::{Rfq, RfqId, UserId};
use tokio::sync::RwLock;
use tracing::debug;

/// Process-local RFQ store. Contents are lost when the process exits and
/// concurrent writers to the same id resolve last-write-wins.
#[derive(Clone, Default)]
pub struct Storage {
    rfqs: Arc<RwLock<HashMap<RfqId, Rfq>>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_rfq(&self, rfq: Rfq) -> Rfq {
        debug!(rfq_id = %rfq.id, user_id = %rfq.user_id.0, "storing rfq");
        self.rfqs.write().await.insert(rfq.id, rfq.clone());
        rfq
    }

    pub async fn load_rfq(&self, rfq_id: RfqId) -> Option<Rfq> {
        self.rfqs.read().await.get(&rfq_id).cloned()
    }

    /// Newest first.
    pub async fn list_rfqs_for_user(&self, user_id: &UserId) -> Vec<Rfq> {
        let mut rfqs: Vec<Rfq> = self
            .rfqs
            .read()
            .await
            .values()
            .filter(|rfq| &rfq.user_id == user_id)
            .cloned()
            .collect();
        rfqs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rfqs
    }

    /// Applies `apply` to the stored record under the write lock and returns
    /// the updated copy, or `None` when the id is unknown.
    pub async fn update_rfq<F>(&self, rfq_id: RfqId, apply: F) -> Option<Rfq>
    where
        F: FnOnce(&mut Rfq),
    {
        let mut rfqs = self.rfqs.write().await;
        let rfq = rfqs.get_mut(&rfq_id)?;
        apply(rfq);
        rfq.updated_at = chrono::Utc::now();
        Some(rfq.clone())
    }

    pub async fn delete_rfq(&self, rfq_id: RfqId) -> Option<Rfq> {
        let removed = self.rfqs.write().await.remove(&rfq_id);
        if removed.is_some() {
            debug!(%rfq_id, "deleted rfq");
        }
        removed
    }

    pub async fn rfq_count(&self) -> usize {
        self.rfqs.read().await.len()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
