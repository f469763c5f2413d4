use common::domain::{CheckinRepository, DedupKey, DedupStrategy, DomainResult, RawTransaction};
use std::sync::Arc;

/// Answers "already ingested?" against the canonical check-in store. There is
/// no separate mark step: the check-in insert claims the key, and the unique
/// index settles races between processes.
pub struct DedupStore {
    checkins: Arc<dyn CheckinRepository>,
    strategy: DedupStrategy,
}

impl DedupStore {
    pub fn new(checkins: Arc<dyn CheckinRepository>, strategy: DedupStrategy) -> Self {
        Self { checkins, strategy }
    }

    pub fn key_for(&self, txn: &RawTransaction) -> DedupKey {
        DedupKey::derive(txn, self.strategy)
    }

    pub async fn is_new(&self, key: &DedupKey) -> DomainResult<bool> {
        Ok(!self.checkins.checkin_exists(key).await?)
    }
}
