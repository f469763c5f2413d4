use common::domain::{
    CanonicalCheckin, CheckinRepository, CreateCheckinRepoInput, DedupKey, DedupStrategy,
    DomainError, IngestError, RawTransaction, ResolvedIdentity,
};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Duplicate,
    Unmapped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Ingested(CanonicalCheckin),
    Skipped(SkipReason),
}

/// Writes canonical check-ins for resolved transactions
pub struct CheckinIngestor {
    checkins: Arc<dyn CheckinRepository>,
    strategy: DedupStrategy,
}

impl CheckinIngestor {
    pub fn new(checkins: Arc<dyn CheckinRepository>, strategy: DedupStrategy) -> Self {
        Self { checkins, strategy }
    }

    /// A dedup key collision is a `Skipped(Duplicate)` outcome. Any other
    /// storage error is a persistence failure.
    #[instrument(skip(self, txn, identity), fields(employee_code = %txn.employee_code))]
    pub async fn ingest(
        &self,
        txn: &RawTransaction,
        identity: &ResolvedIdentity,
    ) -> Result<IngestOutcome, IngestError> {
        let Some(personnel_id) = identity.personnel_id.clone() else {
            return Ok(IngestOutcome::Skipped(SkipReason::Unmapped));
        };

        let input = CreateCheckinRepoInput {
            checkin_id: xid::new().to_string(),
            personnel_id,
            employee_code: txn.employee_code.clone(),
            punch_time: txn.punch_time,
            log_type: txn.log_type,
            source_device_id: txn.device_id.clone(),
            device_transaction_id: txn.device_transaction_id.clone(),
            dedup_key: DedupKey::derive(txn, self.strategy),
        };

        match self.checkins.create_checkin(input).await {
            Ok(checkin) => Ok(IngestOutcome::Ingested(checkin)),
            Err(DomainError::CheckinAlreadyExists(key)) => {
                debug!(dedup_key = %key, "Check-in already stored");
                Ok(IngestOutcome::Skipped(SkipReason::Duplicate))
            }
            Err(e) => Err(IngestError::PersistenceFailure(e)),
        }
    }
}
