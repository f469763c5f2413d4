use crate::domain::{
    AcquireOutcome, DomainError, DomainResult, SyncPhase, SyncState, SyncStateRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

/// PostgreSQL implementation of SyncStateRepository.
/// A single seeded row (`id = 1`) holds the phase. Acquisition is one
/// conditional UPDATE so concurrent engines cannot both win.
#[derive(Clone)]
pub struct PostgresSyncStateRepository {
    client: PostgresClient,
}

impl PostgresSyncStateRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

fn parse_phase(value: String) -> DomainResult<SyncPhase> {
    value.parse().map_err(|_| DomainError::InvalidStoredValue {
        field: "sync_state.phase",
        value,
    })
}

#[async_trait]
impl SyncStateRepository for PostgresSyncStateRepository {
    #[instrument(skip(self), fields(run_id = %run_id))]
    async fn try_acquire(
        &self,
        run_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> DomainResult<AcquireOutcome> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "WITH prev AS (
                    SELECT phase, run_id FROM sync_state WHERE id = 1 FOR UPDATE
                 )
                 UPDATE sync_state s
                 SET phase = 'running', run_id = $1, started_at = $2, updated_at = $2
                 FROM prev
                 WHERE s.id = 1
                   AND (s.phase = 'idle' OR s.started_at IS NULL OR s.started_at < $3)
                 RETURNING prev.phase, prev.run_id",
                &[&run_id, &now, &stale_before],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if let Some(row) = row {
            let previous_phase = parse_phase(row.get(0))?;
            let previous_run: Option<String> = row.get(1);

            let reclaimed_from = match previous_phase {
                SyncPhase::Running => previous_run,
                SyncPhase::Idle => None,
            };
            if let Some(stale_run) = &reclaimed_from {
                warn!(stale_run_id = %stale_run, "Reclaimed stale running sync state");
            }

            debug!("Sync state acquired");
            return Ok(AcquireOutcome::Acquired { reclaimed_from });
        }

        let current = self.current_state().await?;
        Ok(AcquireOutcome::Busy {
            run_id: current.run_id,
            started_at: current.started_at,
        })
    }

    #[instrument(skip(self), fields(run_id = %run_id))]
    async fn release(&self, run_id: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows_affected = conn
            .execute(
                "UPDATE sync_state SET phase = 'idle', updated_at = $2
                 WHERE id = 1 AND phase = 'running' AND run_id = $1",
                &[&run_id, &now],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if rows_affected == 0 {
            warn!("Sync state no longer held by this run, release skipped");
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn current_state(&self) -> DomainResult<SyncState> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT phase, run_id, started_at, updated_at FROM sync_state WHERE id = 1",
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .ok_or(DomainError::SyncStateMissing)?;

        Ok(SyncState {
            phase: parse_phase(row.get(0))?,
            run_id: row.get(1),
            started_at: row.get(2),
            updated_at: row.get(3),
        })
    }
}
