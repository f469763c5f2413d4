use crate::domain::{DomainError, DomainResult, SyncRunRepository, SyncRunStatus, SyncRunSummary, SyncTrigger};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// Sync run row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct SyncRunRow {
    pub run_id: String,
    pub trigger: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched_count: i64,
    pub ingested_count: i64,
    pub duplicate_count: i64,
    pub unmapped_count: i64,
    pub malformed_count: i64,
    pub error: Option<String>,
}

impl SyncRunRow {
    fn from_row(row: &Row) -> Self {
        Self {
            run_id: row.get(0),
            trigger: row.get(1),
            status: row.get(2),
            started_at: row.get(3),
            finished_at: row.get(4),
            fetched_count: row.get(5),
            ingested_count: row.get(6),
            duplicate_count: row.get(7),
            unmapped_count: row.get(8),
            malformed_count: row.get(9),
            error: row.get(10),
        }
    }
}

fn to_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_count(value: i64) -> u64 {
    value.max(0) as u64
}

impl TryFrom<SyncRunRow> for SyncRunSummary {
    type Error = DomainError;

    fn try_from(row: SyncRunRow) -> Result<Self, Self::Error> {
        let trigger: SyncTrigger =
            row.trigger
                .parse()
                .map_err(|_| DomainError::InvalidStoredValue {
                    field: "sync_runs.trigger",
                    value: row.trigger.clone(),
                })?;
        let status: SyncRunStatus =
            row.status
                .parse()
                .map_err(|_| DomainError::InvalidStoredValue {
                    field: "sync_runs.status",
                    value: row.status.clone(),
                })?;

        Ok(SyncRunSummary {
            run_id: row.run_id,
            trigger,
            status,
            started_at: row.started_at,
            finished_at: row.finished_at,
            fetched_count: from_count(row.fetched_count),
            ingested_count: from_count(row.ingested_count),
            duplicate_count: from_count(row.duplicate_count),
            unmapped_count: from_count(row.unmapped_count),
            malformed_count: from_count(row.malformed_count),
            error: row.error,
        })
    }
}

const SYNC_RUN_COLUMNS: &str = "run_id, trigger, status, started_at, finished_at, fetched_count, \
     ingested_count, duplicate_count, unmapped_count, malformed_count, error";

#[derive(Clone)]
pub struct PostgresSyncRunRepository {
    client: PostgresClient,
}

impl PostgresSyncRunRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SyncRunRepository for PostgresSyncRunRepository {
    #[instrument(skip(self, summary), fields(run_id = %summary.run_id, status = summary.status.as_str()))]
    async fn append_run(&self, summary: &SyncRunSummary) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            "INSERT INTO sync_runs (run_id, trigger, status, started_at, finished_at, fetched_count,
                                    ingested_count, duplicate_count, unmapped_count, malformed_count, error)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            &[
                &summary.run_id,
                &summary.trigger.as_str(),
                &summary.status.as_str(),
                &summary.started_at,
                &summary.finished_at,
                &to_count(summary.fetched_count),
                &to_count(summary.ingested_count),
                &to_count(summary.duplicate_count),
                &to_count(summary.unmapped_count),
                &to_count(summary.malformed_count),
                &summary.error,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("Sync run recorded");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn latest_run(&self) -> DomainResult<Option<SyncRunSummary>> {
        Ok(self.list_recent_runs(1).await?.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn list_recent_runs(&self, limit: usize) -> DomainResult<Vec<SyncRunSummary>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM sync_runs ORDER BY started_at DESC, run_id DESC LIMIT $1",
            SYNC_RUN_COLUMNS
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = conn
            .query(&query, &[&limit])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        rows.iter()
            .map(|row| SyncRunSummary::try_from(SyncRunRow::from_row(row)))
            .collect()
    }
}
