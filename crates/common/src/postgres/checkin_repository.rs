use crate::domain::{
    CanonicalCheckin, CheckinRepository, CreateCheckinRepoInput, DedupKey, DomainError,
    DomainResult, LogType,
};
use crate::postgres::{is_unique_violation, PostgresClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// Check-in row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct CheckinRow {
    pub checkin_id: String,
    pub personnel_id: String,
    pub employee_code: String,
    pub punch_time: DateTime<Utc>,
    pub log_type: String,
    pub source_device_id: String,
    pub device_transaction_id: Option<String>,
    pub dedup_key: String,
    pub created_at: DateTime<Utc>,
}

impl CheckinRow {
    fn from_row(row: &Row) -> Self {
        Self {
            checkin_id: row.get(0),
            personnel_id: row.get(1),
            employee_code: row.get(2),
            punch_time: row.get(3),
            log_type: row.get(4),
            source_device_id: row.get(5),
            device_transaction_id: row.get(6),
            dedup_key: row.get(7),
            created_at: row.get(8),
        }
    }
}

impl TryFrom<CheckinRow> for CanonicalCheckin {
    type Error = DomainError;

    fn try_from(row: CheckinRow) -> Result<Self, Self::Error> {
        let log_type: LogType =
            row.log_type
                .parse()
                .map_err(|_| DomainError::InvalidStoredValue {
                    field: "checkins.log_type",
                    value: row.log_type.clone(),
                })?;

        Ok(CanonicalCheckin {
            checkin_id: row.checkin_id,
            personnel_id: row.personnel_id,
            employee_code: row.employee_code,
            punch_time: row.punch_time,
            log_type,
            source_device_id: row.source_device_id,
            device_transaction_id: row.device_transaction_id,
            dedup_key: DedupKey::from_stored(row.dedup_key),
            created_at: Some(row.created_at),
        })
    }
}

const CHECKIN_COLUMNS: &str = "checkin_id, personnel_id, employee_code, punch_time, log_type, \
     source_device_id, device_transaction_id, dedup_key, created_at";

/// PostgreSQL implementation of CheckinRepository.
/// The unique index on `dedup_key` is what makes ingestion idempotent across
/// processes.
#[derive(Clone)]
pub struct PostgresCheckinRepository {
    client: PostgresClient,
}

impl PostgresCheckinRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CheckinRepository for PostgresCheckinRepository {
    #[instrument(skip(self, input), fields(dedup_key = %input.dedup_key, personnel_id = %input.personnel_id))]
    async fn create_checkin(&self, input: CreateCheckinRepoInput) -> DomainResult<CanonicalCheckin> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let result = conn
            .execute(
                "INSERT INTO checkins (checkin_id, personnel_id, employee_code, punch_time, log_type,
                                       source_device_id, device_transaction_id, dedup_key, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &input.checkin_id,
                    &input.personnel_id,
                    &input.employee_code,
                    &input.punch_time,
                    &input.log_type.as_str(),
                    &input.source_device_id,
                    &input.device_transaction_id,
                    &input.dedup_key.as_str(),
                    &now,
                ],
            )
            .await;

        if let Err(e) = result {
            if is_unique_violation(&e) {
                return Err(DomainError::CheckinAlreadyExists(
                    input.dedup_key.to_string(),
                ));
            }
            return Err(DomainError::RepositoryError(e.into()));
        }

        debug!(checkin_id = %input.checkin_id, "Check-in created in database");

        Ok(CanonicalCheckin {
            checkin_id: input.checkin_id,
            personnel_id: input.personnel_id,
            employee_code: input.employee_code,
            punch_time: input.punch_time,
            log_type: input.log_type,
            source_device_id: input.source_device_id,
            device_transaction_id: input.device_transaction_id,
            dedup_key: input.dedup_key,
            created_at: Some(now),
        })
    }

    #[instrument(skip(self), fields(dedup_key = %dedup_key))]
    async fn checkin_exists(&self, dedup_key: &DedupKey) -> DomainResult<bool> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM checkins WHERE dedup_key = $1)",
                &[&dedup_key.as_str()],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.get(0))
    }

    #[instrument(skip(self))]
    async fn list_checkins(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<CanonicalCheckin>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM checkins
             WHERE punch_time >= $1 AND punch_time < $2
             ORDER BY punch_time ASC, checkin_id ASC",
            CHECKIN_COLUMNS
        );

        let rows = conn
            .query(&query, &[&start, &end])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        rows.iter()
            .map(|row| CanonicalCheckin::try_from(CheckinRow::from_row(row)))
            .collect()
    }

    #[instrument(skip(self))]
    async fn count_checkins_since(&self, since: DateTime<Utc>) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_one(
                "SELECT COUNT(*) FROM checkins WHERE punch_time >= $1",
                &[&since],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }
}
