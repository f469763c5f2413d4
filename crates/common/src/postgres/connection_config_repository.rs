use crate::domain::{ConnectionConfig, ConnectionConfigRepository, DomainError, DomainResult};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, info, instrument};

/// Connection config row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct ConnectionConfigRow {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub enabled: bool,
    pub poll_interval_seconds: i32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionConfigRow {
    fn from_row(row: &Row) -> Self {
        Self {
            base_url: row.get(0),
            auth_token: row.get(1),
            enabled: row.get(2),
            poll_interval_seconds: row.get(3),
            username: row.get(4),
            password: row.get(5),
            updated_at: row.get(6),
        }
    }
}

impl TryFrom<ConnectionConfigRow> for ConnectionConfig {
    type Error = DomainError;

    fn try_from(row: ConnectionConfigRow) -> Result<Self, Self::Error> {
        let poll_interval_seconds = u32::try_from(row.poll_interval_seconds).map_err(|_| {
            DomainError::InvalidStoredValue {
                field: "connection_config.poll_interval_seconds",
                value: row.poll_interval_seconds.to_string(),
            }
        })?;

        Ok(ConnectionConfig {
            base_url: row.base_url,
            auth_token: row.auth_token,
            enabled: row.enabled,
            poll_interval_seconds,
            username: row.username,
            password: row.password,
            updated_at: Some(row.updated_at),
        })
    }
}

/// PostgreSQL implementation of ConnectionConfigRepository.
/// The table holds at most one row, keyed by `id = 1`.
#[derive(Clone)]
pub struct PostgresConnectionConfigRepository {
    client: PostgresClient,
}

impl PostgresConnectionConfigRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConnectionConfigRepository for PostgresConnectionConfigRepository {
    #[instrument(skip(self))]
    async fn get_connection_config(&self) -> DomainResult<Option<ConnectionConfig>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT base_url, auth_token, enabled, poll_interval_seconds, username, password, updated_at
                 FROM connection_config
                 WHERE id = 1",
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.map(|row| ConnectionConfig::try_from(ConnectionConfigRow::from_row(&row)))
            .transpose()
    }

    #[instrument(skip(self, config), fields(base_url = %config.base_url, enabled = config.enabled))]
    async fn save_connection_config(&self, config: ConnectionConfig) -> DomainResult<ConnectionConfig> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let poll_interval = i32::try_from(config.poll_interval_seconds).map_err(|_| {
            DomainError::ValidationError(format!(
                "poll_interval_seconds out of range: {}",
                config.poll_interval_seconds
            ))
        })?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO connection_config (id, base_url, auth_token, enabled, poll_interval_seconds,
                                            username, password, updated_at)
             VALUES (1, $1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
                base_url = EXCLUDED.base_url,
                auth_token = EXCLUDED.auth_token,
                enabled = EXCLUDED.enabled,
                poll_interval_seconds = EXCLUDED.poll_interval_seconds,
                username = EXCLUDED.username,
                password = EXCLUDED.password,
                updated_at = EXCLUDED.updated_at",
            &[
                &config.base_url,
                &config.auth_token,
                &config.enabled,
                &poll_interval,
                &config.username,
                &config.password,
                &now,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        info!("Connection config saved");

        Ok(ConnectionConfig {
            updated_at: Some(now),
            ..config
        })
    }

    #[instrument(skip(self, token))]
    async fn update_auth_token(&self, token: &str) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let rows_affected = conn
            .execute(
                "UPDATE connection_config SET auth_token = $1, updated_at = $2 WHERE id = 1",
                &[&token, &now],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if rows_affected == 0 {
            return Err(DomainError::ConnectionConfigNotFound);
        }

        debug!("Auth token updated");
        Ok(())
    }
}
