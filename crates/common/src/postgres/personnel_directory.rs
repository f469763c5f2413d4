use crate::domain::{DomainError, DomainResult, Personnel, PersonnelDirectory};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// PostgreSQL-backed personnel directory
#[derive(Clone)]
pub struct PostgresPersonnelDirectory {
    client: PostgresClient,
}

impl PostgresPersonnelDirectory {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PersonnelDirectory for PostgresPersonnelDirectory {
    #[instrument(skip(self, codes), fields(code_count = codes.len()))]
    async fn find_by_device_codes(&self, codes: &[String]) -> DomainResult<Vec<Personnel>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT personnel_id, attendance_device_code, full_name
                 FROM personnel
                 WHERE active AND attendance_device_code = ANY($1)",
                &[&codes],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let personnel: Vec<Personnel> = rows
            .iter()
            .map(|row| Personnel {
                personnel_id: row.get(0),
                attendance_device_code: row.get(1),
                full_name: row.get(2),
            })
            .collect();

        debug!(matched = personnel.len(), "Looked up personnel by device code");
        Ok(personnel)
    }
}
