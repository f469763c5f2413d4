use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Check-in already exists for dedup key: {0}")]
    CheckinAlreadyExists(String),

    #[error("Connection config not found")]
    ConnectionConfigNotFound,

    #[error("Sync state row missing")]
    SyncStateMissing,

    #[error("Invalid stored value for {field}: {value}")]
    InvalidStoredValue { field: &'static str, value: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
