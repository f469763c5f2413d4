use crate::domain::DomainError;
use std::time::Duration;
use thiserror::Error;

/// Failures talking to the attendance device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device unreachable: {0}")]
    Unreachable(String),

    #[error("Device rejected the API token or credentials")]
    Unauthorized,

    #[error("Device returned an unexpected response (status {status}): {body}")]
    BadResponse { status: u16, body: String },
}

/// Connection settings that prevent a cycle from starting
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Device connection is not configured")]
    NotConfigured,

    #[error("Device sync is disabled")]
    Disabled,

    #[error("Device API token is not set; register a token first")]
    TokenMissing,

    #[error("Device username and password are not configured")]
    CredentialsMissing,
}

/// Hard ingestion failures. Duplicates are outcomes, not errors.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[source] DomainError),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Sync cycle exceeded its {}s deadline", .0.as_secs())]
    Timeout(Duration),

    #[error("A sync cycle is already running")]
    AlreadyRunning { run_id: Option<String> },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Short machine-readable category for display layers
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Config(ConfigError::NotConfigured) => "not_configured",
            SyncError::Config(ConfigError::Disabled) => "disabled",
            SyncError::Config(ConfigError::TokenMissing) => "token_missing",
            SyncError::Config(ConfigError::CredentialsMissing) => "credentials_missing",
            SyncError::Device(DeviceError::Unreachable(_)) => "device_unreachable",
            SyncError::Device(DeviceError::Unauthorized) => "device_unauthorized",
            SyncError::Device(DeviceError::BadResponse { .. }) => "device_bad_response",
            SyncError::Ingest(_) => "persistence_failure",
            SyncError::Timeout(_) => "timeout",
            SyncError::AlreadyRunning { .. } => "already_running",
            SyncError::Domain(DomainError::ValidationError(_)) => "validation",
            SyncError::Domain(_) => "storage",
        }
    }
}
