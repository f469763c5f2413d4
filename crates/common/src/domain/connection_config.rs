use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection settings for the attendance device. Stored as a single row.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ConnectionConfig {
    #[garde(url)]
    pub base_url: String,
    #[garde(skip)]
    pub auth_token: Option<String>,
    #[garde(skip)]
    pub enabled: bool,
    #[garde(range(min = 1))]
    pub poll_interval_seconds: u32,
    #[garde(length(min = 1))]
    pub username: Option<String>,
    #[garde(skip)]
    pub password: Option<String>,
    #[garde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConnectionConfig {
    /// The stored token, if it is non-blank
    pub fn token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Stored credentials for token registration, when both parts are set
    pub fn credentials(&self) -> Option<DeviceCredentials> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(DeviceCredentials {
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            _ => None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("enabled", &self.enabled)
            .field("poll_interval_seconds", &self.poll_interval_seconds)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Device login used to obtain an API token
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DeviceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Repository trait for the device connection settings
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ConnectionConfigRepository: Send + Sync {
    async fn get_connection_config(&self) -> DomainResult<Option<ConnectionConfig>>;

    /// Insert or replace the stored config
    async fn save_connection_config(&self, config: ConnectionConfig) -> DomainResult<ConnectionConfig>;

    /// Replace only the auth token. Returns `ConnectionConfigNotFound` when no
    /// config has been saved yet.
    async fn update_auth_token(&self, token: &str) -> DomainResult<()>;
}
