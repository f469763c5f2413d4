use crate::domain::{DeviceCredentials, DeviceError, RawTransaction, TimeWindow, TransactionBatch};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where and as whom the device is called
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub base_url: String,
    pub token: String,
}

impl std::fmt::Debug for DeviceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTarget")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Token issued by the device's token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceToken {
    pub token: String,
}

/// Read-only probe of the transaction endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProbe {
    pub url: String,
    pub status_code: u16,
    pub total_count: u64,
    pub preview: Vec<RawTransaction>,
    pub malformed_count: usize,
}

/// Client for the attendance device's HTTP API.
/// Implementations never retry and never re-register tokens on their own.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Exchange device credentials for a bearer token
    async fn register_token(
        &self,
        base_url: &str,
        credentials: &DeviceCredentials,
    ) -> Result<DeviceToken, DeviceError>;

    /// Fetch every transaction in the window
    async fn fetch_transactions(
        &self,
        target: &DeviceTarget,
        window: &TimeWindow,
    ) -> Result<TransactionBatch, DeviceError>;

    /// Fetch one bounded page and report what the device returned
    async fn test_connection(
        &self,
        target: &DeviceTarget,
        window: &TimeWindow,
        preview_limit: usize,
    ) -> Result<ConnectionProbe, DeviceError>;
}
