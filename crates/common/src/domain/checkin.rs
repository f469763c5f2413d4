use crate::domain::result::DomainResult;
use crate::domain::{LogType, RawTransaction};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a DedupKey is derived from a device transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Trust the device transaction id to be unique per device
    TransactionId,
    /// Identify a punch by device, employee, time and direction
    #[default]
    Composite,
}

/// Stable identity of a physical punch event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    /// Derive the key for a transaction. Transactions without a device transaction id
    /// always use the composite form.
    pub fn derive(txn: &RawTransaction, strategy: DedupStrategy) -> Self {
        match (strategy, txn.device_transaction_id.as_deref()) {
            (DedupStrategy::TransactionId, Some(id)) if !id.is_empty() => {
                Self(format!("txn:{}:{}", txn.device_id, id))
            }
            _ => Self(format!(
                "punch:{}|{}|{}|{}",
                txn.device_id,
                txn.employee_code,
                txn.punch_time.to_rfc3339_opts(SecondsFormat::Secs, true),
                txn.log_type
            )),
        }
    }

    /// Wrap a key read back from storage
    pub fn from_stored(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical attendance event written once per DedupKey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCheckin {
    pub checkin_id: String,
    pub personnel_id: String,
    pub employee_code: String,
    pub punch_time: DateTime<Utc>,
    pub log_type: LogType,
    pub source_device_id: String,
    pub device_transaction_id: Option<String>,
    pub dedup_key: DedupKey,
    pub created_at: Option<DateTime<Utc>>,
}

/// Repository input for a new check-in (ID already generated)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckinRepoInput {
    pub checkin_id: String,
    pub personnel_id: String,
    pub employee_code: String,
    pub punch_time: DateTime<Utc>,
    pub log_type: LogType,
    pub source_device_id: String,
    pub device_transaction_id: Option<String>,
    pub dedup_key: DedupKey,
}

/// Repository trait for canonical check-in persistence
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CheckinRepository: Send + Sync {
    /// Insert a check-in. Returns `DomainError::CheckinAlreadyExists` when the
    /// dedup key is already taken.
    async fn create_checkin(&self, input: CreateCheckinRepoInput) -> DomainResult<CanonicalCheckin>;

    /// Whether a check-in with this dedup key exists
    async fn checkin_exists(&self, dedup_key: &DedupKey) -> DomainResult<bool>;

    /// List check-ins with punch time in `[start, end)`, ordered by punch time
    async fn list_checkins(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<CanonicalCheckin>>;

    /// Count check-ins punched at or after `since`
    async fn count_checkins_since(&self, since: DateTime<Utc>) -> DomainResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn transaction(id: Option<&str>) -> RawTransaction {
        RawTransaction {
            device_transaction_id: id.map(str::to_string),
            employee_code: "E01".to_string(),
            punch_time: Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            log_type: LogType::In,
            device_id: "CQZ7232260001".to_string(),
        }
    }

    #[test]
    fn test_composite_key_ignores_transaction_id() {
        let a = DedupKey::derive(&transaction(Some("T1")), DedupStrategy::Composite);
        let b = DedupKey::derive(&transaction(Some("T2")), DedupStrategy::Composite);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "punch:CQZ7232260001|E01|2025-03-10T09:00:00Z|IN");
    }

    #[test]
    fn test_transaction_id_key_is_scoped_to_device() {
        let key = DedupKey::derive(&transaction(Some("T1")), DedupStrategy::TransactionId);
        assert_eq!(key.as_str(), "txn:CQZ7232260001:T1");
    }

    #[test]
    fn test_missing_transaction_id_falls_back_to_composite() {
        let key = DedupKey::derive(&transaction(None), DedupStrategy::TransactionId);
        assert!(key.as_str().starts_with("punch:"));

        let empty = DedupKey::derive(&transaction(Some("")), DedupStrategy::TransactionId);
        assert_eq!(key, empty);
    }
}
