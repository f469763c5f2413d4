use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A personnel directory entry that can be matched to device punches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personnel {
    pub personnel_id: String,
    pub attendance_device_code: String,
    pub full_name: Option<String>,
}

/// Outcome of mapping a device employee code to personnel.
/// `personnel_id` is absent when there is no unambiguous match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub employee_code: String,
    pub personnel_id: Option<String>,
}

impl ResolvedIdentity {
    pub fn unmapped(employee_code: impl Into<String>) -> Self {
        Self {
            employee_code: employee_code.into(),
            personnel_id: None,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.personnel_id.is_some()
    }
}

/// Read access to the personnel directory
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PersonnelDirectory: Send + Sync {
    /// Every active personnel record whose device code is in `codes`.
    /// A code may match more than one record.
    async fn find_by_device_codes(&self, codes: &[String]) -> DomainResult<Vec<Personnel>>;
}
