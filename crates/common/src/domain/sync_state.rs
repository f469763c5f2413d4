use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Running,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Running => "running",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SyncPhase::Idle),
            "running" => Ok(SyncPhase::Running),
            other => Err(format!("unknown sync phase: {}", other)),
        }
    }
}

/// Persisted engine state. `run_id` and `started_at` describe the run that
/// holds (or last held) the running phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub phase: SyncPhase,
    pub run_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    /// A running state that started before `stale_before` is treated as abandoned
    pub fn is_stale(&self, stale_before: DateTime<Utc>) -> bool {
        self.phase == SyncPhase::Running
            && self.started_at.map_or(true, |started| started < stale_before)
    }
}

/// Result of trying to move Idle -> Running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now owns the running phase. `reclaimed_from` names a stale
    /// run that was taken over.
    Acquired { reclaimed_from: Option<String> },
    /// Another live run holds the running phase
    Busy {
        run_id: Option<String>,
        started_at: Option<DateTime<Utc>>,
    },
}

/// Single-flight guard shared by every engine instance
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    /// Atomically claim the running phase for `run_id` if the state is idle
    /// or running since before `stale_before`.
    async fn try_acquire(
        &self,
        run_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> DomainResult<AcquireOutcome>;

    /// Return to idle. A no-op unless `run_id` still holds the running phase.
    async fn release(&self, run_id: &str, now: DateTime<Utc>) -> DomainResult<()>;

    async fn current_state(&self) -> DomainResult<SyncState>;
}
