use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What started a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Scheduled,
    Manual,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Scheduled => "scheduled",
            SyncTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(SyncTrigger::Scheduled),
            "manual" => Ok(SyncTrigger::Manual),
            other => Err(format!("unknown sync trigger: {}", other)),
        }
    }
}

/// Terminal state of a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Completed,
    Failed,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Completed => "completed",
            SyncRunStatus::Failed => "failed",
        }
    }
}

impl FromStr for SyncRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(SyncRunStatus::Completed),
            "failed" => Ok(SyncRunStatus::Failed),
            other => Err(format!("unknown sync run status: {}", other)),
        }
    }
}

/// Bookkeeping for one finished cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunSummary {
    pub run_id: String,
    pub trigger: SyncTrigger,
    pub status: SyncRunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched_count: u64,
    pub ingested_count: u64,
    pub duplicate_count: u64,
    pub unmapped_count: u64,
    pub malformed_count: u64,
    pub error: Option<String>,
}

impl SyncRunSummary {
    pub fn is_completed(&self) -> bool {
        self.status == SyncRunStatus::Completed
    }
}

/// Append-only history of sync cycles
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    async fn append_run(&self, summary: &SyncRunSummary) -> DomainResult<()>;

    /// Most recently started run
    async fn latest_run(&self) -> DomainResult<Option<SyncRunSummary>>;

    /// Newest first
    async fn list_recent_runs(&self, limit: usize) -> DomainResult<Vec<SyncRunSummary>>;
}
