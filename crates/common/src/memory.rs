//! In-memory repository implementations for tests.

use crate::domain::{
    AcquireOutcome, CanonicalCheckin, CheckinRepository, ConnectionConfig,
    ConnectionConfigRepository, CreateCheckinRepoInput, DedupKey, DomainError, DomainResult,
    Personnel, PersonnelDirectory, SyncPhase, SyncRunRepository, SyncRunSummary, SyncState,
    SyncStateRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Check-in store keyed by dedup key, enforcing the same uniqueness as the
/// database index
#[derive(Default)]
pub struct InMemoryCheckinRepository {
    checkins: RwLock<HashMap<DedupKey, CanonicalCheckin>>,
}

impl InMemoryCheckinRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.checkins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkins.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<CanonicalCheckin> {
        let mut all: Vec<_> = self.checkins.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            a.punch_time
                .cmp(&b.punch_time)
                .then_with(|| a.checkin_id.cmp(&b.checkin_id))
        });
        all
    }
}

#[async_trait]
impl CheckinRepository for InMemoryCheckinRepository {
    async fn create_checkin(&self, input: CreateCheckinRepoInput) -> DomainResult<CanonicalCheckin> {
        let mut checkins = self.checkins.write().await;
        if checkins.contains_key(&input.dedup_key) {
            return Err(DomainError::CheckinAlreadyExists(input.dedup_key.to_string()));
        }

        let checkin = CanonicalCheckin {
            checkin_id: input.checkin_id,
            personnel_id: input.personnel_id,
            employee_code: input.employee_code,
            punch_time: input.punch_time,
            log_type: input.log_type,
            source_device_id: input.source_device_id,
            device_transaction_id: input.device_transaction_id,
            dedup_key: input.dedup_key.clone(),
            created_at: Some(Utc::now()),
        };
        checkins.insert(input.dedup_key, checkin.clone());
        Ok(checkin)
    }

    async fn checkin_exists(&self, dedup_key: &DedupKey) -> DomainResult<bool> {
        Ok(self.checkins.read().await.contains_key(dedup_key))
    }

    async fn list_checkins(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<CanonicalCheckin>> {
        Ok(self
            .all()
            .await
            .into_iter()
            .filter(|c| c.punch_time >= start && c.punch_time < end)
            .collect())
    }

    async fn count_checkins_since(&self, since: DateTime<Utc>) -> DomainResult<u64> {
        Ok(self
            .checkins
            .read()
            .await
            .values()
            .filter(|c| c.punch_time >= since)
            .count() as u64)
    }
}

#[derive(Default)]
pub struct InMemorySyncRunRepository {
    runs: RwLock<Vec<SyncRunSummary>>,
}

impl InMemorySyncRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs in the order they were appended
    pub async fn all(&self) -> Vec<SyncRunSummary> {
        self.runs.read().await.clone()
    }
}

#[async_trait]
impl SyncRunRepository for InMemorySyncRunRepository {
    async fn append_run(&self, summary: &SyncRunSummary) -> DomainResult<()> {
        self.runs.write().await.push(summary.clone());
        Ok(())
    }

    async fn latest_run(&self) -> DomainResult<Option<SyncRunSummary>> {
        Ok(self.list_recent_runs(1).await?.into_iter().next())
    }

    async fn list_recent_runs(&self, limit: usize) -> DomainResult<Vec<SyncRunSummary>> {
        let mut runs = self.runs.read().await.clone();
        // stable sort keeps append order for equal start times
        runs.reverse();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }
}

/// Sync state guarded by a single write lock, so acquisition is atomic
pub struct InMemorySyncStateRepository {
    state: RwLock<SyncState>,
}

impl Default for InMemorySyncStateRepository {
    fn default() -> Self {
        Self::with_state(SyncState {
            phase: SyncPhase::Idle,
            run_id: None,
            started_at: None,
            updated_at: Utc::now(),
        })
    }
}

impl InMemorySyncStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an arbitrary state, e.g. a run left behind by a crash
    pub fn with_state(state: SyncState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }
}

#[async_trait]
impl SyncStateRepository for InMemorySyncStateRepository {
    async fn try_acquire(
        &self,
        run_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> DomainResult<AcquireOutcome> {
        let mut state = self.state.write().await;

        let reclaimed_from = match state.phase {
            SyncPhase::Idle => None,
            SyncPhase::Running if state.is_stale(stale_before) => state.run_id.clone(),
            SyncPhase::Running => {
                return Ok(AcquireOutcome::Busy {
                    run_id: state.run_id.clone(),
                    started_at: state.started_at,
                })
            }
        };

        *state = SyncState {
            phase: SyncPhase::Running,
            run_id: Some(run_id.to_string()),
            started_at: Some(now),
            updated_at: now,
        };
        Ok(AcquireOutcome::Acquired { reclaimed_from })
    }

    async fn release(&self, run_id: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let mut state = self.state.write().await;
        if state.phase == SyncPhase::Running && state.run_id.as_deref() == Some(run_id) {
            state.phase = SyncPhase::Idle;
            state.updated_at = now;
        }
        Ok(())
    }

    async fn current_state(&self) -> DomainResult<SyncState> {
        Ok(self.state.read().await.clone())
    }
}

#[derive(Default)]
pub struct InMemoryConnectionConfigRepository {
    config: RwLock<Option<ConnectionConfig>>,
}

impl InMemoryConnectionConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConnectionConfig) -> Self {
        Self {
            config: RwLock::new(Some(config)),
        }
    }
}

#[async_trait]
impl ConnectionConfigRepository for InMemoryConnectionConfigRepository {
    async fn get_connection_config(&self) -> DomainResult<Option<ConnectionConfig>> {
        Ok(self.config.read().await.clone())
    }

    async fn save_connection_config(&self, config: ConnectionConfig) -> DomainResult<ConnectionConfig> {
        let saved = ConnectionConfig {
            updated_at: Some(Utc::now()),
            ..config
        };
        *self.config.write().await = Some(saved.clone());
        Ok(saved)
    }

    async fn update_auth_token(&self, token: &str) -> DomainResult<()> {
        let mut config = self.config.write().await;
        match config.as_mut() {
            Some(config) => {
                config.auth_token = Some(token.to_string());
                config.updated_at = Some(Utc::now());
                Ok(())
            }
            None => Err(DomainError::ConnectionConfigNotFound),
        }
    }
}

#[derive(Default)]
pub struct InMemoryPersonnelDirectory {
    personnel: Vec<Personnel>,
}

impl InMemoryPersonnelDirectory {
    pub fn new(personnel: Vec<Personnel>) -> Self {
        Self { personnel }
    }
}

#[async_trait]
impl PersonnelDirectory for InMemoryPersonnelDirectory {
    async fn find_by_device_codes(&self, codes: &[String]) -> DomainResult<Vec<Personnel>> {
        Ok(self
            .personnel
            .iter()
            .filter(|p| codes.contains(&p.attendance_device_code))
            .cloned()
            .collect())
    }
}
