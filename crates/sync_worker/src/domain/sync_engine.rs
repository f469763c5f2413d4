use crate::domain::{
    CheckinIngestor, DedupStore, IdentityResolver, IngestOutcome, SkipReason, SyncEngineConfig,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::domain::{
    AcquireOutcome, CheckinRepository, ConfigError, ConnectionConfig, ConnectionConfigRepository,
    DeviceClient, DeviceTarget, DomainResult, IngestError, PersonnelDirectory, ResolvedIdentity,
    SyncError, SyncRunRepository, SyncRunStatus, SyncRunSummary, SyncState, SyncStateRepository,
    SyncTrigger, TimeWindow,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// How a call to `SyncEngine::run` ended
#[derive(Debug)]
pub enum SyncOutcome {
    Completed(SyncRunSummary),
    /// The cycle ran and was recorded as failed
    Failed {
        summary: SyncRunSummary,
        error: SyncError,
    },
    /// Another cycle holds the running state. Nothing was done.
    AlreadyRunning {
        run_id: Option<String>,
        started_at: Option<DateTime<Utc>>,
    },
}

/// Read-only snapshot for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub configured: bool,
    pub enabled: bool,
    pub token_present: bool,
    pub base_url: Option<String>,
    pub poll_interval_seconds: Option<u32>,
    pub state: SyncState,
    pub state_stale: bool,
    pub last_run: Option<SyncRunSummary>,
    pub recent_checkins_24h: u64,
}

/// Recorded on a completed run whose fetch stopped at the page limit
pub const TRUNCATED_FETCH_NOTE: &str =
    "Device fetch stopped at the page limit; later records in the window were not read";

#[derive(Debug, Default, Clone, Copy)]
struct CycleCounts {
    fetched: u64,
    ingested: u64,
    duplicate: u64,
    unmapped: u64,
    malformed: u64,
    truncated: bool,
}

/// Runs sync cycles: config gate, single-flight acquire, fetch, resolve,
/// dedup, ingest, record, release.
pub struct SyncEngine {
    config_repository: Arc<dyn ConnectionConfigRepository>,
    device_client: Arc<dyn DeviceClient>,
    checkin_repository: Arc<dyn CheckinRepository>,
    run_repository: Arc<dyn SyncRunRepository>,
    state_repository: Arc<dyn SyncStateRepository>,
    identity_resolver: IdentityResolver,
    dedup_store: DedupStore,
    ingestor: CheckinIngestor,
    config: SyncEngineConfig,
    cycle_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        config_repository: Arc<dyn ConnectionConfigRepository>,
        device_client: Arc<dyn DeviceClient>,
        personnel_directory: Arc<dyn PersonnelDirectory>,
        checkin_repository: Arc<dyn CheckinRepository>,
        run_repository: Arc<dyn SyncRunRepository>,
        state_repository: Arc<dyn SyncStateRepository>,
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            identity_resolver: IdentityResolver::new(personnel_directory),
            dedup_store: DedupStore::new(checkin_repository.clone(), config.dedup_strategy),
            ingestor: CheckinIngestor::new(checkin_repository.clone(), config.dedup_strategy),
            config_repository,
            device_client,
            checkin_repository,
            run_repository,
            state_repository,
            config,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    /// Run one cycle. Config problems return `Err` before anything is
    /// touched; every cycle that acquires the running state is recorded.
    #[instrument(skip(self), fields(trigger = %trigger))]
    pub async fn run(&self, trigger: SyncTrigger) -> Result<SyncOutcome, SyncError> {
        let (connection, target) = self.load_runnable_config().await?;

        let Ok(_cycle_guard) = self.cycle_lock.try_lock() else {
            let state = self.state_repository.current_state().await?;
            info!(running_run_id = ?state.run_id, "Sync already running in this process, skipping");
            return Ok(SyncOutcome::AlreadyRunning {
                run_id: state.run_id,
                started_at: state.started_at,
            });
        };

        let run_id = xid::new().to_string();
        let started_at = Utc::now();
        let stale_before = started_at - self.config.stale_after(connection.poll_interval_seconds);

        match self
            .state_repository
            .try_acquire(&run_id, started_at, stale_before)
            .await?
        {
            AcquireOutcome::Busy {
                run_id: running,
                started_at: running_since,
            } => {
                info!(running_run_id = ?running, "Sync already running elsewhere, skipping");
                return Ok(SyncOutcome::AlreadyRunning {
                    run_id: running,
                    started_at: running_since,
                });
            }
            AcquireOutcome::Acquired {
                reclaimed_from: Some(stale_run_id),
            } => {
                warn!(run_id = %run_id, stale_run_id = %stale_run_id, "Took over stale sync run");
            }
            AcquireOutcome::Acquired { reclaimed_from: None } => {}
        }

        info!(run_id = %run_id, "Sync cycle started");

        let mut counts = CycleCounts::default();
        let deadline = Instant::now() + self.config.cycle_timeout();
        let result = self.execute_cycle(&target, &mut counts, deadline).await;

        let summary = SyncRunSummary {
            run_id,
            trigger,
            status: if result.is_ok() {
                SyncRunStatus::Completed
            } else {
                SyncRunStatus::Failed
            },
            started_at,
            finished_at: Utc::now(),
            fetched_count: counts.fetched,
            ingested_count: counts.ingested,
            duplicate_count: counts.duplicate,
            unmapped_count: counts.unmapped,
            malformed_count: counts.malformed,
            error: match &result {
                Err(e) => Some(e.to_string()),
                Ok(()) if counts.truncated => Some(TRUNCATED_FETCH_NOTE.to_string()),
                Ok(()) => None,
            },
        };

        let recorded = self.run_repository.append_run(&summary).await;
        if let Err(e) = self.state_repository.release(&summary.run_id, Utc::now()).await {
            error!(run_id = %summary.run_id, error = %e, "Failed to release sync state");
        }
        recorded?;

        match result {
            Ok(()) => {
                info!(
                    run_id = %summary.run_id,
                    fetched = summary.fetched_count,
                    ingested = summary.ingested_count,
                    duplicates = summary.duplicate_count,
                    unmapped = summary.unmapped_count,
                    malformed = summary.malformed_count,
                    "Sync cycle completed"
                );
                Ok(SyncOutcome::Completed(summary))
            }
            Err(error) => {
                warn!(
                    run_id = %summary.run_id,
                    kind = error.kind(),
                    error = %error,
                    ingested = summary.ingested_count,
                    "Sync cycle failed"
                );
                Ok(SyncOutcome::Failed { summary, error })
            }
        }
    }

    /// Fetch and resolve run under the deadline; the record loop checks it
    /// before each record so an insert is never abandoned after it commits.
    /// Counts are written as records are processed, so a cycle cut short
    /// keeps what it did.
    async fn execute_cycle(
        &self,
        target: &DeviceTarget,
        counts: &mut CycleCounts,
        deadline: Instant,
    ) -> Result<(), SyncError> {
        let window = TimeWindow::local_days(
            Utc::now(),
            self.config.device_utc_offset,
            self.config.lookback_days,
        );

        let batch = tokio::time::timeout_at(
            deadline,
            self.device_client.fetch_transactions(target, &window),
        )
        .await
        .map_err(|_| self.timed_out())??;
        counts.fetched = batch.fetched_count() as u64;
        counts.malformed = batch.malformed.len() as u64;
        counts.truncated = batch.truncated;
        if batch.truncated {
            warn!(fetched = counts.fetched, "Device fetch hit the page limit; later records were not read");
        }

        let codes: Vec<String> = batch
            .transactions
            .iter()
            .map(|txn| txn.employee_code.clone())
            .collect();
        let identities =
            tokio::time::timeout_at(deadline, self.identity_resolver.resolve_batch(&codes))
                .await
                .map_err(|_| self.timed_out())?
                .map_err(IngestError::PersistenceFailure)?;

        for txn in &batch.transactions {
            if Instant::now() >= deadline {
                return Err(self.timed_out());
            }

            let identity = identities
                .get(&txn.employee_code)
                .cloned()
                .unwrap_or_else(|| ResolvedIdentity::unmapped(txn.employee_code.clone()));

            if !identity.is_mapped() {
                debug!(employee_code = %txn.employee_code, "No personnel for employee code");
                counts.unmapped += 1;
                continue;
            }

            let key = self.dedup_store.key_for(txn);
            let is_new = self
                .dedup_store
                .is_new(&key)
                .await
                .map_err(IngestError::PersistenceFailure)?;
            if !is_new {
                counts.duplicate += 1;
                continue;
            }

            match self.ingestor.ingest(txn, &identity).await? {
                IngestOutcome::Ingested(_) => counts.ingested += 1,
                IngestOutcome::Skipped(SkipReason::Duplicate) => counts.duplicate += 1,
                IngestOutcome::Skipped(SkipReason::Unmapped) => counts.unmapped += 1,
            }
        }

        Ok(())
    }

    fn timed_out(&self) -> SyncError {
        SyncError::Timeout(self.config.cycle_timeout())
    }

    async fn load_runnable_config(&self) -> Result<(ConnectionConfig, DeviceTarget), SyncError> {
        let connection = self
            .config_repository
            .get_connection_config()
            .await?
            .ok_or(ConfigError::NotConfigured)?;

        if !connection.enabled {
            return Err(ConfigError::Disabled.into());
        }

        let token = connection.token().ok_or(ConfigError::TokenMissing)?;
        let target = DeviceTarget {
            base_url: connection.base_url.clone(),
            token: token.to_string(),
        };

        Ok((connection, target))
    }

    #[instrument(skip(self))]
    pub async fn sync_status(&self) -> DomainResult<SyncStatus> {
        let connection = self.config_repository.get_connection_config().await?;
        let state = self.state_repository.current_state().await?;
        let last_run = self.run_repository.latest_run().await?;

        let now = Utc::now();
        let recent_checkins_24h = self
            .checkin_repository
            .count_checkins_since(now - ChronoDuration::hours(24))
            .await?;

        let poll_interval_seconds = connection.as_ref().map(|c| c.poll_interval_seconds);
        let state_stale =
            state.is_stale(now - self.config.stale_after(poll_interval_seconds.unwrap_or(0)));

        Ok(SyncStatus {
            configured: connection.is_some(),
            enabled: connection.as_ref().is_some_and(|c| c.enabled),
            token_present: connection.as_ref().is_some_and(|c| c.token().is_some()),
            base_url: connection.as_ref().map(|c| c.base_url.clone()),
            poll_interval_seconds,
            state,
            state_stale,
            last_run,
            recent_checkins_24h,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::domain::{
        CanonicalCheckin, ConnectionProbe, DeviceCredentials, DeviceError, DeviceToken,
        DomainError, LogType, MalformedRecord, Personnel, RawTransaction, SyncPhase,
        TransactionBatch,
    };
    use common::memory::{
        InMemoryCheckinRepository, InMemoryConnectionConfigRepository, InMemoryPersonnelDirectory,
        InMemorySyncRunRepository, InMemorySyncStateRepository,
    };
    use common::{MockCheckinRepository, MockDeviceClient};
    use std::time::Duration;

    fn connection(enabled: bool, token: Option<&str>) -> ConnectionConfig {
        ConnectionConfig {
            base_url: "http://10.0.0.5:8081".to_string(),
            auth_token: token.map(str::to_string),
            enabled,
            poll_interval_seconds: 300,
            username: None,
            password: None,
            updated_at: None,
        }
    }

    fn punch(id: &str, code: &str, minute: u32) -> RawTransaction {
        RawTransaction {
            device_transaction_id: Some(id.to_string()),
            employee_code: code.to_string(),
            punch_time: Utc::now()
                .date_naive()
                .and_hms_opt(8, minute, 0)
                .map(|naive| Utc.from_utc_datetime(&naive))
                .unwrap(),
            log_type: LogType::In,
            device_id: "SN1".to_string(),
        }
    }

    fn batch(transactions: Vec<RawTransaction>) -> TransactionBatch {
        TransactionBatch {
            url: "http://10.0.0.5:8081/iclock/api/transactions/".to_string(),
            status_code: 200,
            transactions,
            malformed: Vec::new(),
            truncated: false,
        }
    }

    fn staff(count: usize) -> Vec<Personnel> {
        (0..count)
            .map(|i| Personnel {
                personnel_id: format!("p-{}", i),
                attendance_device_code: format!("E{:02}", i),
                full_name: None,
            })
            .collect()
    }

    fn device_returning(batch: TransactionBatch) -> MockDeviceClient {
        let mut device = MockDeviceClient::new();
        device
            .expect_fetch_transactions()
            .returning(move |_, _| Ok(batch.clone()));
        device
    }

    /// Answers fetches after a delay on the tokio clock
    struct SlowDevice {
        delay: Duration,
        batch: TransactionBatch,
    }

    #[async_trait::async_trait]
    impl DeviceClient for SlowDevice {
        async fn register_token(
            &self,
            _base_url: &str,
            _credentials: &DeviceCredentials,
        ) -> Result<DeviceToken, DeviceError> {
            Err(DeviceError::Unauthorized)
        }

        async fn fetch_transactions(
            &self,
            _target: &DeviceTarget,
            _window: &TimeWindow,
        ) -> Result<TransactionBatch, DeviceError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.batch.clone())
        }

        async fn test_connection(
            &self,
            _target: &DeviceTarget,
            _window: &TimeWindow,
            _preview_limit: usize,
        ) -> Result<ConnectionProbe, DeviceError> {
            Err(DeviceError::Unauthorized)
        }
    }

    struct Harness {
        engine: Arc<SyncEngine>,
        checkins: Arc<InMemoryCheckinRepository>,
        runs: Arc<InMemorySyncRunRepository>,
        state: Arc<InMemorySyncStateRepository>,
    }

    fn harness_with(
        device: MockDeviceClient,
        personnel: Vec<Personnel>,
        state: InMemorySyncStateRepository,
        config: SyncEngineConfig,
    ) -> Harness {
        let checkins = Arc::new(InMemoryCheckinRepository::new());
        let runs = Arc::new(InMemorySyncRunRepository::new());
        let state = Arc::new(state);
        let engine = Arc::new(SyncEngine::new(
            Arc::new(InMemoryConnectionConfigRepository::with_config(connection(
                true,
                Some("token-1"),
            ))),
            Arc::new(device),
            Arc::new(InMemoryPersonnelDirectory::new(personnel)),
            checkins.clone(),
            runs.clone(),
            state.clone(),
            config,
        ));
        Harness {
            engine,
            checkins,
            runs,
            state,
        }
    }

    fn harness(device: MockDeviceClient, personnel: Vec<Personnel>) -> Harness {
        harness_with(
            device,
            personnel,
            InMemorySyncStateRepository::new(),
            SyncEngineConfig::default(),
        )
    }

    fn completed(outcome: SyncOutcome) -> SyncRunSummary {
        match outcome {
            SyncOutcome::Completed(summary) => summary,
            other => panic!("expected a completed cycle, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_cycles_over_same_data_are_idempotent() {
        let punches = vec![punch("T1", "E00", 0), punch("T2", "E01", 1), punch("T3", "E02", 2)];
        let h = harness(device_returning(batch(punches)), staff(3));

        let first = completed(h.engine.run(SyncTrigger::Scheduled).await.unwrap());
        assert_eq!(first.ingested_count, 3);

        let second = completed(h.engine.run(SyncTrigger::Manual).await.unwrap());
        assert_eq!(second.ingested_count, 0);
        assert_eq!(second.duplicate_count, 3);

        assert_eq!(h.checkins.len().await, 3);
        assert_eq!(h.runs.all().await.len(), 2);
        assert_eq!(h.state.current_state().await.unwrap().phase, SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_unmapped_codes_never_create_checkins() {
        let punches = vec![punch("T1", "E00", 0), punch("T2", "X99", 1)];
        let h = harness(device_returning(batch(punches)), staff(1));

        let summary = completed(h.engine.run(SyncTrigger::Scheduled).await.unwrap());

        assert_eq!(summary.ingested_count, 1);
        assert_eq!(summary.unmapped_count, 1);
        let stored = h.checkins.all().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].employee_code, "E00");
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_one_fetch_create_one_checkin() {
        let punches = vec![punch("T1", "E00", 0), punch("T1", "E00", 0)];
        let h = harness(device_returning(batch(punches)), staff(1));

        let summary = completed(h.engine.run(SyncTrigger::Scheduled).await.unwrap());

        assert_eq!(summary.fetched_count, 2);
        assert_eq!(summary.ingested_count, 1);
        assert_eq!(summary.duplicate_count, 1);
        assert_eq!(h.checkins.len().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_records_are_counted() {
        let mut fetched = batch(vec![punch("T1", "E00", 0)]);
        fetched.malformed.push(MalformedRecord {
            device_transaction_id: Some("T2".to_string()),
            reason: "missing employee_code".to_string(),
        });
        let h = harness(device_returning(fetched), staff(1));

        let summary = completed(h.engine.run(SyncTrigger::Scheduled).await.unwrap());

        assert_eq!(summary.fetched_count, 2);
        assert_eq!(summary.malformed_count, 1);
        assert_eq!(summary.ingested_count, 1);
    }

    #[tokio::test]
    async fn test_unique_violation_mid_batch_is_tolerated() {
        let punches: Vec<RawTransaction> = (0..10)
            .map(|i| punch(&format!("T{}", i), &format!("E{:02}", i), i))
            .collect();

        let mut checkins = MockCheckinRepository::new();
        checkins.expect_checkin_exists().returning(|_| Ok(false));
        let mut calls = 0;
        checkins.expect_create_checkin().times(10).returning(move |input| {
            calls += 1;
            if calls == 5 {
                return Err(DomainError::CheckinAlreadyExists(input.dedup_key.to_string()));
            }
            Ok(CanonicalCheckin {
                checkin_id: input.checkin_id,
                personnel_id: input.personnel_id,
                employee_code: input.employee_code,
                punch_time: input.punch_time,
                log_type: input.log_type,
                source_device_id: input.source_device_id,
                device_transaction_id: input.device_transaction_id,
                dedup_key: input.dedup_key,
                created_at: Some(Utc::now()),
            })
        });

        let runs = Arc::new(InMemorySyncRunRepository::new());
        let engine = SyncEngine::new(
            Arc::new(InMemoryConnectionConfigRepository::with_config(connection(
                true,
                Some("token-1"),
            ))),
            Arc::new(device_returning(batch(punches))),
            Arc::new(InMemoryPersonnelDirectory::new(staff(10))),
            Arc::new(checkins),
            runs.clone(),
            Arc::new(InMemorySyncStateRepository::new()),
            SyncEngineConfig::default(),
        );

        let summary = completed(engine.run(SyncTrigger::Scheduled).await.unwrap());

        assert_eq!(summary.status, SyncRunStatus::Completed);
        assert_eq!(summary.ingested_count, 9);
        assert_eq!(summary.duplicate_count, 1);
        assert_eq!(runs.all().await, vec![summary]);
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_remaining_records() {
        let punches: Vec<RawTransaction> = (0..4)
            .map(|i| punch(&format!("T{}", i), &format!("E{:02}", i), i))
            .collect();

        let mut checkins = MockCheckinRepository::new();
        checkins.expect_checkin_exists().returning(|_| Ok(false));
        let mut calls = 0;
        // the fourth record is never attempted
        checkins.expect_create_checkin().times(3).returning(move |input| {
            calls += 1;
            if calls == 3 {
                return Err(DomainError::RepositoryError(anyhow::anyhow!("disk full")));
            }
            Ok(CanonicalCheckin {
                checkin_id: input.checkin_id,
                personnel_id: input.personnel_id,
                employee_code: input.employee_code,
                punch_time: input.punch_time,
                log_type: input.log_type,
                source_device_id: input.source_device_id,
                device_transaction_id: input.device_transaction_id,
                dedup_key: input.dedup_key,
                created_at: None,
            })
        });

        let state = Arc::new(InMemorySyncStateRepository::new());
        let engine = SyncEngine::new(
            Arc::new(InMemoryConnectionConfigRepository::with_config(connection(
                true,
                Some("token-1"),
            ))),
            Arc::new(device_returning(batch(punches))),
            Arc::new(InMemoryPersonnelDirectory::new(staff(4))),
            Arc::new(checkins),
            Arc::new(InMemorySyncRunRepository::new()),
            state.clone(),
            SyncEngineConfig::default(),
        );

        match engine.run(SyncTrigger::Scheduled).await.unwrap() {
            SyncOutcome::Failed { summary, error } => {
                assert_eq!(error.kind(), "persistence_failure");
                assert_eq!(summary.ingested_count, 2);
                assert!(summary.error.unwrap().contains("disk full"));
            }
            other => panic!("expected a failed cycle, got {:?}", other),
        }
        assert_eq!(state.current_state().await.unwrap().phase, SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_disabled_or_tokenless_config_makes_no_device_calls() {
        for config in [connection(false, Some("token-1")), connection(true, None), connection(true, Some("  "))] {
            let mut device = MockDeviceClient::new();
            device.expect_fetch_transactions().times(0);
            let runs = Arc::new(InMemorySyncRunRepository::new());

            let engine = SyncEngine::new(
                Arc::new(InMemoryConnectionConfigRepository::with_config(config.clone())),
                Arc::new(device),
                Arc::new(InMemoryPersonnelDirectory::default()),
                Arc::new(InMemoryCheckinRepository::new()),
                runs.clone(),
                Arc::new(InMemorySyncStateRepository::new()),
                SyncEngineConfig::default(),
            );

            let err = engine.run(SyncTrigger::Scheduled).await.unwrap_err();
            let expected = if config.enabled { "token_missing" } else { "disabled" };
            assert_eq!(err.kind(), expected);
            assert!(runs.all().await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_config_is_not_configured() {
        let mut device = MockDeviceClient::new();
        device.expect_fetch_transactions().times(0);

        let engine = SyncEngine::new(
            Arc::new(InMemoryConnectionConfigRepository::new()),
            Arc::new(device),
            Arc::new(InMemoryPersonnelDirectory::default()),
            Arc::new(InMemoryCheckinRepository::new()),
            Arc::new(InMemorySyncRunRepository::new()),
            Arc::new(InMemorySyncStateRepository::new()),
            SyncEngineConfig::default(),
        );

        let err = engine.run(SyncTrigger::Manual).await.unwrap_err();
        assert!(matches!(err, SyncError::Config(ConfigError::NotConfigured)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_runs_are_single_flight() {
        let checkins = Arc::new(InMemoryCheckinRepository::new());
        let runs = Arc::new(InMemorySyncRunRepository::new());

        let engine = Arc::new(SyncEngine::new(
            Arc::new(InMemoryConnectionConfigRepository::with_config(connection(
                true,
                Some("token-1"),
            ))),
            Arc::new(SlowDevice {
                delay: Duration::from_secs(2),
                batch: batch(vec![punch("T1", "E00", 0)]),
            }),
            Arc::new(InMemoryPersonnelDirectory::new(staff(1))),
            checkins.clone(),
            runs.clone(),
            Arc::new(InMemorySyncStateRepository::new()),
            SyncEngineConfig::default(),
        ));

        let scheduled = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run(SyncTrigger::Scheduled).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        let manual = engine.run(SyncTrigger::Manual).await.unwrap();

        assert!(matches!(manual, SyncOutcome::AlreadyRunning { run_id: Some(_), .. }));
        let scheduled = completed(scheduled.await.unwrap().unwrap());
        assert_eq!(scheduled.ingested_count, 1);
        assert_eq!(runs.all().await.len(), 1);
        assert_eq!(checkins.len().await, 1);
    }

    #[tokio::test]
    async fn test_run_held_by_another_process_is_skipped() {
        let mut device = MockDeviceClient::new();
        device.expect_fetch_transactions().times(0);
        let now = Utc::now();
        let state = InMemorySyncStateRepository::with_state(SyncState {
            phase: SyncPhase::Running,
            run_id: Some("other-process".to_string()),
            started_at: Some(now - ChronoDuration::seconds(30)),
            updated_at: now,
        });
        let h = harness_with(device, staff(1), state, SyncEngineConfig::default());

        let outcome = h.engine.run(SyncTrigger::Manual).await.unwrap();

        assert!(matches!(
            outcome,
            SyncOutcome::AlreadyRunning { run_id: Some(ref id), .. } if id == "other-process"
        ));
        assert!(h.runs.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_running_state_is_taken_over() {
        let now = Utc::now();
        let state = InMemorySyncStateRepository::with_state(SyncState {
            phase: SyncPhase::Running,
            run_id: Some("crashed-run".to_string()),
            started_at: Some(now - ChronoDuration::hours(2)),
            updated_at: now - ChronoDuration::hours(2),
        });
        let h = harness_with(
            device_returning(batch(vec![punch("T1", "E00", 0)])),
            staff(1),
            state,
            SyncEngineConfig::default(),
        );

        let summary = completed(h.engine.run(SyncTrigger::Scheduled).await.unwrap());

        assert_eq!(summary.ingested_count, 1);
        let state = h.state.current_state().await.unwrap();
        assert_eq!(state.phase, SyncPhase::Idle);
        assert_eq!(state.run_id.as_deref(), Some(summary.run_id.as_str()));
    }

    #[tokio::test]
    async fn test_device_error_is_recorded_as_failed() {
        let mut device = MockDeviceClient::new();
        device
            .expect_fetch_transactions()
            .returning(|_, _| Err(DeviceError::Unreachable("connection refused".to_string())));
        let h = harness(device, staff(1));

        match h.engine.run(SyncTrigger::Scheduled).await.unwrap() {
            SyncOutcome::Failed { summary, error } => {
                assert_eq!(error.kind(), "device_unreachable");
                assert_eq!(summary.status, SyncRunStatus::Failed);
                assert_eq!(summary.fetched_count, 0);
                assert_eq!(summary.ingested_count, 0);
            }
            other => panic!("expected a failed cycle, got {:?}", other),
        }
        assert_eq!(h.runs.all().await.len(), 1);
        assert_eq!(h.state.current_state().await.unwrap().phase, SyncPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_device_hits_cycle_deadline() {
        let runs = Arc::new(InMemorySyncRunRepository::new());
        let state = Arc::new(InMemorySyncStateRepository::new());
        let engine = SyncEngine::new(
            Arc::new(InMemoryConnectionConfigRepository::with_config(connection(
                true,
                Some("token-1"),
            ))),
            Arc::new(SlowDevice {
                delay: Duration::from_secs(3600),
                batch: TransactionBatch::default(),
            }),
            Arc::new(InMemoryPersonnelDirectory::default()),
            Arc::new(InMemoryCheckinRepository::new()),
            runs.clone(),
            state.clone(),
            SyncEngineConfig {
                cycle_timeout_secs: 5,
                ..Default::default()
            },
        );

        match engine.run(SyncTrigger::Scheduled).await.unwrap() {
            SyncOutcome::Failed { error, summary } => {
                assert_eq!(error.kind(), "timeout");
                assert_eq!(summary.error.as_deref(), Some("Sync cycle exceeded its 5s deadline"));
            }
            other => panic!("expected a timed out cycle, got {:?}", other),
        }
        assert_eq!(runs.all().await.len(), 1);
        assert_eq!(state.current_state().await.unwrap().phase, SyncPhase::Idle);
    }

    /// Commits each insert, then stalls before answering
    struct StallingCheckins {
        inner: InMemoryCheckinRepository,
        stall: Duration,
    }

    #[async_trait::async_trait]
    impl CheckinRepository for StallingCheckins {
        async fn create_checkin(
            &self,
            input: common::domain::CreateCheckinRepoInput,
        ) -> DomainResult<CanonicalCheckin> {
            let created = self.inner.create_checkin(input).await?;
            tokio::time::sleep(self.stall).await;
            Ok(created)
        }

        async fn checkin_exists(&self, dedup_key: &common::domain::DedupKey) -> DomainResult<bool> {
            self.inner.checkin_exists(dedup_key).await
        }

        async fn list_checkins(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> DomainResult<Vec<CanonicalCheckin>> {
            self.inner.list_checkins(start, end).await
        }

        async fn count_checkins_since(&self, since: DateTime<Utc>) -> DomainResult<u64> {
            self.inner.count_checkins_since(since).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_insert_counts_committed_checkin() {
        let checkins = Arc::new(StallingCheckins {
            inner: InMemoryCheckinRepository::new(),
            stall: Duration::from_secs(10),
        });
        let engine = SyncEngine::new(
            Arc::new(InMemoryConnectionConfigRepository::with_config(connection(
                true,
                Some("token-1"),
            ))),
            Arc::new(device_returning(batch(vec![
                punch("T1", "E00", 0),
                punch("T2", "E01", 1),
            ]))),
            Arc::new(InMemoryPersonnelDirectory::new(staff(2))),
            checkins.clone(),
            Arc::new(InMemorySyncRunRepository::new()),
            Arc::new(InMemorySyncStateRepository::new()),
            SyncEngineConfig {
                cycle_timeout_secs: 5,
                ..Default::default()
            },
        );

        match engine.run(SyncTrigger::Scheduled).await.unwrap() {
            SyncOutcome::Failed { error, summary } => {
                assert_eq!(error.kind(), "timeout");
                assert_eq!(summary.ingested_count, 1);
            }
            other => panic!("expected a timed out cycle, got {:?}", other),
        }
        assert_eq!(checkins.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_truncated_fetch_is_noted_on_completed_run() {
        let mut truncated = batch(vec![punch("T1", "E00", 0)]);
        truncated.truncated = true;
        let h = harness(device_returning(truncated), staff(1));

        let summary = completed(h.engine.run(SyncTrigger::Scheduled).await.unwrap());

        assert_eq!(summary.status, SyncRunStatus::Completed);
        assert_eq!(summary.ingested_count, 1);
        assert_eq!(summary.error.as_deref(), Some(TRUNCATED_FETCH_NOTE));
        assert_eq!(
            h.engine.sync_status().await.unwrap().last_run.and_then(|r| r.error),
            Some(TRUNCATED_FETCH_NOTE.to_string())
        );
    }

    #[tokio::test]
    async fn test_sync_status_reports_config_and_last_run() {
        let h = harness(device_returning(batch(vec![punch("T1", "E00", 0)])), staff(1));
        h.engine.run(SyncTrigger::Scheduled).await.unwrap();

        let status = h.engine.sync_status().await.unwrap();

        assert!(status.configured);
        assert!(status.enabled);
        assert!(status.token_present);
        assert_eq!(status.poll_interval_seconds, Some(300));
        assert_eq!(status.state.phase, SyncPhase::Idle);
        assert!(!status.state_stale);
        assert_eq!(status.last_run.map(|r| r.ingested_count), Some(1));
        assert_eq!(status.recent_checkins_24h, 1);
    }
}
