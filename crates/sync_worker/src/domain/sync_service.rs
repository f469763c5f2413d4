use crate::domain::{ApiError, ApiResult, SyncEngine, SyncOutcome, SyncStatus};
use chrono::Utc;
use common::domain::{
    ConfigError, ConnectionConfig, ConnectionConfigRepository, ConnectionProbe, DeviceClient,
    DeviceCredentials, DeviceTarget, DeviceToken, SyncError, SyncRunRepository, SyncRunSummary,
    SyncTrigger, TimeWindow,
};
use common::validation::validate_struct;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Upper bound for `list_sync_runs`
pub const MAX_RUN_HISTORY: usize = 100;

/// Connection settings as submitted by an operator. Omitted secrets keep
/// the stored values.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveConnectionConfigInput {
    pub base_url: String,
    #[serde(default)]
    pub enabled: bool,
    pub poll_interval_seconds: u32,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Operations exposed to display layers. Every method returns an `ApiResult`
/// and never panics on device or storage failures.
pub struct SyncService {
    engine: Arc<SyncEngine>,
    config_repository: Arc<dyn ConnectionConfigRepository>,
    device_client: Arc<dyn DeviceClient>,
    run_repository: Arc<dyn SyncRunRepository>,
}

impl SyncService {
    pub fn new(
        engine: Arc<SyncEngine>,
        config_repository: Arc<dyn ConnectionConfigRepository>,
        device_client: Arc<dyn DeviceClient>,
        run_repository: Arc<dyn SyncRunRepository>,
    ) -> Self {
        Self {
            engine,
            config_repository,
            device_client,
            run_repository,
        }
    }

    /// Fetch one page of today's transactions without ingesting anything.
    /// Works while sync is disabled; a token is still required.
    #[instrument(skip(self))]
    pub async fn test_connection(&self) -> ApiResult<ConnectionProbe> {
        ApiResult::from_result(self.probe().await)
    }

    async fn probe(&self) -> Result<ConnectionProbe, SyncError> {
        let connection = self.stored_config().await?;
        let token = connection.token().ok_or(ConfigError::TokenMissing)?;
        let target = DeviceTarget {
            base_url: connection.base_url.clone(),
            token: token.to_string(),
        };

        let engine_config = self.engine.config();
        let window = TimeWindow::local_days(Utc::now(), engine_config.device_utc_offset, 0);
        let probe = self
            .device_client
            .test_connection(&target, &window, engine_config.preview_limit)
            .await?;

        info!(
            url = %probe.url,
            status_code = probe.status_code,
            total_count = probe.total_count,
            "Connection test succeeded"
        );
        Ok(probe)
    }

    /// Exchange credentials for a token and store it. Without explicit
    /// credentials the stored username and password are used.
    #[instrument(skip(self, credentials), fields(explicit_credentials = credentials.is_some()))]
    pub async fn register_token(
        &self,
        credentials: Option<DeviceCredentials>,
    ) -> ApiResult<DeviceToken> {
        ApiResult::from_result(self.exchange_token(credentials).await)
    }

    async fn exchange_token(
        &self,
        credentials: Option<DeviceCredentials>,
    ) -> Result<DeviceToken, SyncError> {
        let connection = self.stored_config().await?;
        let credentials = credentials
            .or_else(|| connection.credentials())
            .ok_or(ConfigError::CredentialsMissing)?;

        let token = self
            .device_client
            .register_token(&connection.base_url, &credentials)
            .await?;
        self.config_repository.update_auth_token(&token.token).await?;

        info!(username = %credentials.username, "Registered device API token");
        Ok(token)
    }

    #[instrument(skip(self))]
    pub async fn run_manual_sync(&self) -> ApiResult<SyncRunSummary> {
        match self.engine.run(SyncTrigger::Manual).await {
            Ok(SyncOutcome::Completed(summary)) => ApiResult::Ok(summary),
            Ok(SyncOutcome::Failed { error, .. }) => ApiResult::Err(ApiError::from(error)),
            Ok(SyncOutcome::AlreadyRunning { run_id, .. }) => {
                ApiResult::Err(ApiError::from(SyncError::AlreadyRunning { run_id }))
            }
            Err(e) => {
                debug!(kind = e.kind(), "Manual sync did not start");
                ApiResult::Err(ApiError::from(e))
            }
        }
    }

    pub async fn get_sync_status(&self) -> ApiResult<SyncStatus> {
        ApiResult::from_result(self.engine.sync_status().await)
    }

    /// Newest first. `limit` is clamped to `1..=MAX_RUN_HISTORY`.
    pub async fn list_sync_runs(&self, limit: usize) -> ApiResult<Vec<SyncRunSummary>> {
        let limit = limit.clamp(1, MAX_RUN_HISTORY);
        ApiResult::from_result(self.run_repository.list_recent_runs(limit).await)
    }

    #[instrument(skip(self, input), fields(base_url = %input.base_url, enabled = input.enabled))]
    pub async fn save_connection_config(
        &self,
        input: SaveConnectionConfigInput,
    ) -> ApiResult<ConnectionConfig> {
        ApiResult::from_result(self.store_config(input).await)
    }

    async fn store_config(
        &self,
        input: SaveConnectionConfigInput,
    ) -> Result<ConnectionConfig, SyncError> {
        let existing = self.config_repository.get_connection_config().await?;
        let (stored_token, stored_username, stored_password) = existing
            .map(|c| (c.auth_token, c.username, c.password))
            .unwrap_or_default();

        let config = ConnectionConfig {
            base_url: input.base_url.trim().trim_end_matches('/').to_string(),
            auth_token: input.auth_token.or(stored_token),
            enabled: input.enabled,
            poll_interval_seconds: input.poll_interval_seconds,
            username: input
                .username
                .filter(|u| !u.trim().is_empty())
                .or(stored_username),
            password: input.password.or(stored_password),
            updated_at: None,
        };
        validate_struct(&config)?;

        if config.enabled && config.token().is_none() {
            warn!("Sync enabled without an API token; cycles will fail until one is registered");
        }

        let saved = self.config_repository.save_connection_config(config).await?;
        info!(poll_interval_seconds = saved.poll_interval_seconds, "Saved connection config");
        Ok(saved)
    }

    async fn stored_config(&self) -> Result<ConnectionConfig, SyncError> {
        Ok(self
            .config_repository
            .get_connection_config()
            .await?
            .ok_or(ConfigError::NotConfigured)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SyncEngineConfig;
    use common::domain::{DeviceError, RawTransaction};
    use common::memory::{
        InMemoryCheckinRepository, InMemoryConnectionConfigRepository, InMemoryPersonnelDirectory,
        InMemorySyncRunRepository, InMemorySyncStateRepository,
    };
    use common::MockDeviceClient;

    fn stored(token: Option<&str>) -> ConnectionConfig {
        ConnectionConfig {
            base_url: "http://10.0.0.5:8081".to_string(),
            auth_token: token.map(str::to_string),
            enabled: false,
            poll_interval_seconds: 60,
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            updated_at: None,
        }
    }

    struct Fixture {
        service: SyncService,
        configs: Arc<InMemoryConnectionConfigRepository>,
        runs: Arc<InMemorySyncRunRepository>,
    }

    fn fixture(configs: InMemoryConnectionConfigRepository, device: MockDeviceClient) -> Fixture {
        let configs = Arc::new(configs);
        let device: Arc<dyn DeviceClient> = Arc::new(device);
        let runs = Arc::new(InMemorySyncRunRepository::new());
        let engine = Arc::new(SyncEngine::new(
            configs.clone(),
            device.clone(),
            Arc::new(InMemoryPersonnelDirectory::default()),
            Arc::new(InMemoryCheckinRepository::new()),
            runs.clone(),
            Arc::new(InMemorySyncStateRepository::new()),
            SyncEngineConfig::default(),
        ));
        Fixture {
            service: SyncService::new(engine, configs.clone(), device, runs.clone()),
            configs,
            runs,
        }
    }

    #[tokio::test]
    async fn test_connection_works_while_disabled() {
        let mut device = MockDeviceClient::new();
        device
            .expect_test_connection()
            .withf(|target, _, limit| target.token == "tok" && *limit == 5)
            .times(1)
            .returning(|target, _, _| {
                Ok(ConnectionProbe {
                    url: format!("{}/iclock/api/transactions/", target.base_url),
                    status_code: 200,
                    total_count: 0,
                    preview: Vec::<RawTransaction>::new(),
                    malformed_count: 0,
                })
            });

        let f = fixture(
            InMemoryConnectionConfigRepository::with_config(stored(Some("tok"))),
            device,
        );
        let probe = f.service.test_connection().await.into_result().unwrap();
        assert_eq!(probe.status_code, 200);
    }

    #[tokio::test]
    async fn test_connection_without_token_makes_no_call() {
        let mut device = MockDeviceClient::new();
        device.expect_test_connection().times(0);

        let f = fixture(
            InMemoryConnectionConfigRepository::with_config(stored(None)),
            device,
        );
        let result = f.service.test_connection().await;
        assert_eq!(result.error().map(|e| e.kind.as_str()), Some("token_missing"));
    }

    #[tokio::test]
    async fn test_register_token_uses_stored_credentials_and_saves_token() {
        let mut device = MockDeviceClient::new();
        device
            .expect_register_token()
            .withf(|base_url, creds| base_url == "http://10.0.0.5:8081" && creds.username == "admin")
            .times(1)
            .returning(|_, _| {
                Ok(DeviceToken {
                    token: "fresh".to_string(),
                })
            });

        let f = fixture(
            InMemoryConnectionConfigRepository::with_config(stored(None)),
            device,
        );
        let token = f.service.register_token(None).await.into_result().unwrap();
        assert_eq!(token.token, "fresh");

        let saved = f.configs.get_connection_config().await.unwrap().unwrap();
        assert_eq!(saved.token(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_rejected_credentials_leave_token_untouched() {
        let mut device = MockDeviceClient::new();
        device
            .expect_register_token()
            .returning(|_, _| Err(DeviceError::Unauthorized));

        let f = fixture(
            InMemoryConnectionConfigRepository::with_config(stored(Some("old"))),
            device,
        );
        let result = f
            .service
            .register_token(Some(DeviceCredentials {
                username: "admin".to_string(),
                password: "wrong".to_string(),
            }))
            .await;

        assert_eq!(result.error().map(|e| e.kind.as_str()), Some("device_unauthorized"));
        let saved = f.configs.get_connection_config().await.unwrap().unwrap();
        assert_eq!(saved.token(), Some("old"));
    }

    #[tokio::test]
    async fn test_manual_sync_on_disabled_config_is_tagged_error() {
        let mut device = MockDeviceClient::new();
        device.expect_fetch_transactions().times(0);

        let f = fixture(
            InMemoryConnectionConfigRepository::with_config(stored(Some("tok"))),
            device,
        );
        let result = f.service.run_manual_sync().await;

        assert_eq!(result.error().map(|e| e.kind.as_str()), Some("disabled"));
        assert!(f.runs.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_manual_sync_records_run() {
        let mut device = MockDeviceClient::new();
        device
            .expect_fetch_transactions()
            .returning(|_, _| Ok(Default::default()));

        let mut config = stored(Some("tok"));
        config.enabled = true;
        let f = fixture(InMemoryConnectionConfigRepository::with_config(config), device);

        let summary = f.service.run_manual_sync().await.into_result().unwrap();
        assert_eq!(summary.trigger, SyncTrigger::Manual);

        let runs = f.service.list_sync_runs(0).await.into_result().unwrap();
        assert_eq!(runs, vec![summary]);
    }

    #[tokio::test]
    async fn test_save_keeps_stored_secrets_and_validates() {
        let f = fixture(
            InMemoryConnectionConfigRepository::with_config(stored(Some("tok"))),
            MockDeviceClient::new(),
        );

        let saved = f
            .service
            .save_connection_config(SaveConnectionConfigInput {
                base_url: "http://10.0.0.6:8081/".to_string(),
                enabled: true,
                poll_interval_seconds: 120,
                auth_token: None,
                username: Some("admin".to_string()),
                password: None,
            })
            .await
            .into_result()
            .unwrap();
        assert_eq!(saved.base_url, "http://10.0.0.6:8081");
        assert_eq!(saved.token(), Some("tok"));
        assert_eq!(saved.password.as_deref(), Some("secret"));

        let invalid = f
            .service
            .save_connection_config(SaveConnectionConfigInput {
                base_url: "not a url".to_string(),
                enabled: true,
                poll_interval_seconds: 0,
                auth_token: None,
                username: None,
                password: None,
            })
            .await;
        assert_eq!(invalid.error().map(|e| e.kind.as_str()), Some("validation"));
    }

    #[tokio::test]
    async fn test_toggling_enabled_keeps_stored_credentials_for_registration() {
        let mut device = MockDeviceClient::new();
        device
            .expect_register_token()
            .withf(|_, creds| creds.username == "admin" && creds.password == "secret")
            .times(1)
            .returning(|_, _| {
                Ok(DeviceToken {
                    token: "fresh".to_string(),
                })
            });

        let f = fixture(
            InMemoryConnectionConfigRepository::with_config(stored(None)),
            device,
        );
        let saved = f
            .service
            .save_connection_config(SaveConnectionConfigInput {
                base_url: "http://10.0.0.5:8081".to_string(),
                enabled: true,
                poll_interval_seconds: 60,
                auth_token: None,
                username: None,
                password: None,
            })
            .await
            .into_result()
            .unwrap();
        assert_eq!(saved.username.as_deref(), Some("admin"));
        assert_eq!(saved.password.as_deref(), Some("secret"));

        let token = f.service.register_token(None).await.into_result().unwrap();
        assert_eq!(token.token, "fresh");
    }

    #[tokio::test]
    async fn test_status_before_configuration() {
        let f = fixture(
            InMemoryConnectionConfigRepository::new(),
            MockDeviceClient::new(),
        );
        let status = f.service.get_sync_status().await.into_result().unwrap();
        assert!(!status.configured);
        assert!(!status.token_present);
        assert!(status.last_run.is_none());
    }
}
