mod config;

use checkin_api::checkin_api::CheckinApi;
use checkin_api::rest::HttpServerConfig;
use checkin_runner::Runner;
use common::domain::{utc_offset_from_minutes, ConnectionConfig, ConnectionConfigRepository};
use common::http::{HttpLoggingConfig, HttpTracingConfig};
use common::postgres::{
    PostgresCheckinRepository, PostgresClient, PostgresConfig, PostgresConnectionConfigRepository,
    PostgresPersonnelDirectory, PostgresSyncRunRepository, PostgresSyncStateRepository,
};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use common::validation::validate_struct;
use config::ServiceConfig;
use device_client::{BioTimeClient, DeviceClientConfig};
use goose::MigrationRunner;
use std::sync::Arc;
use std::time::Duration;
use sync_worker::domain::{SyncEngine, SyncEngineConfig, SyncService};
use sync_worker::sync_worker::{SyncWorker, SyncWorkerConfig};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    // Initialize configuration and tracing
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting checkin-sync service"
    );
    debug!(
        http_port = config.http_port,
        postgres_host = %config.postgres_host,
        dedup_strategy = ?config.sync_dedup_strategy,
        "Loaded configuration"
    );

    let device_utc_offset = match utc_offset_from_minutes(config.device_utc_offset_minutes) {
        Ok(offset) => offset,
        Err(e) => {
            error!("Invalid device UTC offset: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize shared dependencies
    let repos = match initialize_postgres(&config).await {
        Ok(repos) => repos,
        Err(e) => {
            error!("Failed to initialize PostgreSQL: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = seed_connection_config(&config, repos.connection_config.as_ref()).await {
        error!("Failed to seed connection config: {:#}", e);
        std::process::exit(1);
    }

    let device_client = match BioTimeClient::new(DeviceClientConfig {
        request_timeout: Duration::from_secs(config.device_request_timeout_secs),
        page_size: config.device_page_size,
        max_pages: config.device_max_pages,
        utc_offset: device_utc_offset,
    }) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build device client: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize domain services
    let engine = Arc::new(SyncEngine::new(
        repos.connection_config.clone(),
        device_client.clone(),
        repos.personnel.clone(),
        repos.checkins.clone(),
        repos.sync_runs.clone(),
        repos.sync_state.clone(),
        SyncEngineConfig {
            cycle_timeout_secs: config.sync_cycle_timeout_secs,
            lookback_days: config.sync_lookback_days,
            device_utc_offset,
            dedup_strategy: config.sync_dedup_strategy,
            preview_limit: config.sync_preview_limit,
        },
    ));
    let sync_service = Arc::new(SyncService::new(
        engine.clone(),
        repos.connection_config.clone(),
        device_client,
        repos.sync_runs.clone(),
    ));

    // Initialize application modules
    let logging_config = HttpLoggingConfig::from_comma_separated(&config.http_ignored_paths);
    let checkin_api = CheckinApi::new(
        sync_service,
        HttpServerConfig {
            host: config.http_host.clone(),
            port: config.http_port,
            tracing_config: HttpTracingConfig::new(logging_config.ignored_paths.clone()),
            logging_config,
        },
    );
    let sync_worker = SyncWorker::new(
        engine,
        repos.connection_config.clone(),
        SyncWorkerConfig {
            fallback_poll_interval: Duration::from_secs(config.sync_fallback_poll_interval_secs),
        },
    );

    let runner = Runner::new()
        .with_named_process("checkin_api", checkin_api.into_runner_process())
        .with_named_process("sync_worker", sync_worker.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            // Shutdown telemetry and flush pending traces
            shutdown_telemetry(telemetry_providers);
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    // Run the service
    runner.run().await;
}

struct PostgresRepositories {
    connection_config: Arc<PostgresConnectionConfigRepository>,
    personnel: Arc<PostgresPersonnelDirectory>,
    checkins: Arc<PostgresCheckinRepository>,
    sync_runs: Arc<PostgresSyncRunRepository>,
    sync_state: Arc<PostgresSyncStateRepository>,
}

async fn initialize_postgres(config: &ServiceConfig) -> anyhow::Result<PostgresRepositories> {
    info!("Initializing PostgreSQL...");
    let postgres_config = PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_max_pool_size,
        migrations_dir: config.postgres_migrations_dir.clone(),
        goose_binary_path: config.postgres_goose_binary_path.clone(),
    };

    MigrationRunner::postgres(
        postgres_config.goose_binary_path.clone(),
        postgres_config.migrations_dir.clone(),
        postgres_config.dsn(),
    )
    .run_migrations()
    .await?;

    let client = PostgresClient::from_config(&postgres_config)?;
    client.ping().await?;

    Ok(PostgresRepositories {
        connection_config: Arc::new(PostgresConnectionConfigRepository::new(client.clone())),
        personnel: Arc::new(PostgresPersonnelDirectory::new(client.clone())),
        checkins: Arc::new(PostgresCheckinRepository::new(client.clone())),
        sync_runs: Arc::new(PostgresSyncRunRepository::new(client.clone())),
        sync_state: Arc::new(PostgresSyncStateRepository::new(client)),
    })
}

/// Write the seed connection config when one is given and nothing is stored
async fn seed_connection_config(
    config: &ServiceConfig,
    repository: &dyn ConnectionConfigRepository,
) -> anyhow::Result<()> {
    let Some(base_url) = config.seed_device_base_url.clone() else {
        return Ok(());
    };
    if repository.get_connection_config().await?.is_some() {
        debug!("Connection config already stored, ignoring seed values");
        return Ok(());
    }

    let seed = ConnectionConfig {
        base_url,
        auth_token: config.seed_device_token.clone(),
        enabled: config.seed_device_enabled,
        poll_interval_seconds: config.seed_poll_interval_seconds,
        username: config.seed_device_username.clone(),
        password: config.seed_device_password.clone(),
        updated_at: None,
    };
    validate_struct(&seed)?;
    let saved = repository.save_connection_config(seed).await?;

    info!(base_url = %saved.base_url, enabled = saved.enabled, "Seeded connection config");
    Ok(())
}
