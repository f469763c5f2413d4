use common::domain::DedupStrategy;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Path to PostgreSQL migrations directory
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    /// Path to goose binary
    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // HTTP configuration
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request paths excluded from logging and tracing (comma-separated)
    #[serde(default = "default_http_ignored_paths")]
    pub http_ignored_paths: String,

    // Device client configuration
    #[serde(default = "default_device_request_timeout_secs")]
    pub device_request_timeout_secs: u64,

    #[serde(default = "default_device_page_size")]
    pub device_page_size: u32,

    /// Upper bound on pages followed per fetch
    #[serde(default = "default_device_max_pages")]
    pub device_max_pages: u32,

    /// Device clock offset from UTC in minutes east (e.g. 180 for UTC+3)
    #[serde(default)]
    pub device_utc_offset_minutes: i32,

    // Sync engine configuration
    #[serde(default = "default_sync_cycle_timeout_secs")]
    pub sync_cycle_timeout_secs: u64,

    /// Whole days before today included in each fetch
    #[serde(default)]
    pub sync_lookback_days: u32,

    #[serde(default)]
    pub sync_dedup_strategy: DedupStrategy,

    /// Records returned by a connection test
    #[serde(default = "default_sync_preview_limit")]
    pub sync_preview_limit: usize,

    /// Scheduler interval while no connection config is stored
    #[serde(default = "default_sync_fallback_poll_interval_secs")]
    pub sync_fallback_poll_interval_secs: u64,

    // Connection config written at startup when none is stored
    #[serde(default)]
    pub seed_device_base_url: Option<String>,

    #[serde(default)]
    pub seed_device_enabled: bool,

    #[serde(default = "default_seed_poll_interval_seconds")]
    pub seed_poll_interval_seconds: u32,

    #[serde(default)]
    pub seed_device_token: Option<String>,

    #[serde(default)]
    pub seed_device_username: Option<String>,

    #[serde(default)]
    pub seed_device_password: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "checkin-sync".to_string()
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "checkin_sync".to_string()
}

fn default_postgres_username() -> String {
    "checkin_sync".to_string()
}

fn default_postgres_password() -> String {
    "checkin_sync".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    5
}

fn default_postgres_migrations_dir() -> String {
    "/home/checkin/migrations/postgres".to_string()
}

fn default_postgres_goose_binary_path() -> String {
    "goose".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_http_ignored_paths() -> String {
    "/healthz".to_string()
}

fn default_device_request_timeout_secs() -> u64 {
    15
}

fn default_device_page_size() -> u32 {
    500
}

fn default_device_max_pages() -> u32 {
    50
}

fn default_sync_cycle_timeout_secs() -> u64 {
    120
}

fn default_sync_preview_limit() -> usize {
    5
}

fn default_sync_fallback_poll_interval_secs() -> u64 {
    300
}

fn default_seed_poll_interval_seconds() -> u32 {
    300
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("CHECKIN_SYNC"))
            .build()?
            .try_deserialize()
    }
}
