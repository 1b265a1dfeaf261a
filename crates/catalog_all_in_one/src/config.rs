use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Consumed queues
    /// Change-feed notifications
    #[serde(default = "default_changes_queue")]
    pub changes_queue: String,

    /// Decoded app info trees
    #[serde(default = "default_app_info_queue")]
    pub app_info_queue: String,

    /// Decoded package info trees
    #[serde(default = "default_package_info_queue")]
    pub package_info_queue: String,

    /// Per-product price tables
    #[serde(default = "default_prices_queue")]
    pub prices_queue: String,

    /// Player profiles resolved by the upstream client
    #[serde(default = "default_profiles_queue")]
    pub profiles_queue: String,

    /// Secondary queue holding envelopes until their next attempt
    #[serde(default = "default_delay_queue")]
    pub delay_queue: String,

    // Update request queues, consumed by the upstream fetcher
    #[serde(default = "default_app_requests_queue")]
    pub app_requests_queue: String,

    #[serde(default = "default_package_requests_queue")]
    pub package_requests_queue: String,

    #[serde(default = "default_player_requests_queue")]
    pub player_requests_queue: String,

    #[serde(default = "default_group_requests_queue")]
    pub group_requests_queue: String,

    /// Durable consumer names are `<prefix>-<queue>`
    #[serde(default = "default_consumer_prefix")]
    pub consumer_prefix: String,

    /// Batch size for consumer
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Max wait time for batches in milliseconds
    #[serde(default = "default_batch_wait_ms")]
    pub batch_wait_ms: u64,

    // Retry policy
    /// Backoff before the second attempt, doubled per attempt
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound on a single backoff
    #[serde(default = "default_retry_max_delay_secs")]
    pub retry_max_delay_secs: u64,

    /// 0 retries forever
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Envelopes older than this are dropped; 0 disables the check
    #[serde(default = "default_retry_max_age_secs")]
    pub retry_max_age_secs: u64,

    /// Polling slice of the delay queue loop
    #[serde(default = "default_delay_slice_ms")]
    pub delay_slice_ms: u64,

    // Reconnect backoff
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,

    // In-flight dedup
    /// NATS KV bucket marking queued update requests
    #[serde(default = "default_kv_bucket")]
    pub kv_bucket: String,

    /// How long a request stays marked as queued
    #[serde(default = "default_kv_ttl_secs")]
    pub kv_ttl_secs: u64,

    // ClickHouse configuration
    /// ClickHouse HTTP URL (for client connections)
    #[serde(default = "default_clickhouse_url")]
    pub clickhouse_url: String,

    /// ClickHouse native TCP URL (for migrations with goose)
    #[serde(default = "default_clickhouse_native_url")]
    pub clickhouse_native_url: String,

    /// ClickHouse database name
    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,

    /// ClickHouse username
    #[serde(default = "default_clickhouse_username")]
    pub clickhouse_username: String,

    /// ClickHouse password
    #[serde(default = "default_clickhouse_password")]
    pub clickhouse_password: String,

    /// Path to migrations directory
    #[serde(default = "default_clickhouse_migrations_dir")]
    pub clickhouse_migrations_dir: String,

    /// Path to goose binary
    #[serde(default = "default_clickhouse_goose_binary_path")]
    pub clickhouse_goose_binary_path: String,

    #[serde(default = "default_clickhouse_changes_table")]
    pub clickhouse_changes_table: String,

    #[serde(default = "default_clickhouse_price_changes_table")]
    pub clickhouse_price_changes_table: String,

    // PostgreSQL configuration
    /// PostgreSQL host
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// PostgreSQL port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// PostgreSQL database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// PostgreSQL username
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    /// PostgreSQL password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Path to PostgreSQL migrations directory
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    /// Path to goose binary for PostgreSQL (usually same as ClickHouse)
    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // Side channels
    /// Live updates go out on `<prefix>.<topic>`
    #[serde(default = "default_live_update_prefix")]
    pub live_update_prefix: String,

    /// Webhook receiving went-free notices; unset disables notifications
    #[serde(default)]
    pub notification_webhook_url: Option<String>,

    #[serde(default = "default_notification_timeout_secs")]
    pub notification_timeout_secs: u64,

    // Prices
    /// Currency the went-free rule looks at
    #[serde(default = "default_reference_currency")]
    pub reference_currency: String,

    /// Comma-separated currencies compared on every price update
    #[serde(default = "default_supported_currencies")]
    pub supported_currencies: String,

    /// Queue a refresh request for every product named in the change feed
    #[serde(default = "default_request_refreshes")]
    pub request_refreshes: bool,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

// Queue defaults
fn default_changes_queue() -> String {
    "catalog_changes".to_string()
}

fn default_app_info_queue() -> String {
    "catalog_app_info".to_string()
}

fn default_package_info_queue() -> String {
    "catalog_package_info".to_string()
}

fn default_prices_queue() -> String {
    "catalog_prices".to_string()
}

fn default_profiles_queue() -> String {
    "catalog_profiles".to_string()
}

fn default_delay_queue() -> String {
    "catalog_delay".to_string()
}

fn default_app_requests_queue() -> String {
    "catalog_app_requests".to_string()
}

fn default_package_requests_queue() -> String {
    "catalog_package_requests".to_string()
}

fn default_player_requests_queue() -> String {
    "catalog_player_requests".to_string()
}

fn default_group_requests_queue() -> String {
    "catalog_group_requests".to_string()
}

fn default_consumer_prefix() -> String {
    "catalog".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_wait_ms() -> u64 {
    1000
}

// Retry defaults
fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_secs() -> u64 {
    600
}

fn default_retry_max_attempts() -> u32 {
    10
}

fn default_retry_max_age_secs() -> u64 {
    86_400
}

fn default_delay_slice_ms() -> u64 {
    500
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_reconnect_max_secs() -> u64 {
    30
}

fn default_kv_bucket() -> String {
    "catalog_in_flight".to_string()
}

fn default_kv_ttl_secs() -> u64 {
    600
}

// ClickHouse defaults
fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_native_url() -> String {
    "localhost:9000".to_string()
}

fn default_clickhouse_database() -> String {
    "catalog".to_string()
}

fn default_clickhouse_username() -> String {
    "default".to_string()
}

fn default_clickhouse_password() -> String {
    String::new()
}

fn default_clickhouse_migrations_dir() -> String {
    "/home/catalog/migrations/clickhouse".to_string()
}

fn default_clickhouse_goose_binary_path() -> String {
    "goose".to_string()
}

fn default_clickhouse_changes_table() -> String {
    "changes".to_string()
}

fn default_clickhouse_price_changes_table() -> String {
    "price_changes".to_string()
}

// PostgreSQL defaults
fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "catalog".to_string()
}

fn default_postgres_username() -> String {
    "catalog".to_string()
}

fn default_postgres_password() -> String {
    "catalog".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_migrations_dir() -> String {
    "/home/catalog/migrations/postgres".to_string()
}

fn default_postgres_goose_binary_path() -> String {
    "goose".to_string()
}

fn default_live_update_prefix() -> String {
    "live".to_string()
}

fn default_notification_timeout_secs() -> u64 {
    10
}

fn default_reference_currency() -> String {
    "USD".to_string()
}

fn default_supported_currencies() -> String {
    "USD,EUR,GBP".to_string()
}

fn default_request_refreshes() -> bool {
    true
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "catalog-all-in-one".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("CATALOG"))
            .build()?
            .try_deserialize()
    }

    /// Upper-cased, trimmed entries of `supported_currencies`.
    pub fn supported_currency_list(&self) -> Vec<String> {
        self.supported_currencies
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
