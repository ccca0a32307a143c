//! Application configuration management.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Ledger posting rules.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Balance reconciliation job.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Log output.
    #[serde(default)]
    pub log: LogConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Ledger posting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Entries balance when |debit - credit| is strictly below this.
    #[serde(default = "default_tolerance")]
    pub balance_tolerance: Decimal,
    /// Prefix for generated entry numbers (`JE-2026-000001`).
    #[serde(default = "default_entry_number_prefix")]
    pub entry_number_prefix: String,
    /// How many times a posting is retried after a serialization failure or deadlock.
    #[serde(default = "default_max_posting_retries")]
    pub max_posting_retries: u32,
    /// Base backoff between retries in milliseconds (multiplied by attempt number).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Deepest allowed chart-of-accounts level (root = 1).
    #[serde(default = "default_max_hierarchy_depth")]
    pub max_hierarchy_depth: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            balance_tolerance: default_tolerance(),
            entry_number_prefix: default_entry_number_prefix(),
            max_posting_retries: default_max_posting_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_hierarchy_depth: default_max_hierarchy_depth(),
        }
    }
}

fn default_tolerance() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_entry_number_prefix() -> String {
    "JE".to_string()
}

fn default_max_posting_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    25
}

fn default_max_hierarchy_depth() -> usize {
    8
}

/// Reconciliation job configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Seconds between runs when running as a loop.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Differences between cached and derived balances at or above this are reported.
    #[serde(default = "default_tolerance")]
    pub tolerance: Decimal,
    /// Persist detected drift into `balance_drift_alerts`.
    #[serde(default = "default_record_alerts")]
    pub record_alerts: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            tolerance: default_tolerance(),
            record_alerts: default_record_alerts(),
        }
    }
}

fn default_interval_secs() -> u64 {
    300 // 5 minutes
}

const fn default_record_alerts() -> bool {
    true
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("TALLY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
