use config::{Config, ConfigError, File};
use serde::Deserialize;

/// Downstream time-series store endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TsdbSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub database: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub tsdb: TsdbSettings,
    /// Settle events each trade must produce (see verifier cardinality)
    pub settle_events_per_trade: u64,
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    let s = Config::builder()
        // Set defaults
        .set_default("log_level", "info")?
        .set_default("log_to_file", false)?
        .set_default("log_file", "log/ledger_audit.log")?
        .set_default("tsdb.host", "localhost")?
        .set_default("tsdb.port", 6041)?
        .set_default("tsdb.user", "root")?
        .set_default("tsdb.pass", "taosdata")?
        .set_default("tsdb.database", "ledger")?
        .set_default("tsdb.timeout_secs", 30)?
        .set_default("settle_events_per_trade", 4)?
        // Add configuration from a file
        .add_source(File::with_name("config/config.yaml").required(false))
        // Add configuration from environment variables
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;

    s.try_deserialize()
}
