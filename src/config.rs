use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::api::fmp_client::FMP_STABLE_URL;
use crate::etl::EtlSettings;

/// Application configuration loaded from `.env` and the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    /// Only the API-backed pipelines need a key.
    pub fmp_api_key: Option<String>,
    pub fmp_base_url: String,
    pub rate_limit_calls: u32,
    pub rate_limit_period: Duration,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub enable_monitoring: bool,
    pub log_level: String,
    pub pipeline_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("warehouse.db"),
            fmp_api_key: None,
            fmp_base_url: FMP_STABLE_URL.to_string(),
            rate_limit_calls: 300,
            rate_limit_period: Duration::from_secs(60),
            batch_size: 1000,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            enable_monitoring: true,
            log_level: "info".to_string(),
            pipeline_timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source; used by `from_env` and tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Config {
            database_path: value("DATABASE_PATH").map(PathBuf::from).unwrap_or(defaults.database_path),
            fmp_api_key: value("FMP_API_KEY"),
            fmp_base_url: value("FMP_BASE_URL").unwrap_or(defaults.fmp_base_url),
            rate_limit_calls: parse_or(value("RATE_LIMIT_CALLS"), "RATE_LIMIT_CALLS", defaults.rate_limit_calls)?,
            rate_limit_period: value("RATE_LIMIT_PERIOD")
                .map(|v| parse::<u64>(&v, "RATE_LIMIT_PERIOD").map(Duration::from_secs))
                .transpose()?
                .unwrap_or(defaults.rate_limit_period),
            batch_size: parse_or(value("BATCH_SIZE"), "BATCH_SIZE", defaults.batch_size)?,
            max_retries: parse_or(value("MAX_RETRIES"), "MAX_RETRIES", defaults.max_retries)?,
            retry_delay: value("RETRY_DELAY_SECS")
                .map(|v| {
                    parse::<f64>(&v, "RETRY_DELAY_SECS").and_then(|secs| {
                        Duration::try_from_secs_f64(secs).map_err(|_| anyhow!("RETRY_DELAY_SECS has an invalid value: {}", v))
                    })
                })
                .transpose()?
                .unwrap_or(defaults.retry_delay),
            enable_monitoring: value("ENABLE_MONITORING")
                .map(|v| parse_bool(&v, "ENABLE_MONITORING"))
                .transpose()?
                .unwrap_or(defaults.enable_monitoring),
            log_level: value("LOG_LEVEL").unwrap_or(defaults.log_level),
            pipeline_timeout: value("PIPELINE_TIMEOUT_SECS")
                .map(|v| parse::<u64>(&v, "PIPELINE_TIMEOUT_SECS").map(Duration::from_secs))
                .transpose()?,
        })
    }

    pub fn etl_settings(&self) -> EtlSettings {
        EtlSettings {
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            enable_monitoring: self.enable_monitoring,
        }
    }
}

fn parse<T: FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| anyhow!("{} has an invalid value: {}", key, raw))
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    raw.map(|v| parse(&v, key)).transpose().map(|v| v.unwrap_or(default))
}

fn parse_bool(raw: &str, key: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} has an invalid value: {}", key, raw)),
    }
}
