//! Configuration module for utility-service.

use crate::services::analytics::DEFAULT_TREND_DAYS;
use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct UtilityConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// `None` runs the ledger on the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub ledger: LedgerSettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Defaults applied when a request leaves a parameter out.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub low_balance_threshold: Decimal,
    pub trend_days: u32,
    pub bill_history_limit: i64,
    pub usage_history_limit: i64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            low_balance_threshold: Decimal::from(50),
            trend_days: DEFAULT_TREND_DAYS,
            bill_history_limit: 5,
            usage_history_limit: 10,
        }
    }
}

fn parsed_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

impl UtilityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let defaults = LedgerSettings::default();

        let database = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url,
                max_connections: parsed_env("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
                min_connections: parsed_env("DATABASE_MIN_CONNECTIONS").unwrap_or(2),
            }),
            _ => None,
        };

        let low_balance_threshold = match env::var("LOW_BALANCE_THRESHOLD") {
            Ok(raw) => Decimal::from_str(raw.trim()).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid LOW_BALANCE_THRESHOLD: {}", e))
            })?,
            Err(_) => defaults.low_balance_threshold,
        };

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "utility-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database,
            ledger: LedgerSettings {
                low_balance_threshold,
                trend_days: parsed_env("TREND_DAYS").unwrap_or(defaults.trend_days),
                bill_history_limit: parsed_env("BILL_HISTORY_LIMIT")
                    .unwrap_or(defaults.bill_history_limit),
                usage_history_limit: parsed_env("USAGE_HISTORY_LIMIT")
                    .unwrap_or(defaults.usage_history_limit),
            },
        })
    }
}
