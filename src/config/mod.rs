//! Configuration management for the cycle trader.
//!
//! Loads settings from an optional config file and environment variables
//! (`CT__SECTION__KEY`).

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Tick cadence and trading calendar
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Order placement and reconciliation
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Simulated broker used when no live gateway is configured
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, `:memory:` for a throwaway database
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// UTC offset of the market's local calendar
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Delay between consecutive order submissions
    #[serde(default = "default_order_pacing_ms")]
    pub order_pacing_ms: u64,
    /// Days before a snapshot's creation included in history queries
    #[serde(default = "default_history_offset_days")]
    pub history_offset_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Quotes seeded into the paper broker, by ticker
    #[serde(default)]
    pub prices: HashMap<String, Decimal>,
    #[serde(default = "default_market_open")]
    pub market_open: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
}

// Default value functions
fn default_database_path() -> String {
    "data/cycle_trader.db".to_string()
}

fn default_interval_secs() -> u64 {
    86_400 // once a day
}

fn default_utc_offset_hours() -> i32 {
    9 // KST
}

fn default_order_pacing_ms() -> u64 {
    100
}

fn default_history_offset_days() -> u32 {
    1
}

fn default_market_open() -> bool {
    true
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_log_file_prefix() -> String {
    "cycle-trader.log".to_string()
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Load with an explicit config file base name (extension optional).
    pub fn load_from(file: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(config::Environment::with_prefix("CT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.scheduler.interval_secs > 0,
            "scheduler.interval_secs must be positive"
        );

        anyhow::ensure!(
            (-14..=14).contains(&self.scheduler.utc_offset_hours),
            "scheduler.utc_offset_hours must be between -14 and 14"
        );

        anyhow::ensure!(
            !self.database.path.trim().is_empty(),
            "database.path must not be empty"
        );

        anyhow::ensure!(
            self.paper.prices.values().all(|p| *p > Decimal::ZERO),
            "paper.prices must be positive"
        );

        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_pacing_ms: default_order_pacing_ms(),
            history_offset_days: default_history_offset_days(),
        }
    }
}

impl PaperConfig {
    /// Seeded quotes keyed by upper-case ticker. Environment keys arrive lower-cased.
    pub fn quotes(&self) -> HashMap<String, Decimal> {
        self.prices
            .iter()
            .map(|(ticker, price)| (ticker.to_uppercase(), *price))
            .collect()
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            prices: HashMap::new(),
            market_open: default_market_open(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            file_prefix: default_log_file_prefix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.utc_offset_hours, 9);
        assert_eq!(config.execution.history_offset_days, 1);
    }

    #[test]
    fn test_rejects_bad_calendar() {
        let mut config = Config::default();
        config.scheduler.utc_offset_hours = 15;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_positive_paper_price() {
        let mut config = Config::default();
        config.paper.prices.insert("TQQQ".to_string(), dec!(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"scheduler": {"interval_secs": 60}, "paper": {"prices": {"TQQQ": "52.5"}}}"#,
        )
        .unwrap();
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.scheduler.utc_offset_hours, 9);
        assert!(config.paper.market_open);
        assert_eq!(config.paper.prices["TQQQ"], dec!(52.5));
        assert_eq!(config.database.path, "data/cycle_trader.db");
    }

    #[test]
    fn test_paper_quotes_are_upper_cased() {
        // CT__PAPER__PRICES__TQQQ=52.5 is read back as "tqqq"
        let config: Config =
            serde_json::from_str(r#"{"paper": {"prices": {"tqqq": "52.5", "QLD": "80"}}}"#)
                .unwrap();
        let quotes = config.paper.quotes();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes["TQQQ"], dec!(52.5));
        assert_eq!(quotes["QLD"], dec!(80));
        assert!(!quotes.contains_key("tqqq"));
    }
}
