//! Configuration management for Pustaka server

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// When set, logs are also written to a daily rolling file in this directory
    pub directory: Option<String>,
}

/// Loan ledger policy
#[derive(Debug, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct LoansConfig {
    /// Penalty per overdue day, in the currency's major unit
    #[validate(custom(function = "validate_fine_rate"))]
    pub daily_fine_rate: Decimal,
    /// Decimal places kept on computed fines (fines are truncated, never rounded up)
    #[validate(range(max = 28, message = "At most 28 decimal places are supported"))]
    pub currency_minor_units: u32,
    /// Refuse new loans while the member has an active loan or an unpaid fine
    pub block_on_open_obligation: bool,
    /// Loan duration applied when a request carries no due date
    #[validate(range(min = 1, max = 3650, message = "Loan duration must be 1 to 3650 days"))]
    pub default_duration_days: i64,
    #[validate(range(min = 1, max = 100, message = "A loan must allow 1 to 100 books"))]
    pub max_books_per_loan: usize,
}

fn validate_fine_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() && !rate.is_zero() {
        let mut error = ValidationError::new("negative_fine_rate");
        error.message = Some("Daily fine rate cannot be negative".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub loans: LoansConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // PUSTAKA_LOANS__DAILY_FINE_RATE=1500
            .add_source(
                Environment::with_prefix("PUSTAKA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.loans
            .validate()
            .map_err(|e| ConfigError::Message(format!("invalid loans section: {}", e)))?;
        Ok(app)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://pustaka.db".to_string(),
            max_connections: 8,
            min_connections: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
        }
    }
}

impl Default for LoansConfig {
    fn default() -> Self {
        Self {
            daily_fine_rate: Decimal::new(1000, 0),
            currency_minor_units: 0,
            block_on_open_obligation: true,
            default_duration_days: 7,
            max_books_per_loan: 5,
        }
    }
}
