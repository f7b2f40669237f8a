use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

/// Longest card validity accepted from configuration, roughly a century.
pub const MAX_CARD_VALIDITY_DAYS: i64 = 36_500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("{0}")]
    Inconsistent(String),
}

/// Policy knobs the ledger consults on every operation.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub min_card_amount: Decimal,
    pub max_card_amount: Decimal,
    pub max_card_balance: Decimal,
    pub card_validity_days: Option<i64>,
    pub code_attempts: u32,
    pub receipt_base_url: String,
    pub receipt_retry_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_card_amount: Decimal::new(100, 2),
            max_card_amount: Decimal::new(50000, 2),
            max_card_balance: Decimal::new(100000, 2),
            card_validity_days: None,
            code_attempts: 5,
            receipt_base_url: "/v1/receipts".to_string(),
            receipt_retry_attempts: 3,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            min_card_amount: env_or("MIN_CARD_AMOUNT", defaults.min_card_amount)?,
            max_card_amount: env_or("MAX_CARD_AMOUNT", defaults.max_card_amount)?,
            max_card_balance: env_or("MAX_CARD_BALANCE", defaults.max_card_balance)?,
            card_validity_days: env_opt("CARD_VALIDITY_DAYS")?,
            code_attempts: env_or("CODE_GENERATION_ATTEMPTS", defaults.code_attempts)?,
            receipt_base_url: dotenv::var("RECEIPT_BASE_URL").unwrap_or(defaults.receipt_base_url),
            receipt_retry_attempts: env_or(
                "RECEIPT_RETRY_ATTEMPTS",
                defaults.receipt_retry_attempts,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_card_amount <= Decimal::ZERO || self.min_card_amount > self.max_card_amount {
            return Err(ConfigError::Inconsistent(format!(
                "card amount bounds {}..{} are not a positive range",
                self.min_card_amount, self.max_card_amount
            )));
        }
        if self.max_card_balance < self.max_card_amount {
            return Err(ConfigError::Inconsistent(format!(
                "max card balance {} is below max card amount {}",
                self.max_card_balance, self.max_card_amount
            )));
        }
        if let Some(days) = self.card_validity_days {
            if !(1..=MAX_CARD_VALIDITY_DAYS).contains(&days) {
                return Err(ConfigError::Inconsistent(format!(
                    "card validity of {days} days is outside 1..={MAX_CARD_VALIDITY_DAYS}"
                )));
            }
        }
        if self.code_attempts == 0 {
            return Err(ConfigError::Inconsistent(
                "code generation needs at least one attempt".to_string(),
            ));
        }
        Ok(())
    }

    pub fn receipt_url(&self, token: &str) -> String {
        format!("{}/{}", self.receipt_base_url.trim_end_matches('/'), token)
    }
}

/// Process-level settings for the HTTP service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub max_connection_pooling: u32,
    pub port: u16,
    pub log_file: String,
    pub ledger: LedgerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: dotenv::var("DATABASE_URL").ok(),
            jwt_secret: dotenv::var("JWT_SECRET").unwrap_or("your-jwt-secret".to_string()),
            max_connection_pooling: env_or("MAX_CONNECTION_POOLING", 5)?,
            port: env_or("PORT", 3000)?,
            log_file: dotenv::var("LOG_FILE").unwrap_or("app.log".to_string()),
            ledger: LedgerConfig::from_env()?,
        })
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(env_opt(key)?.unwrap_or(default))
}

fn env_opt<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match dotenv::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        assert!(LedgerConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_amount_bounds() {
        let config = LedgerConfig {
            min_card_amount: Decimal::new(600, 0),
            ..LedgerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Inconsistent(_))
        ));
    }

    #[test]
    fn card_validity_must_be_a_sane_number_of_days() {
        for days in [-1, 0, MAX_CARD_VALIDITY_DAYS + 1, 200_000_000_000] {
            let config = LedgerConfig {
                card_validity_days: Some(days),
                ..LedgerConfig::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::Inconsistent(_))), "{days}");
        }
        let config = LedgerConfig {
            card_validity_days: Some(365),
            ..LedgerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn receipt_url_joins_without_double_slash() {
        let config = LedgerConfig {
            receipt_base_url: "https://cards.example/receipts/".to_string(),
            ..LedgerConfig::default()
        };
        assert_eq!(
            config.receipt_url("RCPT-abc"),
            "https://cards.example/receipts/RCPT-abc"
        );
    }
}
