//! Process configuration read from environment variables.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_FROM_EMAIL: &str = "noreply@example.com";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

/// Runtime settings for the store, notifications and retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Postgres URL; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub from_email: String,
    pub admin_email: String,
    /// Total delivery attempts for the order confirmation email.
    pub confirmation_max_attempts: u32,
    pub confirmation_retry_delay: Duration,
    /// Attempts for resolving a category path when concurrent writers collide.
    pub category_upsert_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            from_email: DEFAULT_FROM_EMAIL.to_string(),
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            confirmation_max_attempts: 3,
            confirmation_retry_delay: Duration::from_secs(60),
            category_upsert_retries: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            database_url: get("DATABASE_URL"),
            database_max_connections: number(
                "DATABASE_MAX_CONNECTIONS",
                get("DATABASE_MAX_CONNECTIONS"),
                defaults.database_max_connections,
            )?,
            from_email: get("DEFAULT_FROM_EMAIL").unwrap_or(defaults.from_email),
            admin_email: get("ADMIN_NOTIFICATION_EMAIL").unwrap_or(defaults.admin_email),
            confirmation_max_attempts: number(
                "CONFIRMATION_MAX_ATTEMPTS",
                get("CONFIRMATION_MAX_ATTEMPTS"),
                defaults.confirmation_max_attempts,
            )?,
            confirmation_retry_delay: Duration::from_secs(u64::from(number(
                "CONFIRMATION_RETRY_DELAY_SECS",
                get("CONFIRMATION_RETRY_DELAY_SECS"),
                60,
            )?)),
            category_upsert_retries: number(
                "CATEGORY_UPSERT_RETRIES",
                get("CATEGORY_UPSERT_RETRIES"),
                defaults.category_upsert_retries,
            )?,
        })
    }
}

fn number(name: &'static str, raw: Option<String>, default: u32) -> Result<u32, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => match value.trim().parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidNumber { name, value }),
        },
    }
}
