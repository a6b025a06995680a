use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use secrecy::SecretBox;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::engine::{CertificatePolicy, EngineSettings};
use crate::retry::RetryPolicy;

#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub app: AppConfig,
    pub certificates: CertificateConfig,
    pub store_retry: StoreRetryConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

#[derive(Debug)]
pub struct DatabaseConfig {
    pub url: SecretBox<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub name: String,
    pub environment: Environment,
}

#[derive(Debug, Clone)]
pub struct CertificateConfig {
    pub expiring_window_months: i32,
    pub code_prefix: String,
    pub code_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct StoreRetryConfig {
    pub attempts: u32,
    pub base_delay: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

/// Reads an optional variable, falling back to `default` when unset.
fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(val) => val
            .parse()
            .with_context(|| format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Server configuration
        let host = var_or::<IpAddr>("SERVER_HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port = var_or::<u16>("SERVER_PORT", 8000)?;

        // Database configuration
        let db_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let max_connections = var_or("DATABASE_MAX_CONNECTIONS", 10)?;
        let min_connections = var_or("DATABASE_MIN_CONNECTIONS", 1)?;
        let acquire_timeout_secs = var_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 5u64)?;

        // App configuration
        let environment = env::var("APP_ENVIRONMENT")
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or_default();
        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "Aviation Training Backend".to_string());

        // Certificate issuance
        let expiring_window_months = var_or::<i32>("CERTIFICATE_EXPIRING_WINDOW_MONTHS", 3)?;
        if expiring_window_months < 0 {
            anyhow::bail!("CERTIFICATE_EXPIRING_WINDOW_MONTHS must not be negative");
        }
        let code_prefix = env::var("CERTIFICATE_CODE_PREFIX").unwrap_or_else(|_| "ATC".to_string());
        let code_attempts = var_or::<u32>("CERTIFICATE_CODE_ATTEMPTS", 5)?;

        // Entity store retries
        let retry_attempts = var_or("STORE_RETRY_ATTEMPTS", 3)?;
        let retry_base_ms = var_or("STORE_RETRY_BASE_MS", 100u64)?;

        Ok(Config {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: SecretBox::new(Box::new(db_url)),
                max_connections,
                min_connections,
                acquire_timeout: Duration::from_secs(acquire_timeout_secs),
            },
            app: AppConfig {
                name: app_name,
                environment,
            },
            certificates: CertificateConfig {
                expiring_window_months,
                code_prefix,
                code_attempts: code_attempts.max(1),
            },
            store_retry: StoreRetryConfig {
                attempts: retry_attempts,
                base_delay: Duration::from_millis(retry_base_ms),
            },
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == Environment::Production
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            certificate_code_prefix: self.certificates.code_prefix.clone(),
            certificates: CertificatePolicy {
                expiring_window_months: self.certificates.expiring_window_months,
                code_attempts: self.certificates.code_attempts,
            },
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.store_retry.attempts, self.store_retry.base_delay)
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "development" => Ok(Environment::Development),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

static CONFIG: OnceCell<Config> = OnceCell::new();

pub fn init() -> Result<&'static Config> {
    CONFIG.get_or_try_init(Config::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PRODUCTION".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("staging".parse::<Environment>(), Ok(Environment::Staging));
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_var_or_falls_back_when_unset() {
        let value: u32 = var_or("AVIATION_TRAINING_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
