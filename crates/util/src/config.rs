use std::{env, fmt, net::SocketAddr};

use super::server_bind_address;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://erp.db?mode=rwc";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    /// Seed the demo checks and suppliers into empty tables on startup.
    pub seed_demo: bool,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let database_url = env::var("DATABASE_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        if !database_url.starts_with("sqlite:") {
            return Err(ConfigError::InvalidDatabaseUrl(database_url));
        }

        let seed_demo = match env::var("APP_SEED_DEMO") {
            Ok(value) => parse_bool(&value).ok_or(ConfigError::InvalidSeedFlag(value))?,
            Err(_) => environment.is_development(),
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            seed_demo,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidDatabaseUrl(String),
    InvalidSeedFlag(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidDatabaseUrl(value) => {
                write!(f, "DATABASE_URL must be a sqlite: connection string (got {value})")
            }
            Self::InvalidSeedFlag(value) => {
                write!(f, "APP_SEED_DEMO must be a boolean (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tests::ENV_GUARD, DEFAULT_BIND_ADDR};

    fn clear_env() {
        for key in ["APP_ENV", "APP_BIND_ADDR", "DATABASE_URL", "APP_SEED_DEMO"] {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert!(config.seed_demo);
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_env();
    }

    #[test]
    fn parses_production_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("DATABASE_URL", "sqlite:///var/lib/erp/erp.db");

        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.database_url, "sqlite:///var/lib/erp/erp.db");
        assert!(!config.seed_demo);

        clear_env();
    }

    #[test]
    fn seed_flag_overrides_environment_default() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "test");
        env::set_var("APP_SEED_DEMO", "Yes");

        let config = AppConfig::from_env().expect("config should load");
        assert!(config.seed_demo);

        env::set_var("APP_SEED_DEMO", "maybe");
        let err = AppConfig::from_env().expect_err("invalid flag");
        assert!(matches!(err, ConfigError::InvalidSeedFlag(value) if value == "maybe"));

        clear_env();
    }

    #[test]
    fn rejects_non_sqlite_database_url() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/erp");

        let err = AppConfig::from_env().expect_err("unsupported url");
        assert!(matches!(err, ConfigError::InvalidDatabaseUrl(_)));

        clear_env();
    }
}
