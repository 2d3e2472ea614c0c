use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::runtime::parse_api_version;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub secret_key: String,
    pub listen_addr: String,
    pub database_url: String,
    pub docker_host: Option<String>,
    pub docker_api_version: Option<String>,
    pub admin_password: Option<String>,
    pub user_password: Option<String>,
    pub log_dir: String,
    pub login_max_attempts: usize,
    pub login_window_secs: i64,
    pub runtime_timeout_secs: u64,
    pub audit_timeout_secs: u64,
    pub bcrypt_cost: u32,
    pub secure_cookies: bool,
    pub trust_forwarded_for: bool,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub struct PartialServerConfig {
    secret_key: Option<String>,
    listen_addr: Option<String>,
    database_url: Option<String>,
    docker_host: Option<String>,
    docker_api_version: Option<String>,
    admin_password: Option<String>,
    user_password: Option<String>,
    log_dir: Option<String>,
    login_max_attempts: Option<usize>,
    login_window_secs: Option<i64>,
    runtime_timeout_secs: Option<u64>,
    audit_timeout_secs: Option<u64>,
    bcrypt_cost: Option<u32>,
    secure_cookies: Option<bool>,
    trust_forwarded_for: Option<bool>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_database_url() -> String {
    "sqlite://data/dockwarden.db?mode=rwc".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

const DEFAULT_LOGIN_MAX_ATTEMPTS: usize = 5;
const DEFAULT_LOGIN_WINDOW_SECS: i64 = 600;
const DEFAULT_RUNTIME_TIMEOUT_SECS: u64 = 5;
const DEFAULT_AUDIT_TIMEOUT_SECS: u64 = 5;

impl ServerConfig {
    /// Configuration with every optional setting at its default.
    pub fn with_secret(secret_key: impl Into<String>) -> Result<Self, ConfigError> {
        let partial = PartialServerConfig {
            secret_key: Some(secret_key.into()),
            ..Default::default()
        };
        Self::merge(partial, PartialServerConfig::default())
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) => Self::read_file(Path::new(path_str))?,
            None => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()?;

        // 3. Merge: environment overrides file
        Self::merge(env_config, file_config)
    }

    fn read_file(path: &Path) -> Result<PartialServerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PartialServerConfig::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse_toml(contents: &str) -> Result<PartialServerConfig, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Values in `primary` win over values in `fallback`.
    pub fn merge(
        primary: PartialServerConfig,
        fallback: PartialServerConfig,
    ) -> Result<Self, ConfigError> {
        let config = ServerConfig {
            secret_key: primary
                .secret_key
                .or(fallback.secret_key)
                .ok_or(ConfigError::Missing("SECRET_KEY"))?,
            listen_addr: primary
                .listen_addr
                .or(fallback.listen_addr)
                .unwrap_or_else(default_listen_addr),
            database_url: primary
                .database_url
                .or(fallback.database_url)
                .unwrap_or_else(default_database_url),
            docker_host: primary.docker_host.or(fallback.docker_host),
            docker_api_version: primary.docker_api_version.or(fallback.docker_api_version),
            admin_password: primary.admin_password.or(fallback.admin_password),
            user_password: primary.user_password.or(fallback.user_password),
            log_dir: primary
                .log_dir
                .or(fallback.log_dir)
                .unwrap_or_else(default_log_dir),
            login_max_attempts: primary
                .login_max_attempts
                .or(fallback.login_max_attempts)
                .unwrap_or(DEFAULT_LOGIN_MAX_ATTEMPTS),
            login_window_secs: primary
                .login_window_secs
                .or(fallback.login_window_secs)
                .unwrap_or(DEFAULT_LOGIN_WINDOW_SECS),
            runtime_timeout_secs: primary
                .runtime_timeout_secs
                .or(fallback.runtime_timeout_secs)
                .unwrap_or(DEFAULT_RUNTIME_TIMEOUT_SECS),
            audit_timeout_secs: primary
                .audit_timeout_secs
                .or(fallback.audit_timeout_secs)
                .unwrap_or(DEFAULT_AUDIT_TIMEOUT_SECS),
            bcrypt_cost: primary
                .bcrypt_cost
                .or(fallback.bcrypt_cost)
                .unwrap_or(bcrypt::DEFAULT_COST),
            secure_cookies: primary
                .secure_cookies
                .or(fallback.secure_cookies)
                .unwrap_or(false),
            trust_forwarded_for: primary
                .trust_forwarded_for
                .or(fallback.trust_forwarded_for)
                .unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "secret_key",
                reason: "must not be empty".to_string(),
            });
        }
        if self.login_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "login_max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.login_window_secs <= 0 {
            return Err(ConfigError::Invalid {
                field: "login_window_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.runtime_timeout_secs == 0 || self.audit_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeouts",
                reason: "runtime and audit timeouts must be positive".to_string(),
            });
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::Invalid {
                field: "bcrypt_cost",
                reason: format!("{} is outside 4..=31", self.bcrypt_cost),
            });
        }
        if let Some(version) = &self.docker_api_version {
            if parse_api_version(version).is_none() {
                return Err(ConfigError::Invalid {
                    field: "docker_api_version",
                    reason: format!("'{version}' is not of the form MAJOR.MINOR"),
                });
            }
        }
        Ok(())
    }

    pub fn runtime_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime_timeout_secs)
    }

    pub fn audit_timeout(&self) -> Duration {
        Duration::from_secs(self.audit_timeout_secs)
    }
}
