//! Loading and validation.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::GatewayConfig;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("user '{user}' sets both password and password_sha256_hex")]
    ConflictingPasswords { user: String },

    #[error("user '{user}' has a password_sha256_hex that is not 64 hex digits")]
    InvalidPasswordHash { user: String },

    #[error("user '{user}' references unknown quota '{quota}'")]
    UnknownQuota { user: String, quota: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl GatewayConfig {
    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded configuration file");
        Self::from_toml_str(&content)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                debug!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed listen address.
    pub fn listen_addr(&self) -> ConfigResult<SocketAddr> {
        self.server
            .listen
            .parse()
            .map_err(|e| invalid("server.listen", format!("{}: {}", self.server.listen, e)))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.listen_addr()?;

        if self.server.max_body_size == 0 {
            return Err(invalid("server.max_body_size", "must be greater than 0"));
        }
        if self.settings.max_execution_time_secs == 0 {
            return Err(invalid(
                "settings.max_execution_time_secs",
                "must be greater than 0",
            ));
        }
        if self.engine.channel_capacity == 0 {
            return Err(invalid("engine.channel_capacity", "must be greater than 0"));
        }
        if self.engine.rows_per_chunk == 0 {
            return Err(invalid("engine.rows_per_chunk", "must be greater than 0"));
        }
        if !(self.engine.url.starts_with("http://") || self.engine.url.starts_with("https://")) {
            return Err(invalid(
                "engine.url",
                format!("{} is not an http(s) URL", self.engine.url),
            ));
        }

        for (name, user) in &self.users {
            if user.password.is_some() && user.password_sha256_hex.is_some() {
                return Err(ConfigError::ConflictingPasswords { user: name.clone() });
            }
            if let Some(hash) = &user.password_sha256_hex {
                if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(ConfigError::InvalidPasswordHash { user: name.clone() });
                }
            }
            if let Some(quota) = &user.quota {
                if !self.quotas.contains_key(quota) {
                    return Err(ConfigError::UnknownQuota {
                        user: name.clone(),
                        quota: quota.clone(),
                    });
                }
            }
        }

        for (name, quota) in &self.quotas {
            if quota.intervals.iter().any(|i| i.duration_secs == 0) {
                return Err(invalid(
                    &format!("quotas.{}.intervals", name),
                    "duration_secs must be greater than 0",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}
