//! Server error types.

use olapgate_config::ConfigError;
use olapgate_core::{ErrorCode, GatewayError};
use thiserror::Error;

/// Failure starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to set up {engine} engine: {source}")]
    Engine {
        engine: &'static str,
        source: GatewayError,
    },
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// The request could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Request body is larger than {limit} bytes")]
    BodyTooLarge { limit: usize },
}

impl RequestError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BodyTooLarge { .. } => ErrorCode::LIMIT_EXCEEDED,
        }
    }
}

impl From<RequestError> for GatewayError {
    fn from(err: RequestError) -> Self {
        GatewayError::domain(err.code(), &err)
    }
}
