//! Error taxonomy for the gateway pipeline.
//!
//! Every stage reports its own typed error (`AuthError`, `ParseError`,
//! `TranslationError`, `ExecutionError`). At the request boundary they are
//! folded into [`GatewayError`], which records the *origin* of the failure so
//! the HTTP layer can render a distinguishable code for each of them.

use std::any::Any;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

use crate::quota::QuotaExceeded;

/// Numeric error code reported to clients in error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const UNKNOWN_IDENTIFIER: Self = Self(47);
    pub const NOT_IMPLEMENTED: Self = Self(48);
    pub const UNKNOWN_TABLE: Self = Self(60);
    pub const SYNTAX_ERROR: Self = Self(62);
    pub const RECEIVED_ERROR_FROM_REMOTE_IO_SERVER: Self = Self(86);
    pub const TIMEOUT_EXCEEDED: Self = Self(159);
    pub const UNKNOWN_USER: Self = Self(192);
    pub const WRONG_PASSWORD: Self = Self(193);
    pub const IP_ADDRESS_NOT_ALLOWED: Self = Self(195);
    pub const UNKNOWN_QUOTA: Self = Self(199);
    pub const QUOTA_DOESNT_ALLOW_KEYS: Self = Self(200);
    pub const QUOTA_EXPIRED: Self = Self(201);
    pub const LIMIT_EXCEEDED: Self = Self(290);
    pub const QUERY_WAS_CANCELLED: Self = Self(394);

    /// Sentinel for failures raised by a library dependency.
    pub const LIBRARY_EXCEPTION: Self = Self(1000);
    /// Sentinel for runtime failures without domain semantics.
    pub const RUNTIME_EXCEPTION: Self = Self(1001);
    /// Sentinel for anything that could not be classified.
    pub const UNKNOWN_EXCEPTION: Self = Self(1002);

    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// Application error with a well-known code.
    Domain,
    /// Error surfaced by a library or transport dependency.
    Library,
    /// Runtime failure (a panic with a message).
    Runtime,
    /// Anything else.
    Unclassified,
}

/// Failure of any pipeline stage, tagged with its origin.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("{display}")]
    Domain {
        code: ErrorCode,
        display: String,
        detail: String,
    },

    #[error("{display}")]
    Library {
        /// Library specific code (HTTP status, OS error number, or 0).
        code: i32,
        display: String,
        detail: String,
    },

    #[error("{message}")]
    Runtime { message: String },

    #[error("Unknown exception.")]
    Unclassified,
}

impl GatewayError {
    /// Domain error from a typed stage error.
    pub fn domain<E>(code: ErrorCode, err: &E) -> Self
    where
        E: fmt::Display + fmt::Debug + ?Sized,
    {
        Self::Domain {
            code,
            display: err.to_string(),
            detail: format!("{:?}", err),
        }
    }

    /// Error raised by a library dependency.
    pub fn library<E>(code: i32, err: &E) -> Self
    where
        E: fmt::Display + fmt::Debug + ?Sized,
    {
        Self::Library {
            code,
            display: err.to_string(),
            detail: format!("{:?}", err),
        }
    }

    /// Classify a panic payload caught at a task or request boundary.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            Self::Runtime {
                message: (*message).to_string(),
            }
        } else if let Some(message) = payload.downcast_ref::<String>() {
            Self::Runtime {
                message: message.clone(),
            }
        } else {
            Self::Unclassified
        }
    }

    pub fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Domain { .. } => ErrorOrigin::Domain,
            Self::Library { .. } => ErrorOrigin::Library,
            Self::Runtime { .. } => ErrorOrigin::Runtime,
            Self::Unclassified => ErrorOrigin::Unclassified,
        }
    }

    /// Code reported to the client: the domain code or the origin's sentinel.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Domain { code, .. } => *code,
            Self::Library { .. } => ErrorCode::LIBRARY_EXCEPTION,
            Self::Runtime { .. } => ErrorCode::RUNTIME_EXCEPTION,
            Self::Unclassified => ErrorCode::UNKNOWN_EXCEPTION,
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::library(err.raw_os_error().unwrap_or(0), &err)
    }
}

// ============================================================================
// Stage errors
// ============================================================================

/// Bad credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    #[error("Unknown user {0}")]
    UnknownUser(String),

    #[error("Wrong password for user {0}")]
    WrongPassword(String),
}

/// Credentials are valid but the request is not permitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("User {user} is not allowed to connect from address {host}")]
    HostNotAllowed { user: String, host: IpAddr },

    #[error("Unknown quota {0}")]
    UnknownQuota(String),

    #[error("Quota {0} doesn't allow client supplied keys")]
    QuotaKeysNotAllowed(String),
}

/// Failure while binding an identity to an execution context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Authentication(AuthenticationError::UnknownUser(_)) => ErrorCode::UNKNOWN_USER,
            Self::Authentication(AuthenticationError::WrongPassword(_)) => {
                ErrorCode::WRONG_PASSWORD
            }
            Self::Authorization(AuthorizationError::HostNotAllowed { .. }) => {
                ErrorCode::IP_ADDRESS_NOT_ALLOWED
            }
            Self::Authorization(AuthorizationError::UnknownQuota(_)) => ErrorCode::UNKNOWN_QUOTA,
            Self::Authorization(AuthorizationError::QuotaKeysNotAllowed(_)) => {
                ErrorCode::QUOTA_DOESNT_ALLOW_KEYS
            }
        }
    }
}

/// Location inside the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// The request body is not a valid legacy query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Empty query")]
    Empty,

    #[error("Query is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    #[error("Syntax error: {message}")]
    Syntax {
        message: String,
        position: Option<Position>,
    },
}

impl ParseError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::SYNTAX_ERROR
    }
}

/// The structured query has no equivalent in the target language.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error("Unsupported construct: {0}")]
    Unsupported(String),

    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),
}

impl TranslationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unsupported(_) => ErrorCode::NOT_IMPLEMENTED,
            Self::UnknownIdentifier(_) => ErrorCode::UNKNOWN_IDENTIFIER,
            Self::LimitExceeded(_) => ErrorCode::LIMIT_EXCEEDED,
        }
    }
}

/// The downstream engine failed to run the query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("No result is registered for query: {0}")]
    NoSuchQuery(String),

    #[error("Remote server returned HTTP {status}: {message}")]
    Remote {
        code: ErrorCode,
        status: u16,
        message: String,
    },

    #[error("Timeout exceeded: maximum execution time is {limit:?}")]
    Timeout { limit: Duration },

    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceeded),

    #[error("Query was cancelled")]
    Cancelled,
}

impl ExecutionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoSuchQuery(_) => ErrorCode::UNKNOWN_TABLE,
            Self::Remote { code, .. } => *code,
            Self::Timeout { .. } => ErrorCode::TIMEOUT_EXCEEDED,
            Self::QuotaExceeded(_) => ErrorCode::QUOTA_EXPIRED,
            Self::Cancelled => ErrorCode::QUERY_WAS_CANCELLED,
        }
    }
}

macro_rules! domain_error {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for GatewayError {
                fn from(err: $ty) -> Self {
                    GatewayError::domain(err.code(), &err)
                }
            }
        )+
    };
}

domain_error!(AuthError, ParseError, TranslationError, ExecutionError);

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_error_is_domain_with_syntax_code() {
        let err: GatewayError = ParseError::Syntax {
            message: "found 'x'".to_string(),
            position: Some(Position { line: 1, column: 4 }),
        }
        .into();

        assert_eq!(err.origin(), ErrorOrigin::Domain);
        assert_eq!(err.code(), ErrorCode::SYNTAX_ERROR);
        assert_eq!(err.to_string(), "Syntax error: found 'x'");
        match err {
            GatewayError::Domain { detail, .. } => assert!(detail.contains("line: 1")),
            other => panic!("expected domain error, got {:?}", other),
        }
    }

    #[test_case(AuthenticationError::UnknownUser("bob".into()).into(), ErrorCode::UNKNOWN_USER ; "unknown user")]
    #[test_case(AuthenticationError::WrongPassword("bob".into()).into(), ErrorCode::WRONG_PASSWORD ; "wrong password")]
    #[test_case(AuthorizationError::UnknownQuota("q".into()).into(), ErrorCode::UNKNOWN_QUOTA ; "unknown quota")]
    #[test_case(AuthorizationError::QuotaKeysNotAllowed("q".into()).into(), ErrorCode::QUOTA_DOESNT_ALLOW_KEYS ; "keys not allowed")]
    fn test_auth_error_codes(err: AuthError, expected: ErrorCode) {
        assert_eq!(err.code(), expected);
        assert_eq!(GatewayError::from(err).code(), expected);
    }

    #[test]
    fn test_authentication_and_authorization_are_distinguishable() {
        let authn: AuthError = AuthenticationError::WrongPassword("bob".into()).into();
        let authz: AuthError = AuthorizationError::UnknownQuota("q".into()).into();
        assert!(matches!(authn, AuthError::Authentication(_)));
        assert!(matches!(authz, AuthError::Authorization(_)));
    }

    #[test]
    fn test_panic_with_str_is_runtime() {
        let payload = std::panic::catch_unwind(|| {
            panic!("index out of bounds");
        })
        .unwrap_err();
        let err = GatewayError::from_panic(payload);
        assert_eq!(err.origin(), ErrorOrigin::Runtime);
        assert_eq!(err.code(), ErrorCode::RUNTIME_EXCEPTION);
        assert_eq!(err.to_string(), "index out of bounds");
    }

    #[test]
    fn test_panic_with_formatted_message_is_runtime() {
        let payload = std::panic::catch_unwind(|| {
            panic!("bad value {}", 7);
        })
        .unwrap_err();
        let err = GatewayError::from_panic(payload);
        assert_eq!(err.to_string(), "bad value 7");
    }

    #[test]
    fn test_panic_with_other_payload_is_unclassified() {
        let payload = std::panic::catch_unwind(|| {
            std::panic::panic_any(42_u8);
        })
        .unwrap_err();
        let err = GatewayError::from_panic(payload);
        assert_eq!(err.origin(), ErrorOrigin::Unclassified);
        assert_eq!(err.code(), ErrorCode::UNKNOWN_EXCEPTION);
    }

    #[test]
    fn test_io_error_is_library() {
        let err: GatewayError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert_eq!(err.origin(), ErrorOrigin::Library);
        assert_eq!(err.code(), ErrorCode::LIBRARY_EXCEPTION);
    }
}
