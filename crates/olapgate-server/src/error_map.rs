//! Rendering failures for clients and logs.
//!
//! Each error origin has its own text format so a client can tell them
//! apart by the leading code:
//!
//! ```text
//! Code: 62, e.displayText() = Syntax error: ..., e.what() = Syntax { .. }
//! Code: 1000, e.code() = 111, e.displayText() = ..., e.what() = ...
//! Code: 1001. index out of bounds
//! Code: 1002. Unknown exception.
//! ```

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use olapgate_core::{ErrorCode, ErrorOrigin, GatewayError};
use tracing::error;

use crate::progress::ResponseProgress;

const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";

/// A classified failure, ready to be logged or sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub origin: ErrorOrigin,
    pub code: ErrorCode,
    pub text: String,
}

impl ErrorReport {
    pub fn classify(err: &GatewayError) -> Self {
        let text = match err {
            GatewayError::Domain {
                code,
                display,
                detail,
            } => format!(
                "Code: {}, e.displayText() = {}, e.what() = {}",
                code, display, detail
            ),
            GatewayError::Library {
                code,
                display,
                detail,
            } => format!(
                "Code: {}, e.code() = {}, e.displayText() = {}, e.what() = {}",
                ErrorCode::LIBRARY_EXCEPTION,
                code,
                display,
                detail
            ),
            GatewayError::Runtime { message } => {
                format!("Code: {}. {}", ErrorCode::RUNTIME_EXCEPTION, message)
            }
            GatewayError::Unclassified => {
                format!("Code: {}. Unknown exception.", ErrorCode::UNKNOWN_EXCEPTION)
            }
        };

        Self {
            origin: err.origin(),
            code: err.code(),
            text,
        }
    }
}

impl IntoResponse for ErrorReport {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, TEXT_PLAIN)],
            format!("{}\n", self.text),
        )
            .into_response()
    }
}

/// Turns failures into log records and, when still possible, responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorMapper;

impl ErrorMapper {
    /// Log `err` and move the response to `Failed`.
    ///
    /// Returns the 500 response only when nothing has been sent yet; after
    /// that the connection has to be aborted by the caller instead.
    pub fn fail(&self, progress: &ResponseProgress, err: &GatewayError) -> Option<Response> {
        let report = ErrorReport::classify(err);
        let previous = progress.fail();
        error!(origin = ?report.origin, code = %report.code, "{}", report.text);

        if previous.headers_sent() {
            None
        } else {
            Some(report.into_response())
        }
    }
}
