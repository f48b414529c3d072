//! HTTP-facing error taxonomy.
//!
//! Every failure a handler can produce maps onto one of these variants, and
//! the [`IntoResponse`] impl is the single place status codes are chosen.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::runner::{CommandResult, RunnerError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed caller input (bad name syntax, bad parameter).
    #[error("{0}")]
    InvalidInput(String),
    /// Operation exists but the loaded policy forbids it.
    #[error("operation `{0}` is not permitted by policy")]
    PermissionDenied(String),
    /// Operation exists but not for this HTTP method.
    #[error("method not allowed, use {allowed}")]
    MethodNotAllowed { allowed: &'static str },
    /// Unknown route, operation, or container.
    #[error("{0}")]
    NotFound(String),
    /// A command that had to succeed did not; carries the full outcome so the
    /// caller sees exactly what ran and what it printed.
    #[error("{reason}")]
    CommandFailed {
        reason: String,
        result: CommandResult,
    },
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::CommandFailed { .. } | ApiError::Runner(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::MethodNotAllowed { allowed } => {
                let mut response = plain(status, format!("method not allowed, use {allowed}\n"));
                if let Ok(value) = HeaderValue::from_str(allowed) {
                    response.headers_mut().insert(header::ALLOW, value);
                }
                response
            }
            ApiError::CommandFailed { reason, result } => {
                plain(status, format!("{reason}\n{}", result.render_text()))
            }
            other => plain(status, format!("{other}\n")),
        }
    }
}

/// Plain-text response with an explicit status.
pub fn plain(status: StatusCode, body: String) -> Response {
    (
        status,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        body,
    )
        .into_response()
}
