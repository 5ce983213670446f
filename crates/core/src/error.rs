use crate::format::Format;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for all translation operations.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("no translator registered for {from} -> {to}")]
    NoTranslator { from: Format, to: Format },

    /// Aggregated validator failure: the payload does not meet the shape
    /// required by `format`. `fields` lists every offending field.
    #[error("payload does not match {format} schema: {}", fields.join("; "))]
    InvalidSchema { format: String, fields: Vec<String> },

    #[error("empty payload")]
    EmptyPayload,

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// All resolver strategies failed. Carries everything that was tried.
    #[error("no translation path from {from} to {to} ({} paths attempted)", attempted.len())]
    Unroutable {
        from: Format,
        to: Format,
        detected: Option<Format>,
        attempted: Vec<Vec<Format>>,
    },

    #[error("operation canceled")]
    Canceled,

    #[error("translation error: {0}")]
    Translation(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TranslateError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSchema { .. }
            | Self::EmptyPayload
            | Self::InvalidJson(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NoTranslator { .. } | Self::Unroutable { .. } => StatusCode::NOT_FOUND,
            Self::Canceled => StatusCode::REQUEST_TIMEOUT,
            Self::Translation(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::InvalidSchema { .. }
            | Self::EmptyPayload
            | Self::InvalidJson(_)
            | Self::BadRequest(_) => "invalid_request_error",
            Self::NoTranslator { .. } | Self::Unroutable { .. } => "translation_not_supported",
            Self::Canceled => "request_canceled",
            _ => "server_error",
        }
    }
}

impl IntoResponse for TranslateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = axum::Json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": status.as_u16(),
            }
        }));
        (status, body).into_response()
    }
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, TranslateError>;
