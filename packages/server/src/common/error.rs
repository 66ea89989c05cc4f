//! API error taxonomy and HTTP error envelope.
//!
//! Every error surfaced over HTTP renders as
//! `{error: <kind>, message, details?, stack?}` with the stack only present
//! in debug builds.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed input: bad JSON shape, unknown operator, limits exceeded,
    /// bad date, out-of-range batch size.
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Entity missing by id.
    #[error("{0}")]
    NotFound(String),

    /// State machine violation, e.g. replay of a non-terminal event.
    #[error("{0}")]
    Conflict(String),

    /// Uncaught internal failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with_details(
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let Self::Internal(err) = &self {
            tracing::error!(error = %err, "internal error surfaced to client");
        }

        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });

        if let Self::Validation {
            details: Some(details),
            ..
        } = &self
        {
            body["details"] = details.clone();
        }

        // Stack traces leak internals; only expose them in dev builds.
        #[cfg(debug_assertions)]
        if let Self::Internal(err) = &self {
            body["stack"] = json!(format!("{err:?}"));
        }

        (status, Json(body)).into_response()
    }
}
