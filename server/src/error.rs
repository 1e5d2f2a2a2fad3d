use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use tts_core::LoadState;

/// Failures surfaced by the HTTP API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Speech model is not ready (state: {0:?})")]
    NotReady(LoadState),

    #[error("Unknown voice: {0}")]
    UnknownVoice(String),

    /// The orchestrator task stopped or dropped a reply.
    #[error("Speech host unavailable: {0}")]
    HostUnavailable(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UnknownVoice(_) => StatusCode::NOT_FOUND,
            ApiError::HostUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::NotReady(_) => "not_ready",
            ApiError::UnknownVoice(_) => "unknown_voice",
            ApiError::HostUnavailable(_) => "host_unavailable",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && !matches!(self, ApiError::NotReady(_)) {
            tracing::error!("{self}");
        }

        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
