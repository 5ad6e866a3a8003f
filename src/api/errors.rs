//! HTTP error mapping for control-surface handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::envelope::ApiResponse;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Internal failure, reported as `{action}: {error}`.
    pub fn internal(action: &str, error: &anyhow::Error) -> Self {
        Self::Internal(format!("{action}: {error:#}"))
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(m) | Self::Unauthorized(m) | Self::Internal(m) => m,
        };
        if status.is_server_error() {
            tracing::error!("❌ {}", message);
        }
        (status, ApiResponse::<()>::failure(message)).into_response()
    }
}
