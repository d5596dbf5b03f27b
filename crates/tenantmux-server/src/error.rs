//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use tenantmux_core::SessionError;

/// Errors surfaced to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn tenant_not_found(tenant_id: &str) -> Self {
        Self::Session(SessionError::TenantNotFound {
            tenant_id: tenant_id.to_string(),
        })
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Session(SessionError::TenantNotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Session(
                SessionError::NoOpenStream { .. }
                | SessionError::NotConnected { .. }
                | SessionError::StreamReplaced { .. },
            ) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
