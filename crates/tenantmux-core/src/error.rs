//! Error types for the `tenantmux` core library.

use thiserror::Error;

/// Result type alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for configuration and startup.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised at the session registry boundary.
///
/// None of these are fatal. Callers surface them to whoever issued the
/// request and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Tenant not found: {tenant_id}")]
    TenantNotFound { tenant_id: String },

    #[error("Stream for tenant {tenant_id} is not connected")]
    NotConnected { tenant_id: String },

    #[error("Stream not open for tenant {tenant_id}")]
    NoOpenStream { tenant_id: String },

    #[error("Stream for tenant {tenant_id} was replaced by a newer connection")]
    StreamReplaced { tenant_id: String },
}

impl SessionError {
    /// Tenant the error refers to.
    pub fn tenant_id(&self) -> &str {
        match self {
            Self::TenantNotFound { tenant_id }
            | Self::NotConnected { tenant_id }
            | Self::NoOpenStream { tenant_id }
            | Self::StreamReplaced { tenant_id } => tenant_id,
        }
    }
}
