//! `tenantmux` Core Library
//!
//! Shared functionality for the tenantmux server:
//! - Tenant directory
//! - Streaming transport with message and close observers
//! - Session registry enforcing one open stream per tenant
//! - Configuration resolution and common error types

pub mod config;
pub mod directory;
pub mod error;
pub mod message;
pub mod registry;
pub mod tracing_init;
pub mod transport;

pub use config::Config;
pub use directory::{TenantDirectory, TenantRecord};
pub use error::{Error, Result, SessionError};
pub use message::Message;
pub use registry::SessionRegistry;
pub use transport::{CloseReason, StreamSession};
