//! tenantmux Server Library
//!
//! HTTP surface for the tenant session registry:
//! - One server-sent-events stream per tenant, replaced on reconnect
//! - Command intake correlated to the tenant's open stream
//! - Built-in tools and the dispatcher that answers tenant commands

pub mod dispatch;
pub mod error;
pub mod routes;
pub mod stream;
pub mod tools;

pub use dispatch::Dispatcher;
pub use error::ApiError;
pub use routes::{AppState, build_router};
