//! Messages carried over a tenant stream.
//!
//! A message is a request, a response or an error depending on which optional
//! fields are populated. The shape follows JSON-RPC 2.0 closely enough that
//! MCP-style clients can talk to it directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error code for malformed parameters.
pub const INVALID_PARAMS: i64 = -32602;

/// A single frame on a tenant stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// Message classification, derived from the populated fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
    Error,
    /// Nothing recognisable is populated.
    Empty,
}

impl Message {
    /// Build a request with the given method.
    pub fn request(id: Option<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some("2.0".to_string()),
            id,
            method: Some(method.into()),
            params,
            ..Default::default()
        }
    }

    /// Build a successful response correlated to `id`.
    pub fn response(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: Some("2.0".to_string()),
            id,
            result: Some(result),
            ..Default::default()
        }
    }

    /// Build an error response correlated to `id`.
    pub fn error_response(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Some("2.0".to_string()),
            id,
            error: Some(serde_json::json!({
                "code": code,
                "message": message.into(),
            })),
            ..Default::default()
        }
    }

    pub const fn kind(&self) -> MessageKind {
        if self.method.is_some() {
            MessageKind::Request
        } else if self.error.is_some() {
            MessageKind::Error
        } else if self.result.is_some() {
            MessageKind::Response
        } else {
            MessageKind::Empty
        }
    }

    pub const fn is_request(&self) -> bool {
        matches!(self.kind(), MessageKind::Request)
    }

    pub const fn is_response(&self) -> bool {
        matches!(self.kind(), MessageKind::Response | MessageKind::Error)
    }

    /// A request without an `id` expects no reply.
    pub const fn is_notification(&self) -> bool {
        self.is_request() && self.id.is_none()
    }

    /// Encode as a single line of compact JSON.
    pub fn to_line(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
