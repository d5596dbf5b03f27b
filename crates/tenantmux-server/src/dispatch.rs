//! Turns inbound tenant commands into replies.
//!
//! The dispatcher is pure: it never touches the stream. The caller routes the
//! reply through the session registry so it reaches the tenant's open stream.

use serde_json::{Value, json};
use tracing::debug;

use tenantmux_core::TenantRecord;
use tenantmux_core::message::{INVALID_PARAMS, METHOD_NOT_FOUND, Message};

use crate::tools::ToolSet;

/// Protocol revision advertised in the `initialize` reply.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const SERVER_NAME: &str = "tenantmux";

type Reply = Result<Value, (i64, String)>;

/// Answers the command methods a tenant client may invoke.
#[derive(Clone, Default)]
pub struct Dispatcher {
    tools: ToolSet,
}

impl Dispatcher {
    pub const fn new(tools: ToolSet) -> Self {
        Self { tools }
    }

    pub const fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Build the reply for `message`, or `None` if no reply is due
    /// (notifications and client-side responses).
    pub fn handle(&self, tenant: &TenantRecord, message: &Message) -> Option<Message> {
        let method = message.method.as_deref()?;
        if message.is_notification() {
            debug!(tenant_id = %tenant.id, method, "Notification received");
            return None;
        }

        let reply = match method {
            "initialize" => Ok(Self::initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools.describe()),
            "tools/call" => self.call_tool(tenant, message.params.as_ref()),
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        };

        let id = message.id.clone();
        Some(match reply {
            Ok(result) => Message::response(id, result),
            Err((code, text)) => Message::error_response(id, code, text),
        })
    }

    fn initialize() -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": { "tools": {} },
        })
    }

    fn call_tool(&self, tenant: &TenantRecord, params: Option<&Value>) -> Reply {
        let Some(name) = params.and_then(|p| p.get("name")).and_then(Value::as_str) else {
            return Err((INVALID_PARAMS, "tools/call requires a tool name".to_string()));
        };
        let arguments = params
            .and_then(|p| p.get("arguments"))
            .cloned()
            .unwrap_or(Value::Null);

        debug!(tenant_id = %tenant.id, tool = name, "Calling tool");
        Ok(self.tools.call(name, tenant, &arguments).to_value())
    }
}
