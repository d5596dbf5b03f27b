//! Tools a tenant can invoke.

use std::sync::Arc;

use serde_json::{Value, json};

use tenantmux_core::TenantRecord;

/// Text result of a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    /// MCP `tools/call` result shape.
    pub fn to_value(&self) -> Value {
        let mut result = json!({
            "content": [{ "type": "text", "text": self.text }],
        });
        if self.is_error {
            result["isError"] = Value::Bool(true);
        }
        result
    }
}

/// A named operation with an input schema, executed on behalf of a tenant.
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    fn call(&self, tenant: &TenantRecord, arguments: &Value) -> ToolOutput;
}

/// Reports which tenant the request came from.
pub struct TenantEcho;

impl Tool for TenantEcho {
    fn name(&self) -> &'static str {
        "tenant_echo"
    }

    fn description(&self) -> &'static str {
        "Returns a short text naming the tenant the request came from"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false,
        })
    }

    fn call(&self, tenant: &TenantRecord, _arguments: &Value) -> ToolOutput {
        ToolOutput::text(format!("Request from {}", tenant.display_name()))
    }
}

/// Ordered set of tools, looked up by name.
#[derive(Clone)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Tools every tenant gets.
    pub fn builtin() -> Self {
        Self::new(vec![Arc::new(TenantEcho)])
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// MCP `tools/list` result shape.
    pub fn describe(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "inputSchema": t.input_schema(),
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    /// Run `name` for `tenant`. Unknown tools produce an error output rather
    /// than a protocol error.
    pub fn call(&self, name: &str, tenant: &TenantRecord, arguments: &Value) -> ToolOutput {
        match self.get(name) {
            Some(tool) => tool.call(tenant, arguments),
            None => ToolOutput::error(format!("Tool not found: {name}")),
        }
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::builtin()
    }
}
