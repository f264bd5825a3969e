//! IF-020: Tool registry: typed handlers with derived JSON schemas.
//!
//! A tool is a function `Fn(Args) -> Result<String, ToolError>`. Its
//! parameter schema is derived from `Args` once, at registration; fields
//! that are `Option` or carry `#[serde(default)]` are optional, everything
//! else is required. Dispatch decodes JSON arguments into `Args` and calls
//! the handler.

use crate::error::{RegistryError, ToolError};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Type-erased handler stored in the registry.
pub type ToolHandler = Arc<dyn Fn(Value) -> Result<String, ToolError> + Send + Sync>;

/// A registered tool.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema object for the arguments.
    pub parameters: Value,
    pub required: Vec<String>,
    handler: ToolHandler,
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Function-calling schema: `{"type":"function","function":{...}}`.
    pub fn to_function_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Name → tool map. Append-only after startup.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolDescriptor>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_tools())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`; returns the handler unchanged.
    pub fn register<A, F>(
        &mut self,
        name: &str,
        description: &str,
        handler: F,
    ) -> Result<F, RegistryError>
    where
        A: DeserializeOwned + JsonSchema + 'static,
        F: Fn(A) -> Result<String, ToolError> + Clone + Send + Sync + 'static,
    {
        if self.tools.contains_key(name) {
            return Err(RegistryError::RegistrationConflict {
                kind: "tool",
                name: name.to_string(),
            });
        }

        let (parameters, required) = derive_schema::<A>(name)?;
        let tool_name = name.to_string();
        let typed = handler.clone();
        let erased: ToolHandler = Arc::new(move |args: Value| {
            let args = if args.is_null() { json!({}) } else { args };
            let parsed: A =
                serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
                    name: tool_name.clone(),
                    reason: e.to_string(),
                })?;
            typed(parsed)
        });

        debug!(tool = name, ?required, "tool registered");
        self.tools.insert(
            name.to_string(),
            ToolDescriptor {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
                required,
                handler: erased,
            },
        );
        Ok(handler)
    }

    /// Call a tool by name with JSON arguments.
    pub fn dispatch(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
            available: self.tools.keys().cloned().collect(),
        })?;
        debug!(tool = name, "dispatching");
        (tool.handler)(args)
    }

    /// Function-calling schemas for every tool, in registration order.
    pub fn get_schemas(&self) -> Vec<Value> {
        self.tools.values().map(ToolDescriptor::to_function_schema).collect()
    }

    /// Name → handler view.
    pub fn get_callables(&self) -> IndexMap<String, ToolHandler> {
        self.tools
            .iter()
            .map(|(k, t)| (k.clone(), Arc::clone(&t.handler)))
            .collect()
    }

    pub fn list_tools(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn get_tool_info(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// JSON Schema for `A` with the root `$schema`/`title` noise removed, plus
/// its required-field list.
fn derive_schema<A: JsonSchema>(tool: &str) -> Result<(Value, Vec<String>), RegistryError> {
    let root = schemars::schema_for!(A);
    let mut value = serde_json::to_value(&root).map_err(|e| RegistryError::Schema {
        name: tool.to_string(),
        reason: e.to_string(),
    })?;
    let obj = value.as_object_mut().ok_or_else(|| RegistryError::Schema {
        name: tool.to_string(),
        reason: "schema is not an object".to_string(),
    })?;
    obj.remove("$schema");
    obj.remove("title");
    obj.insert("type".to_string(), json!("object"));
    obj.entry("properties").or_insert_with(|| json!({}));
    let required = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    obj.entry("required").or_insert_with(|| json!([]));
    Ok((value, required))
}
