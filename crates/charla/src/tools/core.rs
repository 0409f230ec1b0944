//! Tool abstraction and dispatch for the agent loop.
//!
//! The [`Tool`] trait defines the interface every tool implements: a static
//! definition (name, description, JSON Schema parameters derived from a
//! typed argument struct) and an async [`Tool::invoke`] returning
//! `Result<String, String>`. Tools are collected into a [`ToolRegistry`]
//! which handles definition export, schema validation, and dispatch.
//!
//! Dispatch never lets a tool failure escape the loop: an invocation error,
//! a validation error, and an unknown tool name all become the content of
//! the resulting `tool` message, for the model to react to on its next
//! iteration.

use crate::{Message, ToolCall, ToolDef};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

/// Fixed content of the tool message produced when the model requests a
/// tool name that is not registered.
pub const TOOL_NOT_FOUND: &str = "tool not found!";

/// Boxed future returned by [`Tool::invoke`].
///
/// Type alias to keep trait signatures and implementations readable.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool the model can invoke via function-calling.
///
/// Implementors provide:
/// - A static definition ([`Tool::definition`]) describing the tool's name,
///   description, and JSON Schema parameters for the model.
/// - An async [`Tool::invoke`] method that receives the call's arguments as
///   a JSON object and returns a result string, or an error string when the
///   operation fails. Both outcomes flow back to the model as tool message
///   content; the distinction exists so implementations never have to
///   format their own error envelope.
///
/// Uses a boxed future so the trait is dyn-compatible (object-safe).
pub trait Tool: Send + Sync {
    /// The tool definition sent to the model API.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given arguments.
    fn invoke(&self, arguments: &serde_json::Value) -> ToolFuture<'_>;

    /// The tool's name (convenience — delegates to definition).
    fn name(&self) -> String {
        self.definition().function.name.clone()
    }
}

// ── ToolRegistry ───────────────────────────────────────────────────

/// A named collection of tools with schema-validated dispatch.
///
/// Declared once at process start; immutable thereafter. A lookup miss is
/// not an error at registration time — it surfaces only at dispatch, as a
/// [`TOOL_NOT_FOUND`] tool message.
///
/// # Example
///
/// ```ignore
/// let registry = ToolRegistry::new()
///     .with(CurrentTime)
///     .with(MathOperations)
///     .with_if(weather_key.is_some(), WeatherForecast::new(key));
///
/// let defs = registry.definitions();
/// let result_msg = registry.dispatch(&tool_call).await;
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Conditionally register a tool (builder pattern).
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// Return all tool definitions for the model API.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch one tool call and produce its result message.
    ///
    /// The returned `tool` message always carries the originating call's id
    /// and name. Its content is, in order of precedence: the
    /// [`TOOL_NOT_FOUND`] sentinel for an unregistered name, a validation
    /// error when the arguments do not match the declared schema, the
    /// error string when the tool fails, or the tool's result.
    pub async fn dispatch(&self, call: &ToolCall) -> Message {
        let name = &call.function.name;
        let Some(tool) = self.tools.get(name) else {
            warn!("tool {name} not found");
            return Message::tool_result(&call.id, name, TOOL_NOT_FOUND);
        };

        let arguments = serde_json::Value::Object(call.function.arguments.clone());

        if let Some(error) = validate_arguments(tool.as_ref(), &arguments) {
            warn!("tool {name} rejected arguments: {error}");
            return Message::tool_result(&call.id, name, error);
        }

        info!(
            "TOOL {name}({})",
            serde_json::to_string(&arguments).unwrap_or_default()
        );
        let start = std::time::Instant::now();

        let content = match tool.invoke(&arguments).await {
            Ok(result) => result,
            Err(error) => {
                warn!("tool {name} failed: {error}");
                error
            }
        };

        debug!(
            "tool {name} completed in {:.0}ms ({} bytes)",
            start.elapsed().as_secs_f64() * 1000.0,
            content.len()
        );

        Message::tool_result(&call.id, name, content)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Argument validation ────────────────────────────────────────────

/// Validate arguments against the tool's declared JSON Schema before
/// invocation. Returns a structured error message the model can use to
/// self-correct, or `None` when the arguments are valid.
pub fn validate_arguments(tool: &dyn Tool, arguments: &serde_json::Value) -> Option<String> {
    let schema = tool.definition().function.parameters;

    let validator = match jsonschema::validator_for(&schema) {
        Ok(v) => v,
        Err(_) => return None, // If the schema itself is invalid, skip validation.
    };

    let errors: Vec<String> = validator
        .iter_errors(arguments)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Error: argument validation failed for tool '{}':\n{}\nPlease fix the arguments and try again.",
            tool.name(),
            errors.join("\n"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FunctionCall, MessageRole, ToolType, json_schema_for};
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        text: String,
    }

    struct Echo;

    impl Tool for Echo {
        fn definition(&self) -> ToolDef {
            ToolDef::new("echo", "Echo the given text back", json_schema_for::<EchoArgs>())
        }

        fn invoke(&self, arguments: &serde_json::Value) -> ToolFuture<'_> {
            let arguments = arguments.clone();
            Box::pin(async move {
                let args: EchoArgs =
                    serde_json::from_value(arguments).map_err(|e| format!("Error: {e}"))?;
                Ok(args.text)
            })
        }
    }

    struct AlwaysFails;

    impl Tool for AlwaysFails {
        fn definition(&self) -> ToolDef {
            ToolDef::new("always_fails", "Fails", serde_json::json!({"type": "object"}))
        }

        fn invoke(&self, _arguments: &serde_json::Value) -> ToolFuture<'_> {
            Box::pin(async { Err("Error: it broke".to_string()) })
        }
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call-7".into(),
            call_type: ToolType::Function,
            function: FunctionCall {
                name: name.into(),
                arguments: args.as_object().cloned().unwrap_or_default(),
            },
        }
    }

    #[tokio::test]
    async fn dispatch_links_result_to_call_id() {
        let registry = ToolRegistry::new().with(Echo);
        let msg = registry
            .dispatch(&call("echo", serde_json::json!({"text": "hola"})))
            .await;
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call-7"));
        assert_eq!(msg.name.as_deref(), Some("echo"));
        assert_eq!(msg.content, "hola");
    }

    #[tokio::test]
    async fn unknown_tool_yields_not_found_sentinel() {
        let registry = ToolRegistry::new().with(Echo);
        let msg = registry
            .dispatch(&call("nonexistent_tool", serde_json::json!({})))
            .await;
        assert_eq!(msg.content, TOOL_NOT_FOUND);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call-7"));
    }

    #[tokio::test]
    async fn failing_tool_becomes_message_content() {
        let registry = ToolRegistry::new().with(AlwaysFails);
        let msg = registry
            .dispatch(&call("always_fails", serde_json::json!({})))
            .await;
        assert_eq!(msg.content, "Error: it broke");
    }

    #[tokio::test]
    async fn invalid_arguments_rejected_before_invocation() {
        let registry = ToolRegistry::new().with(Echo);
        let msg = registry
            .dispatch(&call("echo", serde_json::json!({"text": 42})))
            .await;
        assert!(msg.content.contains("argument validation failed"));
    }

    #[test]
    fn with_if_skips_when_false() {
        let registry = ToolRegistry::new().with_if(false, Echo);
        assert!(registry.is_empty());
        let registry = ToolRegistry::new().with_if(true, Echo);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn definitions_export_schema() {
        let registry = ToolRegistry::new().with(Echo);
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].function.name, "echo");
        assert_eq!(defs[0].function.parameters["type"], "object");
    }
}
