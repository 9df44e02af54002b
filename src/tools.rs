//! Client-side tools the agent can call.
//!
//! A [`Tool`] pairs a declaration (name, description, JSON Schema) with an async
//! handler. Tools are registered per session; when the agent sends `tool.call`
//! the session's [`ToolRegistry`] resolves the handler and turns whatever it
//! returns (including errors) into a [`ToolResult`] for the model.
//!
//! ```ignore
//! #[derive(Deserialize)]
//! struct WeatherArgs { city: String }
//!
//! let tool = Tool::typed("get_weather", |args: WeatherArgs, _inv| async move {
//!     anyhow::Ok(ToolResult::text(format!("Sunny in {}", args.city)))
//! })
//! .with_description("Get the current weather for a city")
//! .with_parameters(json!({
//!     "type": "object",
//!     "properties": { "city": { "type": "string" } },
//!     "required": ["city"]
//! }));
//! ```

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CopilotError, Result};
use crate::log;
use crate::protocol::ToolDeclaration;

/// Text returned to the model when a handler fails; details go in `error`
pub const TOOL_ERROR_TEXT: &str =
    "Invoking this tool produced an error. Detailed information is not available.";

pub type ToolFuture = BoxFuture<'static, anyhow::Result<ToolResult>>;

type HandlerFn = Arc<dyn Fn(ToolInvocation) -> ToolFuture + Send + Sync>;

/// A single `tool.call` from the agent
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub session_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultType {
    Success,
    Failure,
    Rejected,
    Denied,
}

/// Outcome of a tool call as sent back to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub text_result_for_llm: String,
    pub result_type: ToolResultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_telemetry: Option<Value>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text_result_for_llm: text.into(),
            result_type: ToolResultType::Success,
            error: None,
            session_log: None,
            tool_telemetry: None,
        }
    }

    /// Success result carrying `value`; strings pass through, the rest is pretty JSON
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)?;
        let text = match value {
            Value::String(s) => s,
            other => serde_json::to_string_pretty(&other)?,
        };
        Ok(Self::text(text))
    }

    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            text_result_for_llm: message.clone(),
            result_type: ToolResultType::Failure,
            error: Some(message),
            session_log: None,
            tool_telemetry: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            result_type: ToolResultType::Rejected,
            ..Self::failure(message)
        }
    }

    pub fn with_session_log(mut self, log: impl Into<String>) -> Self {
        self.session_log = Some(log.into());
        self
    }

    pub fn with_telemetry(mut self, telemetry: Value) -> Self {
        self.tool_telemetry = Some(telemetry);
        self
    }

    pub fn is_success(&self) -> bool {
        self.result_type == ToolResultType::Success
    }
}

/// Tool declaration plus handler
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: Option<String>,
    parameters: Option<Value>,
    handler: HandlerFn,
}

impl Tool {
    /// Tool whose handler receives the raw invocation
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ToolResult>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            parameters: None,
            handler: Arc::new(move |invocation| handler(invocation).boxed()),
        }
    }

    /// Tool whose arguments are deserialized into `A` before the handler runs.
    ///
    /// Arguments that don't match `A` yield a failure result and the handler
    /// is not called.
    pub fn typed<A, F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(A, ToolInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ToolResult>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(name, move |invocation: ToolInvocation| {
            let handler = handler.clone();
            async move {
                match serde_json::from_value::<A>(invocation.arguments.clone()) {
                    Ok(args) => handler(args, invocation).await,
                    Err(e) => Ok(ToolResult::failure(format!(
                        "Invalid arguments for tool '{}': {}",
                        invocation.tool_name, e
                    ))),
                }
            }
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// JSON Schema for the arguments object
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// Run the handler; errors and panics become a failure result
    pub async fn call(&self, invocation: ToolInvocation) -> ToolResult {
        let handler = &self.handler;
        let outcome = AssertUnwindSafe(async move { handler(invocation).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ToolResult {
                error: Some(e.to_string()),
                ..ToolResult::failure(TOOL_ERROR_TEXT)
            },
            Err(_) => {
                log::log_event(&format!("Tool {} panicked", self.name));
                ToolResult {
                    error: Some("tool handler panicked".to_string()),
                    ..ToolResult::failure(TOOL_ERROR_TEXT)
                }
            }
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Tools available to one session, in declaration order
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a tool list, rejecting duplicate names
    pub fn from_tools(tools: Vec<Tool>) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, tool: Tool) -> Result<()> {
        if self.contains(tool.name()) {
            return Err(CopilotError::Configuration(format!(
                "Tool '{}' is registered more than once",
                tool.name()
            )));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(Tool::name).collect()
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(Tool::declaration).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve and run the tool named in `invocation`
    pub async fn invoke(&self, invocation: ToolInvocation) -> ToolResult {
        let Some(tool) = self.get(&invocation.tool_name) else {
            log::log_event(&format!("Unknown tool requested: {}", invocation.tool_name));
            return ToolResult::failure(format!(
                "Tool '{}' is not supported by this client instance.",
                invocation.tool_name
            ));
        };

        log::log_event(&format!(
            "Tool call: {} (id={})",
            invocation.tool_name, invocation.tool_call_id
        ));
        let result = tool.call(invocation).await;
        if !result.is_success() {
            log::log_event(&format!("Tool {} failed: {:?}", tool.name(), result.error));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invocation(tool_name: &str, arguments: Value) -> ToolInvocation {
        ToolInvocation {
            session_id: "s1".into(),
            tool_call_id: "call-1".into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    #[derive(Deserialize)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    fn add_tool() -> Tool {
        Tool::typed("add", |args: AddArgs, _inv| async move {
            anyhow::Ok(ToolResult::text((args.a + args.b).to_string()))
        })
        .with_description("Add two integers")
        .with_parameters(json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
            "required": ["a", "b"]
        }))
    }

    #[tokio::test]
    async fn test_typed_tool_success() {
        let registry = ToolRegistry::from_tools(vec![add_tool()]).unwrap();
        let result = registry.invoke(invocation("add", json!({"a": 2, "b": 40}))).await;
        assert_eq!(result, ToolResult::text("42"));
    }

    #[tokio::test]
    async fn test_typed_tool_bad_arguments() {
        let registry = ToolRegistry::from_tools(vec![add_tool()]).unwrap();
        let result = registry.invoke(invocation("add", json!({"a": "two"}))).await;
        assert_eq!(result.result_type, ToolResultType::Failure);
        assert!(result.text_result_for_llm.starts_with("Invalid arguments for tool 'add'"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.invoke(invocation("missing", Value::Null)).await;
        assert_eq!(result.result_type, ToolResultType::Failure);
        assert_eq!(
            result.text_result_for_llm,
            "Tool 'missing' is not supported by this client instance."
        );
    }

    #[tokio::test]
    async fn test_handler_error_is_hidden_from_model() {
        let tool = Tool::new("explode", |_inv| async {
            Err::<ToolResult, _>(anyhow::anyhow!("disk on fire"))
        });
        let result = tool.call(invocation("explode", json!({}))).await;
        assert_eq!(result.result_type, ToolResultType::Failure);
        assert_eq!(result.text_result_for_llm, TOOL_ERROR_TEXT);
        assert_eq!(result.error.as_deref(), Some("disk on fire"));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_failure() {
        let tool = Tool::new("boom", |_inv| async {
            if true {
                panic!("handler bug");
            }
            anyhow::Ok(ToolResult::text("unreachable"))
        });
        let result = tool.call(invocation("boom", json!({}))).await;
        assert_eq!(result.result_type, ToolResultType::Failure);
        assert_eq!(result.text_result_for_llm, TOOL_ERROR_TEXT);
        assert_eq!(result.error.as_deref(), Some("tool handler panicked"));

        // The tool stays usable after a panic
        let registry = ToolRegistry::from_tools(vec![tool, add_tool()]).unwrap();
        let result = registry.invoke(invocation("add", json!({"a": 1, "b": 1}))).await;
        assert_eq!(result, ToolResult::text("2"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = ToolRegistry::from_tools(vec![add_tool(), add_tool()]).unwrap_err();
        assert!(matches!(err, CopilotError::Configuration(_)));
    }

    #[test]
    fn test_declaration_wire_shape() {
        let decl = serde_json::to_value(add_tool().declaration()).unwrap();
        assert_eq!(decl["name"], "add");
        assert_eq!(decl["description"], "Add two integers");
        assert_eq!(decl["parameters"]["required"], json!(["a", "b"]));

        let bare = serde_json::to_value(
            Tool::new("noop", |_inv| async { anyhow::Ok(ToolResult::text("ok")) }).declaration(),
        )
        .unwrap();
        assert_eq!(bare, json!({"name": "noop"}));
    }

    #[test]
    fn test_result_wire_shape() {
        let value = serde_json::to_value(ToolResult::failure("nope")).unwrap();
        assert_eq!(
            value,
            json!({"textResultForLlm": "nope", "resultType": "failure", "error": "nope"})
        );
        let json_result = ToolResult::json(&json!({"temp": 21})).unwrap();
        assert_eq!(json_result.text_result_for_llm, "{\n  \"temp\": 21\n}");
        assert_eq!(ToolResult::json(&"plain").unwrap().text_result_for_llm, "plain");
    }
}
