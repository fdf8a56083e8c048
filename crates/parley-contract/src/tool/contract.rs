//! Tool capability trait and its result/error types.
//!
//! A tool never throws across the dispatch boundary: every failure is folded into
//! a [`ToolResult`] with [`ToolStatus::Error`] so the model can read it.

use crate::tool::context::ToolCallContext;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Tool execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    /// Succeeded, with a message the model should notice.
    Warning,
    Error,
}

/// Result of one tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub status: ToolStatus,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ToolResult {
    pub fn success(tool_name: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Success,
            data: data.into(),
            message: None,
            metadata: HashMap::new(),
        }
    }

    pub fn warning(
        tool_name: impl Into<String>,
        data: impl Into<Value>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Warning,
            data: data.into(),
            message: Some(message.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn error(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Error,
            data: Value::Null,
            message: Some(message.into()),
            metadata: HashMap::new(),
        }
    }

    /// Create a structured error result with a stable error code payload.
    ///
    /// `data` becomes `{"error": {"code", "message"}}`, which is what the model
    /// and the client see in the tool invocation's result.
    pub fn error_with_code(
        tool_name: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let code = code.into();
        let message = message.into();
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Error,
            data: serde_json::json!({
                "error": {
                    "code": code,
                    "message": message,
                }
            }),
            message: Some(format!("[{code}] {message}")),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ToolStatus::Success | ToolStatus::Warning)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, ToolStatus::Error)
    }

    /// Stable error code, when the result was built with [`ToolResult::error_with_code`].
    pub fn error_code(&self) -> Option<&str> {
        self.data
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
    }

    /// Payload exposed to the model and the transcript.
    ///
    /// Plain errors without structured data are wrapped so the payload is always
    /// recognisable as an error.
    pub fn payload(&self) -> Value {
        match (self.status, &self.data) {
            (ToolStatus::Error, Value::Null) => serde_json::json!({
                "error": {
                    "code": "tool_error",
                    "message": self.message.clone().unwrap_or_default(),
                }
            }),
            _ => self.data.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Tool execution errors.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Tool descriptor exposed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name, used for dispatch.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub description: String,
    /// JSON schema for parameters.
    pub parameters: Value,
    /// Extra guidance appended to the system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ToolDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            usage_hint: None,
            category: None,
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }

    #[must_use]
    pub fn with_usage_hint(mut self, hint: impl Into<String>) -> Self {
        self.usage_hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// A single external action invokable by the model.
///
/// # Example
///
/// ```ignore
/// struct Clock;
///
/// #[async_trait]
/// impl Tool for Clock {
///     fn descriptor(&self) -> ToolDescriptor {
///         ToolDescriptor::new("clock", "Clock", "Current UTC time")
///     }
///
///     async fn execute(&self, _args: Value, _ctx: &ToolCallContext<'_>)
///         -> Result<ToolResult, ToolError>
///     {
///         Ok(ToolResult::success("clock", json!({"now": "2024-01-01T00:00:00Z"})))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Validate arguments before execution.
    ///
    /// The default implementation checks them against `descriptor().parameters`.
    fn validate_args(&self, args: &Value) -> Result<(), ToolError> {
        validate_against_schema(&self.descriptor().parameters, args)
    }

    async fn execute(&self, args: Value, ctx: &ToolCallContext<'_>)
        -> Result<ToolResult, ToolError>;
}

/// Validate a JSON value against a JSON Schema.
///
/// Returns `Err(ToolError::InvalidArguments)` listing every violation.
pub fn validate_against_schema(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::Validator::new(schema)
        .map_err(|e| ToolError::Internal(format!("invalid tool schema: {e}")))?;
    if validator.is_valid(args) {
        return Ok(());
    }
    let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
    Err(ToolError::InvalidArguments(errors.join("; ")))
}

/// Strongly-typed [`Tool`] with a schema derived from its argument type.
///
/// A blanket impl provides [`Tool`]; deserialization replaces schema validation.
#[async_trait]
pub trait TypedTool: Send + Sync {
    type Args: for<'de> Deserialize<'de> + JsonSchema + Send;

    fn tool_id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn usage_hint(&self) -> Option<&str> {
        None
    }

    /// Business-rule checks after deserialization.
    fn validate(&self, _args: &Self::Args) -> Result<(), String> {
        Ok(())
    }

    async fn execute(
        &self,
        args: Self::Args,
        ctx: &ToolCallContext<'_>,
    ) -> Result<ToolResult, ToolError>;
}

#[async_trait]
impl<T: TypedTool> Tool for T {
    fn descriptor(&self) -> ToolDescriptor {
        let mut descriptor = ToolDescriptor::new(self.tool_id(), self.name(), self.description())
            .with_parameters(typed_tool_schema::<T::Args>());
        if let Some(hint) = self.usage_hint() {
            descriptor = descriptor.with_usage_hint(hint);
        }
        descriptor
    }

    fn validate_args(&self, args: &Value) -> Result<(), ToolError> {
        let typed: T::Args = serde_json::from_value(args.clone())
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        self.validate(&typed).map_err(ToolError::InvalidArguments)
    }

    async fn execute(
        &self,
        args: Value,
        ctx: &ToolCallContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        let typed: T::Args =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        self.validate(&typed).map_err(ToolError::InvalidArguments)?;
        TypedTool::execute(self, typed, ctx).await
    }
}

fn typed_tool_schema<T: JsonSchema>() -> Value {
    let mut v = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}));
    // Providers reject the meta-schema key.
    if let Some(obj) = v.as_object_mut() {
        obj.remove("$schema");
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_with_code_builds_structured_payload() {
        let result = ToolResult::error_with_code("search", "invalid_arguments", "query missing");
        assert!(result.is_error());
        assert_eq!(result.error_code(), Some("invalid_arguments"));
        assert_eq!(result.data["error"]["message"], "query missing");
        assert_eq!(
            result.message.as_deref(),
            Some("[invalid_arguments] query missing")
        );
    }

    #[test]
    fn plain_error_payload_is_error_shaped() {
        let payload = ToolResult::error("t", "boom").payload();
        assert_eq!(payload["error"]["code"], "tool_error");
        assert_eq!(payload["error"]["message"], "boom");

        let ok = ToolResult::success("t", json!({"n": 1})).payload();
        assert_eq!(ok, json!({"n": 1}));
    }

    #[test]
    fn schema_validation_lists_violations() {
        let schema = json!({
            "type": "object",
            "properties": {"query": {"type": "string", "minLength": 1}},
            "required": ["query"]
        });
        assert!(validate_against_schema(&schema, &json!({"query": "rust"})).is_ok());

        let err = validate_against_schema(&schema, &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("query")));
    }

    #[test]
    fn broken_schema_is_internal_error() {
        let err = validate_against_schema(&json!({"type": 12}), &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::Internal(_)));
    }

    #[derive(Deserialize, JsonSchema)]
    struct GreetArgs {
        name: String,
    }

    struct Greet;

    #[async_trait]
    impl TypedTool for Greet {
        type Args = GreetArgs;

        fn tool_id(&self) -> &str {
            "greet"
        }

        fn name(&self) -> &str {
            "Greet"
        }

        fn description(&self) -> &str {
            "Greet someone"
        }

        fn validate(&self, args: &GreetArgs) -> Result<(), String> {
            if args.name.trim().is_empty() {
                return Err("name must not be blank".into());
            }
            Ok(())
        }

        async fn execute(
            &self,
            args: GreetArgs,
            _ctx: &ToolCallContext<'_>,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::success(
                "greet",
                json!({"greeting": format!("Hello, {}!", args.name)}),
            ))
        }
    }

    #[tokio::test]
    async fn typed_tool_descriptor_and_execute() {
        let tool = Greet;
        let descriptor = Tool::descriptor(&tool);
        assert_eq!(descriptor.id, "greet");
        assert!(descriptor.parameters.get("$schema").is_none());
        assert_eq!(descriptor.parameters["required"], json!(["name"]));

        assert!(tool.validate_args(&json!({"name": " "})).is_err());
        assert!(tool.validate_args(&json!({"nom": "x"})).is_err());

        let ctx = ToolCallContext::new("c1", "greet");
        let result = Tool::execute(&tool, json!({"name": "Ada"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.data["greeting"], "Hello, Ada!");
    }
}
