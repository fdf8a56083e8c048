//! Shared test fixtures for crates that depend on `parley-contract`.
//!
//! Gated behind the `test-support` cargo feature. Enable via
//! `[dev-dependencies] parley-contract = { ..., features = ["test-support"] }`.

use crate::tool::{Tool, ToolCallContext, ToolDescriptor, ToolError, ToolResult, ToolSource};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Echoes its arguments back as the result.
pub struct EchoTool {
    id: String,
}

impl EchoTool {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(&self.id, &self.id, "Echo the arguments back")
    }

    async fn execute(&self, args: Value, _ctx: &ToolCallContext<'_>) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::success(&self.id, json!({ "echo": args })))
    }
}

/// Fake search capability with a required, non-empty `query`.
pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("web_search", "Web Search", "Search the web").with_parameters(json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "minLength": 1, "maxLength": 100}
            },
            "required": ["query"]
        }))
    }

    async fn execute(&self, args: Value, _ctx: &ToolCallContext<'_>) -> Result<ToolResult, ToolError> {
        let query = args["query"].as_str().unwrap_or_default();
        Ok(ToolResult::success(
            "web_search",
            json!({ "results": [{ "title": format!("News about {query}"), "url": "https://example.com/1" }] }),
        ))
    }
}

/// Always fails from `execute`.
pub struct FailingTool {
    id: String,
}

impl FailingTool {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(&self.id, &self.id, "Always fails")
    }

    async fn execute(&self, _args: Value, _ctx: &ToolCallContext<'_>) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed("upstream unavailable".to_string()))
    }
}

/// Never finishes; stands in for a tool stuck on a slow upstream.
pub struct HangingTool {
    id: String,
}

impl HangingTool {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Tool for HangingTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(&self.id, &self.id, "Never returns")
    }

    async fn execute(&self, _args: Value, _ctx: &ToolCallContext<'_>) -> Result<ToolResult, ToolError> {
        futures::future::pending::<()>().await;
        Ok(ToolResult::success(&self.id, Value::Null))
    }
}

/// Tool source that records how many times it was closed.
pub struct CountingToolSource {
    name: String,
    tools: Vec<Arc<dyn Tool>>,
    closes: Arc<AtomicUsize>,
}

impl CountingToolSource {
    pub fn new(name: impl Into<String>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            name: name.into(),
            tools,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter, readable after the source has been moved into a registry.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }
}

#[async_trait]
impl ToolSource for CountingToolSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
