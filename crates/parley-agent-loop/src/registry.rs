//! Per-turn tool registry: name → capability mapping, dispatch, and the scoped
//! resource guard for external tool sources.

use crate::contracts::tool::{Tool, ToolCallContext, ToolDescriptor, ToolResult, ToolSource};
use crate::contracts::ToolCall;
use crate::runtime::run_context::{await_or_cancel, CancelAware, RunCancellationToken};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stable error codes carried in error-shaped tool results.
pub mod codes {
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
    pub const INVALID_ARGUMENTS: &str = "invalid_arguments";
    pub const TOOL_EXECUTION_ERROR: &str = "tool_execution_error";
    pub const TOOL_TIMEOUT: &str = "tool_timeout";
    pub const CANCELLED: &str = "cancelled";
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{name}' registered by '{existing}' conflicts with '{incoming}'")]
    DuplicateTool {
        name: String,
        existing: String,
        incoming: String,
    },

    #[error("tool id must not be empty (from '{origin}')")]
    EmptyToolId { origin: String },
}

/// Options applied to one dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions<'a> {
    pub timeout: Option<Duration>,
    pub cancellation_token: Option<&'a RunCancellationToken>,
}

/// Releases every tool source of a turn exactly once.
///
/// The loop calls [`ToolResourceGuard::release`] on `Done` and `Error`. If the
/// guard is dropped first (client disconnect drops the stream), `Drop` closes
/// the sources on the current runtime.
pub struct ToolResourceGuard {
    sources: Vec<Arc<dyn ToolSource>>,
    released: AtomicBool,
}

impl ToolResourceGuard {
    fn new(sources: Vec<Arc<dyn ToolSource>>) -> Self {
        Self {
            sources,
            released: AtomicBool::new(false),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Close all sources. Calls after the first are no-ops.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        close_sources(self.sources.clone()).await;
    }
}

async fn close_sources(sources: Vec<Arc<dyn ToolSource>>) {
    for source in sources {
        tracing::debug!(source = source.name(), "closing tool source");
        source.close().await;
    }
}

impl Drop for ToolResourceGuard {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) || self.sources.is_empty() {
            return;
        }
        let sources = std::mem::take(&mut self.sources);
        tracing::debug!(count = sources.len(), "releasing tool sources on drop");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(close_sources(sources));
            }
            Err(_) => futures::executor::block_on(close_sources(sources)),
        }
    }
}

impl std::fmt::Debug for ToolResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolResourceGuard")
            .field("sources", &self.sources.len())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Builder collecting local tools and external sources for one turn.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<(String, Arc<dyn Tool>)>,
    sources: Vec<Arc<dyn ToolSource>>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(("local".to_string(), tool));
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        for tool in tools {
            self = self.tool(tool);
        }
        self
    }

    /// Register an external source. Its resource is owned by the registry from now on.
    #[must_use]
    pub fn source(mut self, source: Arc<dyn ToolSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Assemble the mapping, rejecting duplicate names.
    ///
    /// On error every registered source is still released.
    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let guard = ToolResourceGuard::new(self.sources.clone());
        let mut tools: HashMap<String, (String, Arc<dyn Tool>)> = HashMap::new();

        let from_sources = self.sources.iter().flat_map(|source| {
            source
                .tools()
                .into_iter()
                .map(move |tool| (source.name().to_string(), tool))
        });

        for (origin, tool) in self.tools.into_iter().chain(from_sources) {
            let id = tool.descriptor().id;
            if id.is_empty() {
                return Err(RegistryError::EmptyToolId { origin });
            }
            if let Some((existing, _)) = tools.get(&id) {
                return Err(RegistryError::DuplicateTool {
                    name: id,
                    existing: existing.clone(),
                    incoming: origin,
                });
            }
            tools.insert(id, (origin, tool));
        }

        Ok(ToolRegistry {
            tools: tools
                .into_iter()
                .map(|(id, (_, tool))| (id, tool))
                .collect(),
            guard: Arc::new(guard),
        })
    }
}

/// Name → capability mapping for one turn.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    guard: Arc<ToolResourceGuard>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            tools: HashMap::new(),
            guard: Arc::new(ToolResourceGuard::new(Vec::new())),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.ids())
            .field("guard", &self.guard)
            .finish()
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    /// Tool ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tools.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Descriptors sorted by id, so prompts are deterministic.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> =
            self.tools.values().map(|tool| tool.descriptor()).collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    pub fn resource_guard(&self) -> Arc<ToolResourceGuard> {
        self.guard.clone()
    }

    /// Dispatch by name with default options.
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolResult {
        let call = ToolCall::new(uuid::Uuid::new_v4().to_string(), name, args);
        self.dispatch_call(&call, DispatchOptions::default()).await
    }

    /// Look up, validate and execute one call.
    ///
    /// Never fails: every error becomes an error-shaped [`ToolResult`].
    pub async fn dispatch_call(&self, call: &ToolCall, options: DispatchOptions<'_>) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            tracing::warn!(tool = %call.name, call_id = %call.id, "unknown tool");
            return ToolResult::error_with_code(
                &call.name,
                codes::UNKNOWN_TOOL,
                format!("Tool '{}' not found", call.name),
            );
        };

        if let Err(e) = tool.validate_args(&call.arguments) {
            tracing::debug!(tool = %call.name, call_id = %call.id, error = %e, "tool arguments rejected");
            return ToolResult::error_with_code(&call.name, codes::INVALID_ARGUMENTS, e.to_string());
        }

        let ctx = ToolCallContext::new(&call.id, &call.name)
            .with_cancellation(options.cancellation_token);
        let execution = AssertUnwindSafe(tool.execute(call.arguments.clone(), &ctx)).catch_unwind();

        let bounded = async {
            match options.timeout {
                Some(limit) => tokio::time::timeout(limit, execution).await.ok(),
                None => Some(execution.await),
            }
        };

        match await_or_cancel(options.cancellation_token, bounded).await {
            CancelAware::Cancelled => {
                ToolResult::error_with_code(&call.name, codes::CANCELLED, "Run was cancelled")
            }
            CancelAware::Value(None) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, "tool timed out");
                ToolResult::error_with_code(
                    &call.name,
                    codes::TOOL_TIMEOUT,
                    format!(
                        "Tool '{}' did not finish within {} ms",
                        call.name,
                        options.timeout.unwrap_or_default().as_millis()
                    ),
                )
            }
            CancelAware::Value(Some(Ok(Ok(result)))) => result,
            CancelAware::Value(Some(Ok(Err(e)))) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "tool execution failed");
                ToolResult::error_with_code(&call.name, codes::TOOL_EXECUTION_ERROR, e.to_string())
            }
            CancelAware::Value(Some(Err(panic))) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                tracing::error!(tool = %call.name, call_id = %call.id, %message, "tool panicked");
                ToolResult::error_with_code(&call.name, codes::TOOL_EXECUTION_ERROR, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::testing::{CountingToolSource, EchoTool, FailingTool, SearchTool};
    use crate::contracts::tool::ToolError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("slow", "Slow", "Sleeps")
        }

        async fn execute(
            &self,
            _args: Value,
            _ctx: &ToolCallContext<'_>,
        ) -> Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolResult::success("slow", json!(null)))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("panics", "Panics", "Panics")
        }

        async fn execute(
            &self,
            _args: Value,
            _ctx: &ToolCallContext<'_>,
        ) -> Result<ToolResult, ToolError> {
            panic!("kaboom");
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ToolRegistry::builder()
            .tool(Arc::new(EchoTool::new("echo")))
            .tool(Arc::new(EchoTool::new("echo")))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateTool {
                name: "echo".into(),
                existing: "local".into(),
                incoming: "local".into(),
            }
        );
    }

    #[tokio::test]
    async fn duplicate_across_source_releases_source() {
        let source = CountingToolSource::new("mcp", vec![Arc::new(EchoTool::new("echo"))]);
        let closes = source.close_counter();
        let result = ToolRegistry::builder()
            .tool(Arc::new(EchoTool::new("echo")))
            .source(Arc::new(source))
            .build();
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateTool { ref incoming, .. }) if incoming == "mcp"
        ));
        tokio::task::yield_now().await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn descriptors_are_sorted() {
        let registry = ToolRegistry::builder()
            .tool(Arc::new(SearchTool))
            .tool(Arc::new(EchoTool::new("alpha")))
            .build()
            .unwrap();
        let ids: Vec<String> = registry.descriptors().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["alpha", "web_search"]);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_is_structured_result() {
        let registry = ToolRegistry::default();
        let result = registry.dispatch("nope", json!({})).await;
        assert!(result.is_error());
        assert_eq!(result.error_code(), Some(codes::UNKNOWN_TOOL));
    }

    #[tokio::test]
    async fn invalid_arguments_are_structured_result() {
        let registry = ToolRegistry::builder()
            .tool(Arc::new(SearchTool))
            .build()
            .unwrap();
        let result = registry.dispatch("web_search", json!({"query": ""})).await;
        assert_eq!(result.error_code(), Some(codes::INVALID_ARGUMENTS));

        let ok = registry.dispatch("web_search", json!({"query": "rust"})).await;
        assert!(ok.is_success());
    }

    #[tokio::test]
    async fn execution_error_and_panic_are_contained() {
        let registry = ToolRegistry::builder()
            .tool(Arc::new(FailingTool::new("flaky")))
            .tool(Arc::new(PanicTool))
            .build()
            .unwrap();

        let failed = registry.dispatch("flaky", json!({})).await;
        assert_eq!(failed.error_code(), Some(codes::TOOL_EXECUTION_ERROR));
        assert!(failed.payload()["error"]["message"]
            .as_str()
            .unwrap()
            .contains("upstream unavailable"));

        let panicked = registry.dispatch("panics", json!({})).await;
        assert_eq!(panicked.error_code(), Some(codes::TOOL_EXECUTION_ERROR));
        assert_eq!(panicked.data["error"]["message"], "kaboom");
    }

    #[tokio::test]
    async fn timeout_becomes_error_result() {
        let registry = ToolRegistry::builder()
            .tool(Arc::new(SlowTool))
            .build()
            .unwrap();
        let call = ToolCall::new("c1", "slow", json!({}));
        let result = registry
            .dispatch_call(
                &call,
                DispatchOptions {
                    timeout: Some(Duration::from_millis(20)),
                    cancellation_token: None,
                },
            )
            .await;
        assert_eq!(result.error_code(), Some(codes::TOOL_TIMEOUT));
    }

    #[tokio::test]
    async fn guard_releases_once() {
        let source = CountingToolSource::new("svc", vec![Arc::new(EchoTool::new("echo"))]);
        let closes = source.close_counter();
        let registry = ToolRegistry::builder()
            .source(Arc::new(source))
            .build()
            .unwrap();
        assert!(registry.get("echo").is_some());

        let guard = registry.resource_guard();
        guard.release().await;
        guard.release().await;
        drop(registry);
        drop(guard);
        tokio::task::yield_now().await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_registry_releases_sources() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let source = CountingToolSource::new("svc", Vec::new());
            let closes = source.close_counter();
            let registry = ToolRegistry::builder()
                .source(Arc::new(source))
                .build()
                .unwrap();
            drop(registry);
            tokio::task::yield_now().await;
            counter.store(closes.load(Ordering::SeqCst), Ordering::SeqCst);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
