use async_trait::async_trait;
use genai::chat::{ChatOptions, ChatRequest};
use genai::Client;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on model invocations per turn.
pub const DEFAULT_MAX_STEPS: usize = 5;

/// Retry strategy for model stream startup.
#[derive(Debug, Clone)]
pub struct LlmRetryPolicy {
    /// Max attempts per turn step (must be >= 1).
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LlmRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

impl LlmRetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Boxed stream of model chat events.
pub type LlmEventStream = std::pin::Pin<
    Box<dyn futures::Stream<Item = Result<genai::chat::ChatStreamEvent, genai::Error>> + Send>,
>;

/// Abstraction over model backends.
#[async_trait]
pub trait LlmExecutor: Send + Sync {
    /// Start a streaming chat completion.
    async fn exec_chat_stream_events(
        &self,
        model: &str,
        chat_req: ChatRequest,
        options: Option<&ChatOptions>,
    ) -> genai::Result<LlmEventStream>;

    /// Stable label for logging.
    fn name(&self) -> &'static str;
}

/// Default executor backed by `genai::Client`.
#[derive(Clone)]
pub struct GenaiLlmExecutor {
    client: Client,
}

impl GenaiLlmExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for GenaiLlmExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenaiLlmExecutor").finish()
    }
}

#[async_trait]
impl LlmExecutor for GenaiLlmExecutor {
    async fn exec_chat_stream_events(
        &self,
        model: &str,
        chat_req: ChatRequest,
        options: Option<&ChatOptions>,
    ) -> genai::Result<LlmEventStream> {
        let resp = self
            .client
            .exec_chat_stream(model, chat_req, options)
            .await?;
        Ok(Box::pin(resp.stream))
    }

    fn name(&self) -> &'static str {
        "genai_client"
    }
}

/// Runtime configuration for one turn of the step loop.
#[derive(Clone)]
pub struct AgentConfig {
    /// Model identifier (e.g. "gpt-4o-mini").
    pub model: String,
    /// Base system prompt; tool guidance is appended per turn.
    pub system_prompt: String,
    /// Upper bound on model invocations. The last permitted step still runs
    /// its tool calls, then the loop stops.
    pub max_steps: usize,
    /// Per-call execution bound; `None` waits indefinitely.
    pub tool_timeout: Option<Duration>,
    pub chat_options: Option<ChatOptions>,
    pub llm_retry_policy: LlmRetryPolicy,
    /// Backend override. Defaults to [`GenaiLlmExecutor`] with a default client.
    pub llm_executor: Option<Arc<dyn LlmExecutor>>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            system_prompt: String::new(),
            max_steps: DEFAULT_MAX_STEPS,
            tool_timeout: None,
            chat_options: Some(
                ChatOptions::default()
                    .with_capture_usage(true)
                    .with_capture_tool_calls(true),
            ),
            llm_retry_policy: LlmRetryPolicy::default(),
            llm_executor: None,
        }
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("model", &self.model)
            .field(
                "system_prompt",
                &format!("[{} chars]", self.system_prompt.len()),
            )
            .field("max_steps", &self.max_steps)
            .field("tool_timeout", &self.tool_timeout)
            .field("llm_retry_policy", &self.llm_retry_policy)
            .field(
                "llm_executor",
                &self.llm_executor.as_ref().map(|executor| executor.name()),
            )
            .finish()
    }
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_chat_options(mut self, options: ChatOptions) -> Self {
        self.chat_options = Some(options);
        self
    }

    #[must_use]
    pub fn with_llm_retry_policy(mut self, policy: LlmRetryPolicy) -> Self {
        self.llm_retry_policy = policy;
        self
    }

    #[must_use]
    pub fn with_llm_executor(mut self, executor: Arc<dyn LlmExecutor>) -> Self {
        self.llm_executor = Some(executor);
        self
    }

    pub(super) fn executor(&self) -> Arc<dyn LlmExecutor> {
        self.llm_executor
            .clone()
            .unwrap_or_else(|| Arc::new(GenaiLlmExecutor::new(Client::default())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
        assert!(config.tool_timeout.is_none());
        assert_eq!(config.llm_retry_policy.max_attempts, 2);
    }

    #[test]
    fn builders_and_debug() {
        let config = AgentConfig::new("m")
            .with_system_prompt("be brief")
            .with_max_steps(2)
            .with_tool_timeout(Duration::from_secs(3))
            .with_llm_retry_policy(LlmRetryPolicy::none());
        assert_eq!(config.model, "m");
        assert_eq!(config.max_steps, 2);
        assert_eq!(config.llm_retry_policy.max_attempts, 1);
        let rendered = format!("{config:?}");
        assert!(rendered.contains("[8 chars]"));
        assert!(!rendered.contains("be brief"));
    }
}
