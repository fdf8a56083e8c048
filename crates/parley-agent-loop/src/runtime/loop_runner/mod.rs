//! Step loop: drives the model through bounded generate → call tools → feed
//! results back passes and exposes the run as an [`AgentEvent`] stream.
//!
//! A step is one model invocation. Tool calls issued in a step run
//! concurrently and their results are appended to the working transcript
//! before the next step. The run ends when a step issues no tool calls, when
//! `max_steps` steps have run (the final step's tool calls are still
//! executed), on model failure, or on cancellation.
//!
//! Every terminal path releases the registry's tool sources exactly once
//! through [`crate::registry::ToolResourceGuard`].

mod config;
mod convert;
mod outcome;
mod prompt;
mod stream_runner;

use crate::contracts::AgentEvent;
use crate::runtime::run_context::{await_or_cancel, CancelAware, RunCancellationToken};

pub use config::{
    AgentConfig, GenaiLlmExecutor, LlmEventStream, LlmExecutor, LlmRetryPolicy, DEFAULT_MAX_STEPS,
};
pub use convert::{build_request, to_chat_messages, to_genai_tool};
pub use outcome::{AgentLoopError, LoopStats};
pub use prompt::{SystemPromptBuilder, DEFAULT_BASE_PROMPT};
pub use stream_runner::run_loop_stream;

pub(super) fn is_retryable_llm_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    let non_retryable = [
        "401",
        "403",
        "404",
        "400",
        "422",
        "unauthorized",
        "forbidden",
        "invalid api key",
        "invalid_request",
        "bad request",
    ];
    if non_retryable.iter().any(|p| lower.contains(p)) {
        return false;
    }
    let retryable = [
        "429",
        "too many requests",
        "rate limit",
        "timeout",
        "timed out",
        "temporar",
        "connection",
        "network",
        "unavailable",
        "server error",
        "502",
        "503",
        "504",
        "reset by peer",
        "eof",
    ];
    retryable.iter().any(|p| lower.contains(p))
}

pub(super) fn retry_backoff_ms(policy: &LlmRetryPolicy, retry_index: usize) -> u64 {
    let initial = policy.initial_backoff_ms;
    let cap = policy.max_backoff_ms.max(initial);
    let shift = retry_index.min(20) as u32;
    let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    initial.saturating_mul(factor).min(cap)
}

pub(super) enum StreamStart {
    Started {
        stream: LlmEventStream,
        retries: usize,
    },
    Cancelled,
    Failed {
        error: AgentLoopError,
        retries: usize,
    },
}

/// Open the model stream, retrying transient startup failures with backoff.
pub(super) async fn start_stream_with_retry(
    config: &AgentConfig,
    executor: &dyn LlmExecutor,
    request: genai::chat::ChatRequest,
    cancellation_token: Option<&RunCancellationToken>,
) -> StreamStart {
    let attempts = config.llm_retry_policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        if attempt > 0 {
            let wait_ms = retry_backoff_ms(&config.llm_retry_policy, attempt - 1);
            tracing::debug!(attempt, wait_ms, "retrying model stream start");
            let sleep = tokio::time::sleep(std::time::Duration::from_millis(wait_ms));
            if let CancelAware::Cancelled = await_or_cancel(cancellation_token, sleep).await {
                return StreamStart::Cancelled;
            }
        }

        let started = executor.exec_chat_stream_events(
            &config.model,
            request.clone(),
            config.chat_options.as_ref(),
        );
        match await_or_cancel(cancellation_token, started).await {
            CancelAware::Cancelled => return StreamStart::Cancelled,
            CancelAware::Value(Ok(stream)) => {
                return StreamStart::Started {
                    stream,
                    retries: attempt,
                }
            }
            CancelAware::Value(Err(e)) => {
                last_error = e.to_string();
                let retryable = is_retryable_llm_error(&last_error);
                tracing::warn!(
                    executor = executor.name(),
                    model = %config.model,
                    attempt = attempt + 1,
                    retryable,
                    error = %last_error,
                    "model stream start failed"
                );
                if !retryable {
                    return StreamStart::Failed {
                        error: AgentLoopError::ModelInvocation(last_error),
                        retries: attempt,
                    };
                }
            }
        }
    }

    StreamStart::Failed {
        error: AgentLoopError::ModelInvocation(last_error),
        retries: attempts - 1,
    }
}

/// Collect every event of a run. Intended for tests and non-streaming callers.
pub async fn collect_events(
    stream: impl futures::Stream<Item = AgentEvent>,
) -> Vec<AgentEvent> {
    use futures::StreamExt;
    stream.collect().await
}
