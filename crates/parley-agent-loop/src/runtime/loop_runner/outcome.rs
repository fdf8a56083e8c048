use crate::contracts::TerminationReason;
use serde_json::{json, Value};

/// Aggregated runtime metrics for one loop run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub duration_ms: u64,
    pub steps: usize,
    pub llm_calls: usize,
    pub llm_retries: usize,
    pub tool_calls: usize,
    pub tool_errors: usize,
}

impl LoopStats {
    pub fn to_json(&self) -> Value {
        json!({
            "durationMs": self.duration_ms,
            "steps": self.steps,
            "llmCalls": self.llm_calls,
            "llmRetries": self.llm_retries,
            "toolCalls": self.tool_calls,
            "toolErrors": self.tool_errors,
        })
    }
}

/// `RunFinish.result` payload.
pub(super) fn run_finish_result(
    termination: &TerminationReason,
    response: &str,
    stats: &LoopStats,
) -> Option<Value> {
    let mut result = json!({ "stats": stats.to_json() });
    if matches!(termination, TerminationReason::NaturalEnd) && !response.is_empty() {
        result["response"] = Value::String(response.to_string());
    }
    Some(result)
}

/// Error type for loop operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AgentLoopError {
    /// The model could not be invoked or its stream failed.
    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),
    #[error("Run cancelled")]
    Cancelled,
}

impl AgentLoopError {
    pub fn termination_reason(&self) -> TerminationReason {
        match self {
            Self::ModelInvocation(_) => TerminationReason::Error,
            Self::Cancelled => TerminationReason::Cancelled,
        }
    }
}
