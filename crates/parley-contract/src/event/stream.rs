use crate::event::termination::TerminationReason;
use crate::message::ToolCall;
use crate::tool::contract::ToolResult;
use serde_json::Value;

/// Orchestration events emitted by the step loop, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    RunStart {
        run_id: String,
        /// Id of the assistant message the turn builds.
        message_id: String,
    },
    /// Run finished. Terminal unless an [`AgentEvent::Error`] preceded it.
    RunFinish {
        run_id: String,
        result: Option<Value>,
        termination: TerminationReason,
    },

    /// Step started; `step` counts from 1.
    StepStart {
        step: usize,
        message_id: String,
    },

    TextDelta {
        delta: String,
    },

    /// Tool call started streaming its arguments.
    ToolCallStart {
        id: String,
        name: String,
    },
    /// Raw argument text appended to the call.
    ToolCallDelta {
        id: String,
        args_delta: String,
    },
    /// Provider rewrote the argument text; replaces everything sent so far.
    ToolCallArgsReset {
        id: String,
        args_text: String,
    },
    /// Arguments complete; execution starts.
    ToolCallReady {
        id: String,
        name: String,
        arguments: Value,
    },
    /// Execution finished. Tool failures arrive here as error results.
    ToolCallDone {
        id: String,
        result: ToolResult,
    },

    /// Step completed, listing every tool call the model issued in it.
    StepFinish {
        step: usize,
        tool_calls: Vec<ToolCall>,
    },

    /// Model invocation failed; the run ends.
    Error {
        message: String,
    },
}

impl AgentEvent {
    /// Extract the response text from a `RunFinish` result value.
    pub fn extract_response(result: &Option<Value>) -> String {
        result
            .as_ref()
            .and_then(|v| v.get("response"))
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Tool call id referenced by this event, if any.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::ToolCallStart { id, .. }
            | Self::ToolCallDelta { id, .. }
            | Self::ToolCallArgsReset { id, .. }
            | Self::ToolCallReady { id, .. }
            | Self::ToolCallDone { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStart { .. } => "run_start",
            Self::RunFinish { .. } => "run_finish",
            Self::StepStart { .. } => "step_start",
            Self::TextDelta { .. } => "text_delta",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallDelta { .. } => "tool_call_delta",
            Self::ToolCallArgsReset { .. } => "tool_call_args_reset",
            Self::ToolCallReady { .. } => "tool_call_ready",
            Self::ToolCallDone { .. } => "tool_call_done",
            Self::StepFinish { .. } => "step_finish",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinish { .. } | Self::Error { .. })
    }
}
