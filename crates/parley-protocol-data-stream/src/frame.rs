use parley_contract::{TerminationReason, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why a step or a run stopped generating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Error,
    Other,
}

impl FinishReason {
    /// Map a run termination to the reason reported in `done`.
    ///
    /// Returns `None` for cancellation: nobody is listening anymore.
    pub fn from_termination(termination: &TerminationReason) -> Option<Self> {
        match termination {
            TerminationReason::NaturalEnd => Some(Self::Stop),
            TerminationReason::Stopped(stopped) if stopped.code == "max_steps_reached" => {
                Some(Self::Length)
            }
            TerminationReason::Stopped(_) => Some(Self::Other),
            TerminationReason::Error => Some(Self::Error),
            TerminationReason::Cancelled => None,
        }
    }
}

/// A tool call as reported in `step-finish`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
}

impl From<&ToolCall> for FrameToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
        }
    }
}

/// One unit of the data stream.
///
/// Per `toolCallId` the order on the wire is `tool-call-partial*`,
/// `tool-call`, `tool-result`. `done` and `error` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Frame {
    /// Opens the assistant message for this turn.
    Start {
        #[serde(rename = "messageId")]
        message_id: String,
    },

    StepStart {
        step: usize,
    },

    /// Text to append to the trailing text part.
    TextDelta {
        delta: String,
    },

    /// Arguments streamed so far, parsed best-effort. Replaces earlier args.
    ToolCallPartial {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        args: Value,
    },

    /// Arguments are complete and the call is executing.
    ToolCall {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        args: Value,
    },

    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        result: Value,
        #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
        is_error: bool,
    },

    StepFinish {
        step: usize,
        #[serde(rename = "toolCalls", default)]
        tool_calls: Vec<FrameToolCall>,
        #[serde(rename = "finishReason")]
        finish_reason: FinishReason,
    },

    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },

    Done {
        #[serde(rename = "finishReason")]
        finish_reason: FinishReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        stats: Option<Value>,
    },
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Frame {
    pub fn start(message_id: impl Into<String>) -> Self {
        Self::Start {
            message_id: message_id.into(),
        }
    }

    pub fn text_delta(delta: impl Into<String>) -> Self {
        Self::TextDelta {
            delta: delta.into(),
        }
    }

    pub fn tool_call_partial(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Self {
        Self::ToolCallPartial {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
        }
    }

    pub fn tool_call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Self {
        Self::ToolCall {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: Value,
    ) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            result,
            is_error: false,
        }
    }

    pub fn error(error_text: impl Into<String>) -> Self {
        Self::Error {
            error_text: error_text.into(),
        }
    }

    pub fn done(finish_reason: FinishReason) -> Self {
        Self::Done {
            finish_reason,
            stats: None,
        }
    }

    /// `done` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Tool call id for tool frames.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::ToolCallPartial { tool_call_id, .. }
            | Self::ToolCall { tool_call_id, .. }
            | Self::ToolResult { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}
