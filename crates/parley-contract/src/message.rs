//! Conversation transcript model shared by the server and the client.
//!
//! A [`Message`] is an ordered list of [`Part`]s. Tool invocations live inside the
//! assistant message that issued them and are addressed by `tool_call_id`; their
//! [`ToolInvocationState`] only ever moves forward.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generate a time-ordered UUID v7 message identifier.
pub fn gen_message_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a tool invocation part.
///
/// Variants are declared in transition order so `PartialOrd` gives the
/// monotonicity check: a part may only move to a state that compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolInvocationState {
    /// Arguments are still streaming in.
    PartialCall,
    /// Arguments are complete and execution has started.
    Call,
    /// Execution finished; the result may encode a tool-level error.
    Result,
    /// Terminal failure outside of the tool itself.
    Error,
}

impl ToolInvocationState {
    /// Whether moving from `self` to `next` is a forward transition.
    ///
    /// Re-applying the same `PartialCall` is allowed so argument updates can land.
    pub fn can_advance_to(self, next: ToolInvocationState) -> bool {
        match (self, next) {
            (Self::PartialCall, Self::PartialCall) => true,
            (Self::Result | Self::Error, _) => false,
            (current, next) => next > current,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Result | Self::Error)
    }
}

/// One ordered piece of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInvocation {
        tool_call_id: String,
        tool_name: String,
        state: ToolInvocationState,
        #[serde(default)]
        args: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// A finished tool invocation, as replayed from history.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
        result: Value,
    ) -> Self {
        Self::ToolInvocation {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            state: ToolInvocationState::Result,
            args,
            result: Some(result),
        }
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::ToolInvocation { tool_call_id, .. } => Some(tool_call_id),
            Self::Text { .. } => None,
        }
    }
}

/// User-supplied file reference. Only metadata travels with the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content_type: String,
    /// Remote URL or inline `data:` URL.
    #[serde(default)]
    pub url: String,
}

const SUPPORTED_ATTACHMENT_PREFIXES: &[&str] = &[
    "image/",
    "application/pdf",
    "text/",
    "application/json",
    "text/csv",
    "application/msword",
    "application/vnd.openxmlformats-officedocument",
];

/// Whether the content type is one the assistant can forward to the model.
pub fn is_supported_attachment_type(content_type: &str) -> bool {
    SUPPORTED_ATTACHMENT_PREFIXES
        .iter()
        .any(|prefix| content_type.starts_with(prefix))
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            url: url.into(),
        }
    }

    /// Names of required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_empty() {
            missing.push("name");
        }
        if self.content_type.is_empty() {
            missing.push("contentType");
        }
        if self.url.is_empty() {
            missing.push("url");
        }
        missing
    }

    pub fn is_supported(&self) -> bool {
        is_supported_attachment_type(&self.content_type)
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "gen_message_id")]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Create a user message with a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: gen_message_id(),
            role: Role::User,
            parts: vec![Part::text(text)],
            attachments: Vec::new(),
        }
    }

    /// Create an empty assistant message with the given id.
    pub fn assistant(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            parts: Vec::new(),
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::ToolInvocation { .. } => None,
            })
            .collect()
    }

    pub fn tool_invocation(&self, tool_call_id: &str) -> Option<&Part> {
        self.parts
            .iter()
            .find(|part| part.tool_call_id() == Some(tool_call_id))
    }

    pub fn tool_invocation_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, Part::ToolInvocation { .. }))
            .count()
    }
}

/// A completed tool call request issued by the model in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}
