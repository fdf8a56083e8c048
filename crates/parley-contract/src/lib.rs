//! Shared contracts for the parley conversation engine: the transcript model,
//! the tool capability interface, orchestration events and protocol transcoding.
#![allow(missing_docs)]

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub mod credentials;
pub mod event;
pub mod message;
pub mod protocol;
pub mod tool;

pub use credentials::{
    Credential, CredentialError, CredentialProvider, EnvCredentialProvider,
    StaticCredentialProvider,
};
pub use event::{AgentEvent, StoppedReason, TerminationReason};
pub use message::{
    gen_message_id, is_supported_attachment_type, Attachment, Message, Part, Role, ToolCall,
    ToolInvocationState,
};
pub use protocol::{Identity, Transcoder};
pub use tool::{
    validate_against_schema, Tool, ToolCallContext, ToolDescriptor, ToolError, ToolResult,
    ToolSource, ToolStatus, TypedTool,
};

/// Tool name reserved for content that should open in the content panel.
pub const COLLAPSIBLE_TOOL_NAME: &str = "collapsible";
