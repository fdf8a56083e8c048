//! Tool contracts: the capability trait, descriptors, execution context and
//! scoped tool sources.

pub mod context;
pub mod contract;
pub mod source;

pub use context::ToolCallContext;
pub use contract::{
    validate_against_schema, Tool, ToolDescriptor, ToolError, ToolResult, ToolStatus, TypedTool,
};
pub use source::ToolSource;
