//! Step loop, model executor and tool registry for parley.
#![allow(missing_docs)]

pub use parley_contract as contracts;
pub mod registry;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use registry::{
    codes, DispatchOptions, RegistryError, ToolRegistry, ToolRegistryBuilder, ToolResourceGuard,
};
pub use runtime::loop_runner::{
    run_loop_stream, AgentConfig, AgentLoopError, GenaiLlmExecutor, LlmEventStream, LlmExecutor,
    LlmRetryPolicy, LoopStats, SystemPromptBuilder, DEFAULT_MAX_STEPS,
};
pub use runtime::run_context::{await_or_cancel, CancelAware, RunCancellationToken};
