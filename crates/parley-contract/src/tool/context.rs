//! Execution context handed to a tool for one call.

use tokio_util::sync::CancellationToken;

/// Identity and cancellation for a single tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCallContext<'a> {
    call_id: &'a str,
    tool_name: &'a str,
    cancellation_token: Option<&'a CancellationToken>,
}

impl<'a> ToolCallContext<'a> {
    pub fn new(call_id: &'a str, tool_name: &'a str) -> Self {
        Self {
            call_id,
            tool_name,
            cancellation_token: None,
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: Option<&'a CancellationToken>) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Current tool call id. Tools should use it as the idempotency key for side effects.
    pub fn call_id(&self) -> &str {
        self.call_id
    }

    pub fn tool_name(&self) -> &str {
        self.tool_name
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancellation_token
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token
            .is_some_and(CancellationToken::is_cancelled)
    }
}
