pub mod stream;
pub mod termination;

pub use stream::AgentEvent;
pub use termination::{StoppedReason, TerminationReason};
