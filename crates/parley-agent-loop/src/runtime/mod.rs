pub mod loop_runner;
pub mod run_context;
pub mod streaming;
