//! HTTP entry point: accepts a transcript on `POST /chat` and streams the
//! turn back as data stream frames over SSE.

pub mod config;
pub mod http;
pub mod service;
pub mod transport;

pub use config::{ConfigError, ServerConfig};
pub use service::{ApiError, AppState, LocalToolset, ToolsetFactory};
