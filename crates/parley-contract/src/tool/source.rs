//! External tool collaborators that own a per-turn resource.

use crate::tool::contract::Tool;
use async_trait::async_trait;
use std::sync::Arc;

/// A collaborator exposing one or more tools backed by a scoped resource,
/// such as a spawned transport process or an API session.
///
/// The source is acquired when the turn's registry is built and released by
/// calling [`ToolSource::close`] exactly once when the turn ends.
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// Stable label for logs and duplicate-name diagnostics.
    fn name(&self) -> &str;

    /// Tools exposed by this source.
    fn tools(&self) -> Vec<Arc<dyn Tool>>;

    /// Release the underlying resource.
    async fn close(&self);
}
