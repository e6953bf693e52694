use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::registry::ToolHandler;

/// A place tools come from: a plugin directory, a remote tool server, a
/// hard-coded builtin set. Sources are resolved once at startup and the
/// discovered handlers are frozen into the registry.
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// Human-readable source name, used in discovery logs
    fn name(&self) -> &str;

    /// Enumerate the capabilities this source provides
    async fn discover(&self) -> Result<Vec<Arc<dyn ToolHandler>>>;
}
