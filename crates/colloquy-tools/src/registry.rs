use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use colloquy_llm::Tool;
use serde_json::Value;

use crate::source::ToolSource;

/// A callable capability the model may request mid-turn.
///
/// Handlers must be assumed fallible: arbitrary latency, arbitrary errors.
/// The engine turns failures into error-content tool results, so `invoke`
/// never aborts a turn by erroring.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Definition advertised to the model (name, description, schema)
    fn definition(&self) -> Tool;

    /// Execute with the model-provided arguments
    async fn invoke(&self, arguments: Value) -> Result<String>;
}

/// Fixed set of tools, resolved once before any turn begins.
///
/// Registration order is preserved in `llm_tools` so model requests are
/// deterministic across runs.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its definition name. Re-registering a name
    /// replaces the previous handler.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.definition().name().to_string();
        if self.handlers.insert(name.clone(), handler).is_none() {
            self.order.push(name);
        }
    }

    /// Pull in every capability a source can discover. Discovery failure is
    /// the empty set: the registry stays usable and the error is logged.
    pub async fn extend_from(&mut self, source: &dyn ToolSource) {
        match source.discover().await {
            Ok(handlers) => {
                for handler in handlers {
                    self.register(handler);
                }
            }
            Err(e) => {
                tracing::warn!(source = source.name(), "tool discovery failed: {e}");
            }
        }
    }

    /// Definitions for the model request, in registration order
    pub fn llm_tools(&self) -> Vec<Tool> {
        self.order
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|h| h.definition())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Execute a tool by name. Unknown names are an error; the caller decides
    /// whether that aborts anything.
    pub async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String> {
        let handler = self
            .handlers
            .get(tool_name)
            .ok_or_else(|| anyhow::anyhow!("Tool '{}' not found", tool_name))?;
        handler.invoke(arguments).await
    }
}
