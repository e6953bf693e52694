use std::sync::Arc;

use anyhow::{anyhow, Result};
use colloquy_llm::ChatClient;
use colloquy_persist::{Checkpointer, ThreadStore};
use colloquy_tools::ToolRegistry;

use crate::engine::Engine;
use crate::types::EngineConfig;

/// Builder wiring the engine's collaborators together. The model client and
/// both stores are required; the registry defaults to empty (chat-only
/// assistant).
pub struct EngineBuilder {
    client: Option<Arc<dyn ChatClient>>,
    registry: Option<Arc<ToolRegistry>>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    thread_store: Option<Arc<dyn ThreadStore>>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            client: None,
            registry: None,
            checkpointer: None,
            thread_store: None,
            config: EngineConfig::default(),
        }
    }

    pub fn chat_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn tool_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn thread_store(mut self, thread_store: Arc<dyn ThreadStore>) -> Self {
        self.thread_store = Some(thread_store);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let client = self.client.ok_or_else(|| anyhow!("chat client is required"))?;
        let checkpointer = self
            .checkpointer
            .ok_or_else(|| anyhow!("checkpointer is required"))?;
        let thread_store = self
            .thread_store
            .ok_or_else(|| anyhow!("thread store is required"))?;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ToolRegistry::new()));

        Ok(Engine::new(
            client,
            registry,
            checkpointer,
            thread_store,
            self.config,
        ))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
