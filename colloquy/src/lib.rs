//! # Colloquy: conversational assistant core
//!
//! Colloquy is the turn-processing engine behind a chat assistant: every user
//! message is appended to a persisted, per-thread history, routed through a
//! model capability that may invoke tools, and streamed back incrementally.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use colloquy::prelude::*;
//! use colloquy::persist::SqliteStore;
//!
//! # fn chat_client() -> Arc<dyn colloquy::llm::ChatClient> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteStore::open("chatbot.db")?);
//!
//!     let engine = Engine::builder()
//!         .chat_client(chat_client())
//!         .checkpointer(Arc::clone(&store) as _)
//!         .thread_store(store as _)
//!         .build()?;
//!
//!     let mut rx = engine.spawn_turn(TurnInput::new("t1", "u1", "What's AAPL trading at?"));
//!     while let Some(event) = rx.recv().await {
//!         if let StreamEvent::Message { content } = event {
//!             print!("{content}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! - **colloquy-llm**: the model-capability boundary (messages, tools, the
//!   streaming `ChatClient` trait)
//! - **colloquy-tools**: the tool registry resolved at startup
//! - **colloquy-persist**: checkpoint and thread-store contracts with
//!   in-memory and SQLite backends
//! - **colloquy-graph**: the turn engine and routing state machine

pub use colloquy_graph as graph;
pub use colloquy_llm as llm;
pub use colloquy_persist as persist;
pub use colloquy_tools as tools;

pub use colloquy_graph::{Engine, EngineConfig, LlmConfig, StreamEvent, TurnInput};
pub use colloquy_llm::{ChatClient, Message};
pub use colloquy_persist::{Checkpointer, MemoryStore, SqliteStore, ThreadStore};
pub use colloquy_tools::{ToolHandler, ToolRegistry};

/// Convenient prelude with commonly used types
pub mod prelude {
    pub use crate::graph::{Engine, EngineConfig, LlmConfig, StreamEvent, TurnInput};
    pub use crate::llm::Message;
    pub use crate::tools::ToolRegistry;
    pub use anyhow::Result;
}
