pub mod builder;
pub mod engine;
pub mod node;
pub mod nodes;
pub mod router;
mod title;
pub mod types;

pub use builder::EngineBuilder;
pub use engine::Engine;
pub use node::{EventSender, Node, NodeType};
pub use router::{NextNode, Router, SimpleRouter};
pub use types::{EngineConfig, LlmConfig, StreamEvent, TurnInput, TurnState};
