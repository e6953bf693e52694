pub mod config;
pub mod events;
pub mod state;

pub use config::{EngineConfig, LlmConfig};
pub use events::StreamEvent;
pub use state::{TurnInput, TurnState};
