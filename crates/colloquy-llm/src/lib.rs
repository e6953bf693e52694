pub mod streaming;
pub mod traits;
pub mod types;

pub use streaming::StreamEvent;
pub use traits::{ChatClient, ChatOptions, ChatRequest, ChatResponse};
pub use types::{FunctionCall, FunctionDefinition, Message, Tool, ToolCall, ToolChoice};
