use serde::{Deserialize, Serialize};

/// Events emitted over a turn's output channel: the llm-level streaming
/// events plus the engine's own orchestration markers. Consumers concatenate
/// `Message` fragments to reconstruct the full assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Turn started
    TurnStart {
        run_id: String,
        thread_id: String,
        timestamp: i64,
    },

    /// Assistant reply text, token by token
    Message { content: String },

    /// The model is requesting a tool (streamed incrementally)
    ToolCall {
        index: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },

    /// One tool invocation finished (successfully or not)
    ToolResult {
        tool_call_id: String,
        result: String,
        is_error: bool,
        duration_ms: u64,
    },

    /// One model completion finished
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },

    /// Fatal error; the turn produces no further output
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
    },

    /// Turn finished
    TurnEnd {
        status: String,
        total_duration_ms: u64,
    },
}

impl From<colloquy_llm::StreamEvent> for StreamEvent {
    fn from(event: colloquy_llm::StreamEvent) -> Self {
        match event {
            colloquy_llm::StreamEvent::Message { content } => Self::Message { content },
            colloquy_llm::StreamEvent::ToolCall {
                index,
                id,
                name,
                arguments,
            } => Self::ToolCall {
                index,
                id,
                name,
                arguments,
            },
            colloquy_llm::StreamEvent::Done { finish_reason } => Self::Done { finish_reason },
        }
    }
}
