use serde::{Deserialize, Serialize};

/// Incremental events produced by a streaming model call.
///
/// Tool calls arrive as deltas: the provider may split the id, name and
/// argument string across several events sharing the same `index`, and the
/// consumer reassembles them per index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Response text, token by token
    Message { content: String },

    /// Tool-invocation delta
    ToolCall {
        index: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },

    /// Model finished this completion
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}
