use chrono::{DateTime, Utc};
use colloquy_llm::Message;
use serde::{Deserialize, Serialize};

/// Label shown for a thread that has no generated title yet
pub const DEFAULT_THREAD_TITLE: &str = "New Chat";

/// Control position of the turn state machine, persisted alongside the
/// message sequence so a restarted process knows where the thread stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingInput,
    ModelCall,
    ToolCall,
    Done,
}

/// Full snapshot of one thread: the ordered message sequence plus the
/// control position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub user_id: String,
    pub messages: Vec<Message>,
    pub position: TurnPhase,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(user_id: impl Into<String>, messages: Vec<Message>, position: TurnPhase) -> Self {
        Self {
            user_id: user_id.into(),
            messages,
            position,
            updated_at: Utc::now(),
        }
    }
}

/// One row of a user's thread list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadEntry {
    pub thread_id: String,
    pub title: Option<String>,
}

impl ThreadEntry {
    /// Saved title, or the default label for untitled threads
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_THREAD_TITLE)
    }
}
