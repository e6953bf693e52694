use colloquy_llm::{Message, ToolCall};
use colloquy_persist::TurnPhase;
use serde::{Deserialize, Serialize};

use crate::types::config::LlmConfig;

/// One user request entering the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    pub thread_id: String,
    pub user_id: String,
    pub text: String,
    pub llm_config: LlmConfig,
}

impl TurnInput {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            text: text.into(),
            llm_config: LlmConfig::default(),
        }
    }

    pub fn with_llm_config(mut self, llm_config: LlmConfig) -> Self {
        self.llm_config = llm_config;
        self
    }
}

/// Mutable execution state of one turn: the thread's full message sequence
/// plus the state-machine position. Checkpointed after every transition.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub thread_id: String,
    pub user_id: String,
    pub run_id: String,
    pub messages: Vec<Message>,
    pub llm_config: LlmConfig,
    pub phase: TurnPhase,
}

impl TurnState {
    /// Resume from checkpointed history (empty for a new thread)
    pub fn resume(input: &TurnInput, history: Vec<Message>) -> Self {
        Self {
            thread_id: input.thread_id.clone(),
            user_id: input.user_id.clone(),
            run_id: uuid::Uuid::new_v4().to_string(),
            messages: history,
            llm_config: input.llm_config.clone(),
            phase: TurnPhase::AwaitingInput,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        matches!(
            self.last_message(),
            Some(Message::AI {
                tool_calls: Some(calls),
                ..
            }) if !calls.is_empty()
        )
    }

    pub fn pending_tool_calls(&self) -> Vec<ToolCall> {
        match self.last_message() {
            Some(Message::AI {
                tool_calls: Some(calls),
                ..
            }) => calls.clone(),
            _ => Vec::new(),
        }
    }

    pub fn add_tool_result(&mut self, tool_call_id: String, result: String) {
        self.messages.push(Message::tool_result(tool_call_id, result));
    }
}
