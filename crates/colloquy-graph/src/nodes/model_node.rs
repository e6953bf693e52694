use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use colloquy_llm::{ChatClient, ChatOptions, ChatRequest, Message, ToolCall, ToolChoice};
use colloquy_tools::ToolRegistry;
use futures::StreamExt;

use crate::node::{EventSender, Node, NodeType};
use crate::types::TurnState;

/// Partial tool call being reassembled from stream deltas, keyed by index
#[derive(Default)]
struct ToolCallBuffer {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Invokes the model with the thread's message sequence and the registry's
/// tool definitions, forwarding tokens to the output channel while
/// accumulating the full assistant message.
pub struct ModelNode {
    client: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
}

impl ModelNode {
    pub fn new(client: Arc<dyn ChatClient>, registry: Arc<ToolRegistry>) -> Self {
        Self { client, registry }
    }

    fn build_request(&self, state: &TurnState) -> ChatRequest {
        let mut options = ChatOptions::new();

        if !self.registry.is_empty() {
            options = options
                .tools(self.registry.llm_tools())
                .tool_choice(ToolChoice::Auto);
        }
        if let Some(temp) = state.llm_config.temperature {
            options = options.temperature(temp);
        }
        if let Some(max_tokens) = state.llm_config.max_tokens {
            options = options.max_tokens(max_tokens);
        }

        ChatRequest::new(state.llm_config.model.clone(), state.messages.clone())
            .with_options(options)
    }
}

#[async_trait]
impl Node for ModelNode {
    async fn execute(&self, state: &mut TurnState, event_tx: EventSender) -> Result<()> {
        let request = self.build_request(state);

        tracing::info!(
            model = %request.model,
            messages = request.messages.len(),
            "model node: opening stream"
        );

        let mut stream = self.client.chat_stream(request).await?;

        let mut content = String::new();
        let mut buffers: BTreeMap<u32, ToolCallBuffer> = BTreeMap::new();

        while let Some(event) = stream.next().await {
            let event = event?;

            event_tx.send(event.clone().into()).await?;

            match event {
                colloquy_llm::StreamEvent::Message { content: token } => {
                    content.push_str(&token);
                }
                colloquy_llm::StreamEvent::ToolCall {
                    index,
                    id,
                    name,
                    arguments,
                } => {
                    let buffer = buffers.entry(index).or_default();
                    if let Some(id) = id {
                        buffer.id = Some(id);
                    }
                    if let Some(name) = name {
                        buffer.name = Some(name);
                    }
                    if let Some(args) = arguments {
                        buffer.arguments.push_str(&args);
                    }
                }
                colloquy_llm::StreamEvent::Done { .. } => {}
            }
        }

        // Reassembled requests, in stream index order
        let tool_calls: Vec<ToolCall> = buffers
            .into_values()
            .filter_map(|buffer| match (buffer.id, buffer.name) {
                (Some(id), Some(name)) => Some(ToolCall::new(id, name, buffer.arguments)),
                _ => None,
            })
            .collect();

        let assistant = if tool_calls.is_empty() {
            Message::ai(content)
        } else {
            let content = (!content.is_empty()).then_some(content);
            Message::ai_with_tools(content, tool_calls)
        };
        state.add_message(assistant);

        Ok(())
    }

    fn node_type(&self) -> NodeType {
        NodeType::Model
    }
}
