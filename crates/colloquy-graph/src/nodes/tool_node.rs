use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use colloquy_tools::ToolRegistry;

use crate::node::{EventSender, Node, NodeType};
use crate::types::{StreamEvent, TurnState};

/// Executes the pending tool-invocation requests, in request order.
///
/// Every request produces exactly one tool-result message. Failures become
/// the result content instead of aborting the turn.
pub struct ToolNode {
    registry: Arc<ToolRegistry>,
}

impl ToolNode {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Node for ToolNode {
    async fn execute(&self, state: &mut TurnState, event_tx: EventSender) -> Result<()> {
        let tool_calls = state.pending_tool_calls();

        for tool_call in tool_calls {
            let start = Instant::now();

            let outcome = match tool_call.arguments_value() {
                Ok(args) => self.registry.execute(&tool_call.function.name, args).await,
                Err(e) => Err(anyhow::anyhow!("Invalid tool arguments: {e}")),
            };

            let (result, is_error) = match outcome {
                Ok(result) => (result, false),
                Err(e) => {
                    tracing::warn!(
                        tool = %tool_call.function.name,
                        "tool execution failed: {e}"
                    );
                    (format!("Tool execution failed: {e}"), true)
                }
            };

            event_tx
                .send(StreamEvent::ToolResult {
                    tool_call_id: tool_call.id.clone(),
                    result: result.clone(),
                    is_error,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
                .await?;

            state.add_tool_result(tool_call.id, result);
        }

        Ok(())
    }

    fn node_type(&self) -> NodeType {
        NodeType::Tool
    }
}
