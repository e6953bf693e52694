use crate::node::NodeType;
use crate::types::TurnState;

/// Decides the next transition after each node finishes
pub trait Router: Send + Sync {
    fn next(&self, state: &TurnState, current: NodeType) -> NextNode;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextNode {
    Model,
    Tool,
    End,
}

/// The chat-vs-tool routing rule: after a model call, go to the tool node iff
/// the response requested tools, otherwise the turn is done; after a tool
/// round, always return to the model with the augmented sequence.
pub struct SimpleRouter;

impl Router for SimpleRouter {
    fn next(&self, state: &TurnState, current: NodeType) -> NextNode {
        match current {
            NodeType::Model => {
                if state.has_pending_tool_calls() {
                    NextNode::Tool
                } else {
                    NextNode::End
                }
            }
            NodeType::Tool => NextNode::Model,
        }
    }
}
