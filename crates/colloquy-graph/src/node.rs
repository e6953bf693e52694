use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{StreamEvent, TurnState};

pub type EventSender = mpsc::Sender<StreamEvent>;

/// One unit of work in the turn state machine
#[async_trait]
pub trait Node: Send + Sync {
    /// Run the node, appending to state and emitting events as it goes
    async fn execute(&self, state: &mut TurnState, event_tx: EventSender) -> Result<()>;

    fn node_type(&self) -> NodeType;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Model,
    Tool,
}
