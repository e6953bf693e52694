use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use colloquy_llm::{ChatClient, Message};
use colloquy_persist::{Checkpoint, Checkpointer, ThreadEntry, ThreadStore, TurnPhase};
use colloquy_tools::ToolRegistry;
use tokio::sync::{mpsc, Mutex};

use crate::node::{Node, NodeType};
use crate::nodes::{ModelNode, ToolNode};
use crate::router::{NextNode, Router, SimpleRouter};
use crate::title;
use crate::types::{EngineConfig, StreamEvent, TurnInput, TurnState};

type ThreadLocks = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// The turn-processing engine.
///
/// Holds every collaborator (model client, tool registry, checkpointer,
/// thread store) explicitly. One turn per thread is in flight at a time;
/// turns on different threads run concurrently.
#[derive(Clone)]
pub struct Engine {
    client: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
    checkpointer: Arc<dyn Checkpointer>,
    thread_store: Arc<dyn ThreadStore>,
    config: EngineConfig,
    thread_locks: ThreadLocks,
}

impl Engine {
    pub(crate) fn new(
        client: Arc<dyn ChatClient>,
        registry: Arc<ToolRegistry>,
        checkpointer: Arc<dyn Checkpointer>,
        thread_store: Arc<dyn ThreadStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            registry,
            checkpointer,
            thread_store,
            config,
            thread_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn builder() -> crate::builder::EngineBuilder {
        crate::builder::EngineBuilder::new()
    }

    /// Process one user message in the background, returning the event
    /// receiver. The receiver is a finite, non-restartable stream ending in
    /// `TurnEnd` (or `Error`); dropping it cancels output without touching
    /// checkpoints already written.
    pub fn spawn_turn(&self, input: TurnInput) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(1000);
        let engine = self.clone();

        tokio::spawn(async move {
            let timeout = engine.config.execution_timeout;
            match tokio::time::timeout(timeout, engine.run_turn(input, tx.clone())).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let _ = tx
                        .send(StreamEvent::Error {
                            message: e.to_string(),
                            node_id: None,
                        })
                        .await;
                }
                Err(_) => {
                    let _ = tx
                        .send(StreamEvent::Error {
                            message: format!("Turn timed out after {timeout:?}"),
                            node_id: None,
                        })
                        .await;
                }
            }
        });

        rx
    }

    /// Thread list for the presentation layer
    pub async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadEntry>> {
        Ok(self.thread_store.list_threads(user_id).await?)
    }

    /// Persisted message sequence for one thread (empty if unknown)
    pub async fn thread_history(&self, thread_id: &str) -> Result<Vec<Message>> {
        let checkpoint = self.checkpointer.get(thread_id).await?;
        Ok(checkpoint.map(|c| c.messages).unwrap_or_default())
    }

    /// "Clear history": drop every thread (titles and checkpoints) this user
    /// owns
    pub async fn clear_history(&self, user_id: &str) -> Result<()> {
        Ok(self.thread_store.delete_all(user_id).await?)
    }

    async fn run_turn(&self, input: TurnInput, event_tx: mpsc::Sender<StreamEvent>) -> Result<()> {
        let start_time = Instant::now();

        // per-thread single-writer discipline: the guard lives for the turn
        let lock = self.thread_lock(&input.thread_id).await;
        let _guard = lock.lock_owned().await;

        let prior = self.checkpointer.get(&input.thread_id).await?;
        let history = prior.map(|c| c.messages).unwrap_or_default();
        let first_message = history.is_empty();

        let mut state = TurnState::resume(&input, history);
        state.add_message(Message::human(input.text.clone()));
        state.phase = TurnPhase::ModelCall;
        self.checkpoint(&state).await?;

        event_tx
            .send(StreamEvent::TurnStart {
                run_id: state.run_id.clone(),
                thread_id: state.thread_id.clone(),
                timestamp: Utc::now().timestamp_millis(),
            })
            .await?;

        // Title generation fires on the thread's 0 -> 1 message transition.
        // Side effect only: failures are logged inside and never fail the turn.
        if first_message {
            let client = Arc::clone(&self.client);
            let store = Arc::clone(&self.thread_store);
            let thread_id = state.thread_id.clone();
            let user_id = state.user_id.clone();
            let model = state.llm_config.model.clone();
            let text = input.text.clone();
            tokio::spawn(async move {
                title::generate_title(client, store, &thread_id, &user_id, &model, &text).await;
            });
        }

        let model_node = ModelNode::new(Arc::clone(&self.client), Arc::clone(&self.registry));
        let tool_node = ToolNode::new(Arc::clone(&self.registry));
        let router = SimpleRouter;

        let mut current = NodeType::Model;
        let mut rounds = 0;

        let status = loop {
            match current {
                NodeType::Model => {
                    model_node.execute(&mut state, event_tx.clone()).await?;
                    state.phase = if state.has_pending_tool_calls() {
                        TurnPhase::ToolCall
                    } else {
                        TurnPhase::Done
                    };
                }
                NodeType::Tool => {
                    tool_node.execute(&mut state, event_tx.clone()).await?;
                    state.phase = TurnPhase::ModelCall;
                }
            }

            // durable before the next transition begins
            self.checkpoint(&state).await?;

            match router.next(&state, current) {
                NextNode::End => break "success",
                NextNode::Model => current = NodeType::Model,
                NextNode::Tool => {
                    if rounds >= self.config.max_tool_rounds {
                        event_tx
                            .send(StreamEvent::Error {
                                message: format!(
                                    "Tool round limit ({}) reached",
                                    self.config.max_tool_rounds
                                ),
                                node_id: None,
                            })
                            .await?;
                        break "error";
                    }
                    rounds += 1;
                    current = NodeType::Tool;
                }
            }
        };

        event_tx
            .send(StreamEvent::TurnEnd {
                status: status.to_string(),
                total_duration_ms: start_time.elapsed().as_millis() as u64,
            })
            .await?;

        Ok(())
    }

    async fn checkpoint(&self, state: &TurnState) -> Result<()> {
        let checkpoint = Checkpoint::new(&state.user_id, state.messages.clone(), state.phase);
        self.checkpointer.put(&state.thread_id, checkpoint).await?;
        Ok(())
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.thread_locks.lock().await;
        // entries with no turn in flight hold the only strong reference
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            locks
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
