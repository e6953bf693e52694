use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use colloquy_graph::{Engine, EngineConfig, StreamEvent, TurnInput};
use colloquy_llm::{
    ChatClient, ChatRequest, ChatResponse, Message, StreamEvent as LlmEvent, Tool,
};
use colloquy_persist::{Checkpointer, MemoryStore, ThreadStore, TurnPhase};
use colloquy_tools::{ToolHandler, ToolRegistry};
use futures::Stream;
use serde_json::{json, Value};
use tokio::sync::{Barrier, Semaphore};

type EventStream = Pin<Box<dyn Stream<Item = Result<LlmEvent>> + Send>>;

/// One scripted model completion
#[derive(Clone)]
enum Scripted {
    Text(&'static str),
    ToolCall {
        name: &'static str,
        arguments: &'static str,
    },
}

impl Scripted {
    fn into_events(self, call_index: usize) -> Vec<Result<LlmEvent>> {
        match self {
            Scripted::Text(text) => {
                // split roughly in half to exercise fragment concatenation
                let mid = text.len() / 2;
                vec![
                    Ok(LlmEvent::Message {
                        content: text[..mid].to_string(),
                    }),
                    Ok(LlmEvent::Message {
                        content: text[mid..].to_string(),
                    }),
                    Ok(LlmEvent::Done {
                        finish_reason: Some("stop".to_string()),
                    }),
                ]
            }
            Scripted::ToolCall { name, arguments } => vec![
                Ok(LlmEvent::ToolCall {
                    index: 0,
                    id: Some(format!("call_{call_index}")),
                    name: Some(name.to_string()),
                    arguments: None,
                }),
                Ok(LlmEvent::ToolCall {
                    index: 0,
                    id: None,
                    name: None,
                    arguments: Some(arguments.to_string()),
                }),
                Ok(LlmEvent::Done {
                    finish_reason: Some("tool_calls".to_string()),
                }),
            ],
        }
    }
}

/// Plays back a fixed sequence of completions, one per `chat_stream` call.
/// `chat` (used by title generation) returns a fixed label.
struct ScriptedClient {
    responses: Mutex<VecDeque<Scripted>>,
    stream_calls: AtomicUsize,
    title: Option<&'static str>,
}

impl ScriptedClient {
    fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            stream_calls: AtomicUsize::new(0),
            title: Some("Stock Price Query"),
        }
    }

    fn without_title(mut self) -> Self {
        self.title = None;
        self
    }

    fn model_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        match self.title {
            Some(title) => Ok(ChatResponse {
                content: Some(format!("\"{title}\"")),
                tool_calls: None,
                finish_reason: Some("stop".to_string()),
            }),
            None => anyhow::bail!("model unavailable"),
        }
    }

    async fn chat_stream(&self, _request: ChatRequest) -> Result<EventStream> {
        let call_index = self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
        Ok(Box::pin(futures::stream::iter(next.into_events(call_index))))
    }
}

/// Requests the same tool on every completion, forever
struct AlwaysToolClient {
    stream_calls: AtomicUsize,
}

impl AlwaysToolClient {
    fn new() -> Self {
        Self {
            stream_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatClient for AlwaysToolClient {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        anyhow::bail!("not scripted")
    }

    async fn chat_stream(&self, _request: ChatRequest) -> Result<EventStream> {
        let call_index = self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let events = Scripted::ToolCall {
            name: "get_stock_price",
            arguments: r#"{"symbol":"AAPL"}"#,
        }
        .into_events(call_index);
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

/// Scripted playback whose completions wait for a gate permit, so a test can
/// hold a turn mid-flight
struct GatedClient {
    responses: Mutex<VecDeque<Scripted>>,
    gate: Arc<Semaphore>,
    gate_after: usize,
    stream_calls: AtomicUsize,
}

impl GatedClient {
    fn new(responses: Vec<Scripted>, gate: Arc<Semaphore>, gate_after: usize) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            gate,
            gate_after,
            stream_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatClient for GatedClient {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        anyhow::bail!("not scripted")
    }

    async fn chat_stream(&self, _request: ChatRequest) -> Result<EventStream> {
        let call_index = self.stream_calls.fetch_add(1, Ordering::SeqCst);
        if call_index >= self.gate_after {
            self.gate.acquire().await?.forget();
        }
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
        Ok(Box::pin(futures::stream::iter(next.into_events(call_index))))
    }
}

/// Replies only once the expected number of streams are open at the same time
struct BarrierClient {
    barrier: Barrier,
}

impl BarrierClient {
    fn new(parties: usize) -> Self {
        Self {
            barrier: Barrier::new(parties),
        }
    }
}

#[async_trait]
impl ChatClient for BarrierClient {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        anyhow::bail!("not scripted")
    }

    async fn chat_stream(&self, _request: ChatRequest) -> Result<EventStream> {
        self.barrier.wait().await;
        Ok(Box::pin(futures::stream::iter(
            Scripted::Text("done").into_events(0),
        )))
    }
}

/// Model capability that is down
struct FailingClient;

#[async_trait]
impl ChatClient for FailingClient {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        anyhow::bail!("model unavailable")
    }

    async fn chat_stream(&self, _request: ChatRequest) -> Result<EventStream> {
        anyhow::bail!("model unavailable")
    }
}

struct StockPriceTool;

#[async_trait]
impl ToolHandler for StockPriceTool {
    fn definition(&self) -> Tool {
        Tool::new(
            "get_stock_price",
            "Fetch latest stock price for a given symbol",
            json!({
                "type": "object",
                "properties": {"symbol": {"type": "string"}},
                "required": ["symbol"]
            }),
        )
    }

    async fn invoke(&self, arguments: Value) -> Result<String> {
        let symbol = arguments["symbol"].as_str().unwrap_or("?");
        Ok(json!({"symbol": symbol, "price": 187.20}).to_string())
    }
}

struct BrokenTool;

#[async_trait]
impl ToolHandler for BrokenTool {
    fn definition(&self) -> Tool {
        Tool::new(
            "get_stock_price",
            "Fetch latest stock price for a given symbol",
            json!({"type": "object"}),
        )
    }

    async fn invoke(&self, _arguments: Value) -> Result<String> {
        anyhow::bail!("upstream quote API returned 500")
    }
}

struct Fixture {
    engine: Engine,
    store: Arc<MemoryStore>,
}

fn fixture(client: Arc<dyn ChatClient>, tools: Vec<Arc<dyn ToolHandler>>) -> Fixture {
    fixture_with_config(client, tools, EngineConfig::default())
}

fn fixture_with_config(
    client: Arc<dyn ChatClient>,
    tools: Vec<Arc<dyn ToolHandler>>,
    config: EngineConfig,
) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }

    let engine = Engine::builder()
        .chat_client(client)
        .tool_registry(Arc::new(registry))
        .checkpointer(Arc::clone(&store) as Arc<dyn Checkpointer>)
        .thread_store(Arc::clone(&store) as Arc<dyn ThreadStore>)
        .config(config)
        .build()
        .unwrap();

    Fixture { engine, store }
}

/// Drain the turn's event channel to completion
async fn collect_events(mut rx: tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn reply_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Message { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

fn turn_status(events: &[StreamEvent]) -> Option<&str> {
    events.iter().rev().find_map(|e| match e {
        StreamEvent::TurnEnd { status, .. } => Some(status.as_str()),
        _ => None,
    })
}

async fn wait_for_title(store: &MemoryStore, user_id: &str) -> Option<String> {
    for _ in 0..50 {
        let threads = store.list_threads(user_id).await.unwrap();
        if let Some(title) = threads.first().and_then(|t| t.title.clone()) {
            return Some(title);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    None
}

#[tokio::test]
async fn stock_price_scenario() {
    let client = Arc::new(ScriptedClient::new(vec![
        Scripted::ToolCall {
            name: "get_stock_price",
            arguments: r#"{"symbol":"AAPL"}"#,
        },
        Scripted::Text("AAPL is trading at $187.20"),
    ]));
    let f = fixture(
        Arc::clone(&client) as Arc<dyn ChatClient>,
        vec![Arc::new(StockPriceTool) as Arc<dyn ToolHandler>],
    );

    let rx = f
        .engine
        .spawn_turn(TurnInput::new("t1", "u1", "What's AAPL trading at?"));
    let events = collect_events(rx).await;

    assert_eq!(reply_text(&events), "AAPL is trading at $187.20");
    assert_eq!(turn_status(&events), Some("success"));
    assert_eq!(client.model_calls(), 2);

    // a successful tool round appears exactly once in the stream
    let tool_results: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ToolResult {
                result, is_error, ..
            } => Some((result.clone(), *is_error)),
            _ => None,
        })
        .collect();
    assert_eq!(tool_results.len(), 1);
    assert!(!tool_results[0].1);
    assert!(tool_results[0].0.contains("187.2"));

    // checkpoint: user, assistant(tool-call), tool(result), assistant(final)
    let checkpoint = f.store.get("t1").await.unwrap().unwrap();
    let roles: Vec<_> = checkpoint.messages.iter().map(|m| m.role()).collect();
    assert_eq!(roles, vec!["user", "assistant", "tool", "assistant"]);
    assert!(matches!(
        &checkpoint.messages[1],
        Message::AI {
            tool_calls: Some(calls),
            ..
        } if calls.len() == 1 && calls[0].function.name == "get_stock_price"
    ));

    // the thread shows up in the owner's list with a generated title
    let threads = f.store.list_threads("u1").await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].thread_id, "t1");
    assert_eq!(
        wait_for_title(&f.store, "u1").await.as_deref(),
        Some("Stock Price Query")
    );
}

#[tokio::test]
async fn bounded_tool_rounds_terminate() {
    let client = Arc::new(AlwaysToolClient::new());
    let f = fixture_with_config(
        Arc::clone(&client) as Arc<dyn ChatClient>,
        vec![Arc::new(StockPriceTool) as Arc<dyn ToolHandler>],
        EngineConfig::default().with_max_tool_rounds(2),
    );

    let rx = f.engine.spawn_turn(TurnInput::new("t1", "u1", "loop forever"));
    let events = collect_events(rx).await;

    // N tool rounds means at most N+1 model calls
    assert_eq!(client.stream_calls.load(Ordering::SeqCst), 3);
    assert_eq!(turn_status(&events), Some("error"));
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::Error { message, .. } if message.contains("Tool round limit")
    )));
}

#[tokio::test]
async fn tool_failure_does_not_abort_turn() {
    let client = Arc::new(ScriptedClient::new(vec![
        Scripted::ToolCall {
            name: "get_stock_price",
            arguments: r#"{"symbol":"AAPL"}"#,
        },
        Scripted::Text("I couldn't fetch the quote, sorry."),
    ]));
    let f = fixture(
        Arc::clone(&client) as Arc<dyn ChatClient>,
        vec![Arc::new(BrokenTool) as Arc<dyn ToolHandler>],
    );

    let rx = f.engine.spawn_turn(TurnInput::new("t1", "u1", "price?"));
    let events = collect_events(rx).await;

    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::ToolResult { is_error: true, .. }
    )));
    assert_eq!(reply_text(&events), "I couldn't fetch the quote, sorry.");
    assert_eq!(turn_status(&events), Some("success"));

    // the failure is fed back to the model as the tool's result content
    let checkpoint = f.store.get("t1").await.unwrap().unwrap();
    let tool_msg = checkpoint
        .messages
        .iter()
        .find(|m| m.role() == "tool")
        .unwrap();
    assert!(tool_msg.text().unwrap().contains("Tool execution failed"));
}

#[tokio::test]
async fn unknown_tool_request_is_captured_as_error_result() {
    let client = Arc::new(ScriptedClient::new(vec![
        Scripted::ToolCall {
            name: "get_stock_price",
            arguments: r#"{"symbol":"AAPL"}"#,
        },
        Scripted::Text("No such tool here."),
    ]));
    // registry left empty
    let f = fixture(Arc::clone(&client) as Arc<dyn ChatClient>, vec![]);

    let rx = f.engine.spawn_turn(TurnInput::new("t1", "u1", "price?"));
    let events = collect_events(rx).await;

    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::ToolResult { is_error: true, result, .. } if result.contains("not found")
    )));
    assert_eq!(turn_status(&events), Some("success"));
}

#[tokio::test]
async fn model_failure_leaves_checkpoint_intact() {
    let f = fixture(Arc::new(FailingClient), vec![]);

    let rx = f.engine.spawn_turn(TurnInput::new("t1", "u1", "hello?"));
    let events = collect_events(rx).await;

    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::Error { message, .. } if message.contains("model unavailable")
    )));
    assert_eq!(turn_status(&events), None);

    // no partial assistant message was committed
    let checkpoint = f.store.get("t1").await.unwrap().unwrap();
    let roles: Vec<_> = checkpoint.messages.iter().map(|m| m.role()).collect();
    assert_eq!(roles, vec!["user"]);
}

#[tokio::test]
async fn conversation_resumes_from_checkpoint() {
    let client = Arc::new(ScriptedClient::new(vec![
        Scripted::Text("Hello! How can I help?"),
        Scripted::Text("Rust is a systems language."),
    ]));
    let f = fixture(Arc::clone(&client) as Arc<dyn ChatClient>, vec![]);

    let rx = f.engine.spawn_turn(TurnInput::new("t1", "u1", "hi"));
    collect_events(rx).await;

    let rx = f.engine.spawn_turn(TurnInput::new("t1", "u1", "what is rust?"));
    let events = collect_events(rx).await;
    assert_eq!(reply_text(&events), "Rust is a systems language.");

    let history = f.engine.thread_history("t1").await.unwrap();
    let roles: Vec<_> = history.iter().map(|m| m.role()).collect();
    assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
}

#[tokio::test]
async fn failed_title_generation_keeps_thread_listed() {
    let client = ScriptedClient::new(vec![Scripted::Text("hi there")]).without_title();
    let f = fixture(Arc::new(client), vec![]);

    let rx = f.engine.spawn_turn(TurnInput::new("t1", "u1", "hello"));
    let events = collect_events(rx).await;
    assert_eq!(turn_status(&events), Some("success"));

    // give the title task a moment to fail
    tokio::time::sleep(Duration::from_millis(50)).await;

    let threads = f.store.list_threads("u1").await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].title, None);
    assert_eq!(threads[0].display_title(), "New Chat");
}

#[tokio::test]
async fn dropped_receiver_stops_output_and_keeps_checkpoint() {
    let gate = Arc::new(Semaphore::new(0));
    let client = Arc::new(GatedClient::new(
        vec![
            Scripted::ToolCall {
                name: "get_stock_price",
                arguments: r#"{"symbol":"AAPL"}"#,
            },
            Scripted::Text("AAPL is trading at $187.20"),
        ],
        Arc::clone(&gate),
        1, // first completion flows freely, the follow-up waits
    ));
    let f = fixture(
        client as Arc<dyn ChatClient>,
        vec![Arc::new(StockPriceTool) as Arc<dyn ToolHandler>],
    );

    let mut rx = f.engine.spawn_turn(TurnInput::new("t1", "u1", "price?"));
    while let Some(event) = rx.recv().await {
        if matches!(event, StreamEvent::ToolResult { .. }) {
            break;
        }
    }
    // caller walks away mid-turn, then the follow-up model call resumes
    drop(rx);
    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // the last committed transition stands; nothing after it was written
    let checkpoint = f.store.get("t1").await.unwrap().unwrap();
    let roles: Vec<_> = checkpoint.messages.iter().map(|m| m.role()).collect();
    assert_eq!(roles, vec!["user", "assistant", "tool"]);
    assert_eq!(checkpoint.position, TurnPhase::ModelCall);
}

#[tokio::test]
async fn turns_on_one_thread_are_serialized() {
    let gate = Arc::new(Semaphore::new(0));
    let client = Arc::new(GatedClient::new(
        vec![
            Scripted::Text("first reply"),
            Scripted::Text("second reply"),
        ],
        Arc::clone(&gate),
        0,
    ));
    let f = fixture(client as Arc<dyn ChatClient>, vec![]);

    let mut rx1 = f.engine.spawn_turn(TurnInput::new("t1", "u1", "hi one"));
    assert!(matches!(rx1.recv().await, Some(StreamEvent::TurnStart { .. })));

    // the second turn must queue behind the first, which is mid model call
    let mut rx2 = f.engine.spawn_turn(TurnInput::new("t1", "u1", "hi two"));
    let queued = tokio::time::timeout(Duration::from_millis(100), rx2.recv()).await;
    assert!(queued.is_err(), "second turn ran before the first finished");

    gate.add_permits(2);
    let events1 = collect_events(rx1).await;
    let events2 = collect_events(rx2).await;
    assert_eq!(reply_text(&events1), "first reply");
    assert_eq!(reply_text(&events2), "second reply");
    assert_eq!(turn_status(&events2), Some("success"));

    // no interleaving: each exchange is contiguous in the history
    let history = f.engine.thread_history("t1").await.unwrap();
    let texts: Vec<_> = history.iter().filter_map(|m| m.text()).collect();
    assert_eq!(texts, vec!["hi one", "first reply", "hi two", "second reply"]);
}

#[tokio::test]
async fn turns_on_different_threads_run_concurrently() {
    let client = Arc::new(BarrierClient::new(2));
    let f = fixture(client as Arc<dyn ChatClient>, vec![]);

    let rx1 = f.engine.spawn_turn(TurnInput::new("t1", "u1", "hello"));
    let rx2 = f.engine.spawn_turn(TurnInput::new("t2", "u1", "hello"));

    // completes only if both model calls are in flight at once
    let (events1, events2) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(collect_events(rx1), collect_events(rx2))
    })
    .await
    .expect("turns on distinct threads blocked each other");

    assert_eq!(turn_status(&events1), Some("success"));
    assert_eq!(turn_status(&events2), Some("success"));
}

#[tokio::test]
async fn threads_are_isolated_per_user() {
    let client = Arc::new(ScriptedClient::new(vec![
        Scripted::Text("hi u1"),
        Scripted::Text("hi u2"),
    ]));
    let f = fixture(Arc::clone(&client) as Arc<dyn ChatClient>, vec![]);

    let rx = f.engine.spawn_turn(TurnInput::new("t1", "u1", "hello"));
    collect_events(rx).await;
    let rx = f.engine.spawn_turn(TurnInput::new("t2", "u2", "hello"));
    collect_events(rx).await;

    let u1_threads = f.engine.list_threads("u1").await.unwrap();
    assert_eq!(u1_threads.len(), 1);
    assert_eq!(u1_threads[0].thread_id, "t1");

    f.engine.clear_history("u1").await.unwrap();
    assert!(f.engine.list_threads("u1").await.unwrap().is_empty());
    assert_eq!(f.engine.list_threads("u2").await.unwrap().len(), 1);
}
