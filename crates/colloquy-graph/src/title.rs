use std::sync::Arc;

use colloquy_llm::{ChatClient, ChatOptions, ChatRequest, Message, ToolChoice};
use colloquy_persist::ThreadStore;

/// Derive a short label for a new thread from its first user message and
/// store it. One non-tool-enabled model call; any failure is logged and
/// swallowed so the thread simply keeps its default label.
pub(crate) async fn generate_title(
    client: Arc<dyn ChatClient>,
    store: Arc<dyn ThreadStore>,
    thread_id: &str,
    user_id: &str,
    model: &str,
    first_message: &str,
) {
    let prompt = format!("Summarize this query in 3-5 words for a chat title: {first_message}");
    let request = ChatRequest::new(model, vec![Message::human(prompt)])
        .with_options(ChatOptions::new().tool_choice(ToolChoice::None));

    let response = match client.chat(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(%thread_id, "title generation failed: {e}");
            return;
        }
    };

    let title = response.content.unwrap_or_default();
    let title = title.trim().trim_matches('"');
    if title.is_empty() {
        tracing::warn!(%thread_id, "title generation returned no content");
        return;
    }

    if let Err(e) = store.record_title(thread_id, user_id, title).await {
        tracing::warn!(%thread_id, "failed to record thread title: {e}");
    }
}
