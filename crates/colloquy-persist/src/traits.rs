use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Checkpoint, ThreadEntry};

/// Checkpoint persistence keyed by thread id.
///
/// A concurrent `get` sees a complete snapshot, never a partial write.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist the latest snapshot for a thread, replacing any previous one
    async fn put(&self, thread_id: &str, checkpoint: Checkpoint) -> Result<()>;

    /// Latest snapshot, or `None` for a thread never checkpointed.
    /// An unknown thread is empty history, not an error.
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>>;
}

/// Thread metadata, strictly partitioned by user.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Idempotent upsert keyed by thread id; a second call replaces the title
    async fn record_title(&self, thread_id: &str, user_id: &str, title: &str) -> Result<()>;

    /// Threads owned by `user_id` in first-insertion order: the union of
    /// titled and checkpointed threads, one entry per thread id.
    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadEntry>>;

    /// Remove every title and checkpoint for this user; other users' records
    /// are untouched
    async fn delete_all(&self, user_id: &str) -> Result<()>;
}
