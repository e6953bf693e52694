use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{Checkpoint, ThreadEntry};
use crate::traits::{Checkpointer, ThreadStore};

#[derive(Debug, Clone)]
struct TitleRow {
    user_id: String,
    title: String,
}

#[derive(Default)]
struct Inner {
    /// Thread ids in first-seen order, shared by both tables
    order: Vec<String>,
    titles: HashMap<String, TitleRow>,
    checkpoints: HashMap<String, Checkpoint>,
}

impl Inner {
    fn note_thread(&mut self, thread_id: &str) {
        if !self.titles.contains_key(thread_id) && !self.checkpoints.contains_key(thread_id) {
            self.order.push(thread_id.to_string());
        }
    }
}

/// In-memory store for tests and throwaway deployments. Nothing survives a
/// restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryStore {
    async fn put(&self, thread_id: &str, checkpoint: Checkpoint) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.note_thread(thread_id);
        inner.checkpoints.insert(thread_id.to_string(), checkpoint);
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let inner = self.inner.read().await;
        Ok(inner.checkpoints.get(thread_id).cloned())
    }
}

#[async_trait]
impl ThreadStore for MemoryStore {
    async fn record_title(&self, thread_id: &str, user_id: &str, title: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.note_thread(thread_id);
        inner.titles.insert(
            thread_id.to_string(),
            TitleRow {
                user_id: user_id.to_string(),
                title: title.to_string(),
            },
        );
        Ok(())
    }

    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadEntry>> {
        let inner = self.inner.read().await;
        let mut entries = Vec::new();

        for thread_id in &inner.order {
            let title = inner
                .titles
                .get(thread_id)
                .filter(|row| row.user_id == user_id);
            let checkpointed = inner
                .checkpoints
                .get(thread_id)
                .is_some_and(|c| c.user_id == user_id);

            if title.is_some() || checkpointed {
                entries.push(ThreadEntry {
                    thread_id: thread_id.clone(),
                    title: title.map(|row| row.title.clone()),
                });
            }
        }

        Ok(entries)
    }

    async fn delete_all(&self, user_id: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        let Inner {
            order,
            titles,
            checkpoints,
        } = &mut *guard;

        titles.retain(|_, row| row.user_id != user_id);
        checkpoints.retain(|_, checkpoint| checkpoint.user_id != user_id);
        order.retain(|id| titles.contains_key(id) || checkpoints.contains_key(id));
        Ok(())
    }
}
