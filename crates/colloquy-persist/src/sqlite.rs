use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::models::{Checkpoint, ThreadEntry};
use crate::traits::{Checkpointer, ThreadStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS thread_titles (
    thread_id  TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL,
    title      TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id  TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL,
    snapshot   TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Durable on-disk store: one table for thread titles, one for whole-snapshot
/// checkpoint blobs (JSON). A snapshot is replaced in a single upsert, so
/// readers see the previous checkpoint or the new one, never a partial write.
///
/// `rusqlite` is synchronous; every operation runs on the blocking pool with
/// the connection behind a mutex, which also gives the single-writer
/// discipline the contract asks for.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Private in-memory database; same code paths as the on-disk store but
    /// without the durability
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Internal("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl Checkpointer for SqliteStore {
    async fn put(&self, thread_id: &str, checkpoint: Checkpoint) -> Result<()> {
        let thread_id = thread_id.to_string();
        let user_id = checkpoint.user_id.clone();
        let updated_at = checkpoint.updated_at.to_rfc3339();
        let snapshot = serde_json::to_string(&checkpoint)?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (thread_id, user_id, snapshot, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(thread_id) DO UPDATE SET
                     user_id = excluded.user_id,
                     snapshot = excluded.snapshot,
                     updated_at = excluded.updated_at",
                params![thread_id, user_id, snapshot, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let thread_id = thread_id.to_string();

        let snapshot: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT snapshot FROM checkpoints WHERE thread_id = ?1",
                        params![thread_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        match snapshot {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ThreadStore for SqliteStore {
    async fn record_title(&self, thread_id: &str, user_id: &str, title: &str) -> Result<()> {
        let thread_id = thread_id.to_string();
        let user_id = user_id.to_string();
        let title = title.to_string();
        let created_at = Utc::now().to_rfc3339();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO thread_titles (thread_id, user_id, title, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(thread_id) DO UPDATE SET
                     user_id = excluded.user_id,
                     title = excluded.title",
                params![thread_id, user_id, title, created_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadEntry>> {
        let user_id = user_id.to_string();

        self.with_conn(move |conn| {
            // Titled threads first, then checkpointed threads the title table
            // does not know about yet. Both scans are user-scoped; the union
            // is keyed by thread_id.
            let mut entries = Vec::new();

            let mut stmt = conn.prepare(
                "SELECT thread_id, title FROM thread_titles
                 WHERE user_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (thread_id, title) = row?;
                entries.push(ThreadEntry {
                    thread_id,
                    title: Some(title),
                });
            }

            let mut stmt = conn.prepare(
                "SELECT thread_id FROM checkpoints
                 WHERE user_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
            for row in rows {
                let thread_id = row?;
                if !entries.iter().any(|e| e.thread_id == thread_id) {
                    entries.push(ThreadEntry {
                        thread_id,
                        title: None,
                    });
                }
            }

            Ok(entries)
        })
        .await
    }

    async fn delete_all(&self, user_id: &str) -> Result<()> {
        let user_id = user_id.to_string();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM thread_titles WHERE user_id = ?1",
                params![user_id],
            )?;
            tx.execute(
                "DELETE FROM checkpoints WHERE user_id = ?1",
                params![user_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
