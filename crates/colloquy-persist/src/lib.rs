pub mod error;
pub mod memory;
pub mod models;
pub mod sqlite;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::{Checkpoint, ThreadEntry, TurnPhase, DEFAULT_THREAD_TITLE};
pub use sqlite::SqliteStore;
pub use traits::{Checkpointer, ThreadStore};
