//! Local record-of-truth query seam.

pub mod memory;
pub mod sqlite;

use crate::errors::SaveableResult;
use async_trait::async_trait;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

#[async_trait]
pub trait LocalIndex: Send + Sync {
    /// Number of rows whose path column equals `path`.
    async fn count_with_path(&self, path: &str) -> SaveableResult<u64>;
}
