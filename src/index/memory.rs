//! Set-backed [`LocalIndex`] for tests and embedding.

use super::LocalIndex;
use crate::errors::SaveableResult;
use async_trait::async_trait;
use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

#[derive(Default)]
pub struct MemoryIndex {
    paths: Mutex<HashSet<String>>,
    queries: AtomicUsize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index = Self::new();
        for path in paths {
            index.insert(path);
        }
        index
    }

    pub fn insert(&self, path: impl Into<String>) {
        self.paths
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.into());
    }

    /// How many lookups have been served.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalIndex for MemoryIndex {
    async fn count_with_path(&self, path: &str) -> SaveableResult<u64> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let paths = self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(u64::from(paths.contains(path)))
    }
}
