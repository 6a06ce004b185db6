//! In-memory task store for tests and embedding.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::StoreFile;
use crate::domain::StoreError;
use crate::ports::TaskStore;

/// Keeps the last saved document in memory.
///
/// Clones share state, so a test can hold one handle while the runner owns
/// another. Saves can be made to fail to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<StoreFile>>,
    saves: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document (e.g. to simulate a restart).
    pub fn with_contents(store: StoreFile) -> Self {
        Self {
            state: Arc::new(Mutex::new(store)),
            ..Self::default()
        }
    }

    /// Snapshot of the last successfully saved document.
    pub async fn snapshot(&self) -> StoreFile {
        self.state.lock().await.clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn fail_saves(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn load(&self) -> StoreFile {
        self.state.lock().await.clone()
    }

    async fn save(&self, store: &StoreFile) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store set to fail".to_string()));
        }
        *self.state.lock().await = store.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_task;

    #[tokio::test]
    async fn clones_share_saved_state() {
        let store = InMemoryTaskStore::new();
        let handle = store.clone();

        let mut file = StoreFile::default();
        file.add_task(sample_task(1));
        store.save(&file).await.unwrap();

        assert_eq!(handle.snapshot().await, file);
        assert_eq!(handle.save_count(), 1);
    }

    #[tokio::test]
    async fn failing_saves_keep_previous_document() {
        let store = InMemoryTaskStore::new();
        store.fail_saves(true);

        let mut file = StoreFile::default();
        file.add_task(sample_task(1));

        assert!(store.save(&file).await.is_err());
        assert!(store.load().await.tasks.is_empty());
        assert_eq!(store.save_count(), 0);
    }
}
