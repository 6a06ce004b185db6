//! TaskStore port - the durable source of truth for the task collection.
//!
//! The whole collection is one document (`StoreFile`). The scheduler keeps a
//! cached copy, mutates it in memory and calls `save` after every mutation.

use async_trait::async_trait;

use crate::domain::StoreError;
use crate::store::StoreFile;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Load the document. A missing or unreadable document is an empty store,
    /// never an error.
    async fn load(&self) -> StoreFile;

    /// Replace the persisted document. Concurrent saves must not interleave.
    async fn save(&self, store: &StoreFile) -> Result<(), StoreError>;

    /// Claim the document for this handle (and its clones) until dropped.
    ///
    /// A runner saves its whole cached copy, so a second owner would
    /// overwrite the first one's changes. Stores that cannot be shared
    /// return `StoreError::Locked` while another handle owns them.
    async fn acquire(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
