/*!
Storage backends for persisted slots.

This module defines the storage abstraction (port) and the concrete implementations
(adapters). The engine only sees raw bytes addressed by slot name; where and how they
are kept is up to the backend. Every call is async so blocking file I/O can be moved
off the caller's thread.
*/

pub mod local;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io;

pub use local::LocalFileStorage;
pub use memory::MemoryStorage;

/// Summary of one persisted slot, as reported by [`StorageBackend::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Byte-level storage for named slots
///
/// Errors are plain I/O errors; the engine attaches the slot name and reports them as
/// `KeepsakeError::BackendUnavailable`. Writes must be all-or-nothing: a failed write
/// leaves the previous content of the slot in place.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the full content of a slot, `None` if it does not exist
    async fn read(&self, slot: &str) -> io::Result<Option<Bytes>>;

    /// Replace the content of a slot, creating it if needed
    async fn write(&self, slot: &str, data: Bytes) -> io::Result<()>;

    /// Remove a slot; removing a missing slot succeeds
    async fn delete(&self, slot: &str) -> io::Result<()>;

    /// Keep the slot but drop its content
    async fn truncate(&self, slot: &str) -> io::Result<()> {
        self.write(slot, Bytes::new()).await
    }

    /// Check whether a slot exists
    async fn exists(&self, slot: &str) -> io::Result<bool>;

    /// List every persisted slot, sorted by name
    async fn list(&self) -> io::Result<Vec<SlotInfo>>;
}
