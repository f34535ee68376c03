//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the core engine and external
//! collaborators: event delivery, blob storage, and release hosting.

use crate::Result;
use crate::events::Event;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event>> + Send>>;

/// Event bus for publishing and subscribing to lifecycle events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: Event) -> Result<()>;

    /// Subscribe to all events.
    async fn subscribe(&self) -> Result<EventStream>;
}

/// Byte storage behind the artifact store.
///
/// Keys are opaque to the backend; the artifact store owns the namespacing
/// scheme. The single write primitive is insert-if-absent so the store's
/// write-once rule holds without an external lock.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a payload under `key` if no payload exists there yet.
    /// Returns `true` if the payload was stored, `false` if the key was
    /// already occupied.
    async fn put_if_absent(&self, key: &str, payload: Vec<u8>) -> Result<bool>;

    /// Fetch the payload stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// List keys with the given prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// External release hosting collaborator.
///
/// Implementations receive exactly one call per release; the publisher has
/// already verified the artifact set is complete by the time this runs.
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Create a release under `tag` containing all given artifacts as a
    /// single atomic operation.
    async fn create_release(&self, tag: &str, artifacts: &[(String, Vec<u8>)]) -> Result<()>;
}
