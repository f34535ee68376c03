//! Cinder CI Artifact Store
//!
//! Named, binary-opaque payloads scoped to a single run. Writes are
//! once-only per (run, name); byte storage is delegated to a [`BlobStore`]
//! backend.
//!
//! [`BlobStore`]: cinder_core::ports::BlobStore

mod memory;
mod store;

pub use memory::MemoryBlobStore;
pub use store::ArtifactStore;
