//! Cinder CI Release Publisher
//!
//! Publishes the artifacts gathered by a run's terminal fan-in job as one
//! versioned release. The completeness gate runs before any byte reaches
//! the external host — a release is never partially created.

mod fs_host;
mod publisher;

pub use fs_host::FsReleaseHost;
pub use publisher::ReleasePublisher;
