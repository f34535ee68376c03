//! Artifact store contract: namespacing and existence rules.

use cinder_core::ids::RunId;
use cinder_core::ports::BlobStore;
use cinder_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Run-scoped artifact store.
///
/// Namespacing is strict: a payload uploaded by one run is invisible to
/// every other run. Uploads are write-once per (run, name) — the backend's
/// insert-if-absent primitive makes the first writer win without any
/// external lock.
pub struct ArtifactStore {
    blobs: Arc<dyn BlobStore>,
}

impl ArtifactStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    fn key(run_id: RunId, name: &str) -> String {
        format!("run/{}/{}", run_id.as_uuid(), name)
    }

    fn prefix(run_id: RunId) -> String {
        format!("run/{}/", run_id.as_uuid())
    }

    /// Upload a payload under `name` in the run's namespace.
    ///
    /// Fails with [`Error::ArtifactEmpty`] when the payload has no bytes
    /// and [`Error::ArtifactConflict`] when the name is already taken.
    pub async fn upload(&self, run_id: RunId, name: &str, payload: Vec<u8>) -> Result<()> {
        if payload.is_empty() {
            return Err(Error::ArtifactEmpty {
                name: name.to_string(),
            });
        }

        let size = payload.len();
        let inserted = self
            .blobs
            .put_if_absent(&Self::key(run_id, name), payload)
            .await?;
        if !inserted {
            return Err(Error::ArtifactConflict {
                name: name.to_string(),
            });
        }

        info!(%run_id, name, size_bytes = size, "Artifact uploaded");
        Ok(())
    }

    /// Download the payload stored under `name` in the run's namespace.
    pub async fn download(&self, run_id: RunId, name: &str) -> Result<Vec<u8>> {
        let payload = self
            .blobs
            .get(&Self::key(run_id, name))
            .await?
            .ok_or_else(|| Error::ArtifactNotFound {
                name: name.to_string(),
            })?;

        debug!(%run_id, name, size_bytes = payload.len(), "Artifact downloaded");
        Ok(payload)
    }

    /// Names of all artifacts uploaded by the run so far.
    pub async fn names_for_run(&self, run_id: RunId) -> Result<Vec<String>> {
        let prefix = Self::prefix(run_id);
        let keys = self.blobs.list(&prefix).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }
}
