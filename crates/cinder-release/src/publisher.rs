//! Release publication with the all-or-nothing completeness gate.

use cinder_core::ports::ReleaseHost;
use cinder_core::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Publishes a collected artifact set as a single release.
pub struct ReleasePublisher {
    host: Arc<dyn ReleaseHost>,
}

impl ReleasePublisher {
    pub fn new(host: Arc<dyn ReleaseHost>) -> Self {
        Self { host }
    }

    /// Publish `artifacts` under `tag`.
    ///
    /// The expected name set is verified first; if any name is missing the
    /// call fails with [`Error::PartialArtifactSet`] and the host is never
    /// contacted. On success the host receives exactly one
    /// `create_release` call carrying every artifact.
    pub async fn publish(
        &self,
        tag: &str,
        expected: &[String],
        artifacts: Vec<(String, Vec<u8>)>,
    ) -> Result<()> {
        let present: HashSet<&str> = artifacts.iter().map(|(name, _)| name.as_str()).collect();
        let missing: Vec<String> = expected
            .iter()
            .filter(|name| !present.contains(name.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() {
            warn!(tag, ?missing, "Refusing to publish incomplete release");
            return Err(Error::PartialArtifactSet { missing });
        }

        self.host
            .create_release(tag, &artifacts)
            .await
            .map_err(|e| Error::ReleaseFailed(e.to_string()))?;
        info!(tag, artifact_count = artifacts.len(), "Release published");
        Ok(())
    }
}
