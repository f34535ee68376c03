//! Filesystem release host for local runs.

use async_trait::async_trait;
use cinder_core::Result;
use cinder_core::ports::ReleaseHost;
use std::path::PathBuf;
use tracing::info;

/// Release host that writes each artifact under `<root>/<tag>/`.
///
/// Stands in for a hosting provider when running pipelines locally; the
/// publisher's completeness gate has already run by the time this is
/// called, so writing the set out is the whole job.
pub struct FsReleaseHost {
    root: PathBuf,
}

impl FsReleaseHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ReleaseHost for FsReleaseHost {
    async fn create_release(&self, tag: &str, artifacts: &[(String, Vec<u8>)]) -> Result<()> {
        let release_dir = self.root.join(tag);
        tokio::fs::create_dir_all(&release_dir).await?;

        for (name, payload) in artifacts {
            let path = release_dir.join(name);
            tokio::fs::write(&path, payload).await?;
        }

        info!(tag, dir = %release_dir.display(), "Release written to disk");
        Ok(())
    }
}
