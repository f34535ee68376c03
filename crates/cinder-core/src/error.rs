//! Error types for Cinder CI.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Pipeline errors
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Invalid pipeline definition: {0}")]
    InvalidPipeline(String),

    // Job errors
    #[error("Job not found in pipeline: {0}")]
    JobNotFound(String),

    #[error("Step '{step}' in job '{job}' failed with exit code {exit_code}")]
    StepFailed {
        job: String,
        step: String,
        exit_code: i32,
    },

    // Artifact errors
    #[error("Artifact already uploaded for this run: {name}")]
    ArtifactConflict { name: String },

    #[error("Artifact '{name}' produced no payload")]
    ArtifactEmpty { name: String },

    #[error("Artifact not found in this run: {name}")]
    ArtifactNotFound { name: String },

    // Release errors
    #[error("Release artifact set incomplete, missing: {missing:?}")]
    PartialArtifactSet { missing: Vec<String> },

    #[error("Release publication failed: {0}")]
    ReleaseFailed(String),

    // Infrastructure errors
    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
