//! Lifecycle event types.

use crate::ids::{PipelineId, RunId};
use crate::pipeline::TriggerKind;
use crate::run::{JobStatus, RunStatus};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// All events emitted by the Cinder CI engine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Run lifecycle
    RunStarted(RunStartedPayload),
    RunCompleted(RunCompletedPayload),

    // Job lifecycle
    JobStarted(JobStartedPayload),
    JobCompleted(JobCompletedPayload),
    JobSkipped(JobSkippedPayload),

    // Step lifecycle
    StepCompleted(StepCompletedPayload),

    // Artifacts
    ArtifactUploaded(ArtifactUploadedPayload),

    // Release
    ReleasePublished(ReleasePublishedPayload),
}

impl Event {
    /// Returns the routing subject for this event.
    pub fn subject(&self) -> String {
        match self {
            Event::RunStarted(p) => format!("run.started.{}.{}", p.pipeline_id, p.run_id),
            Event::RunCompleted(p) => format!("run.completed.{}.{}", p.pipeline_id, p.run_id),
            Event::JobStarted(p) => format!("run.{}.job.{}.started", p.run_id, p.job_name),
            Event::JobCompleted(p) => format!("run.{}.job.{}.completed", p.run_id, p.job_name),
            Event::JobSkipped(p) => format!("run.{}.job.{}.skipped", p.run_id, p.job_name),
            Event::StepCompleted(p) => {
                format!("run.{}.job.{}.step.{}", p.run_id, p.job_name, p.step_index)
            }
            Event::ArtifactUploaded(p) => format!("artifact.uploaded.{}.{}", p.run_id, p.name),
            Event::ReleasePublished(p) => format!("release.published.{}", p.tag),
        }
    }
}

// === Run payloads ===

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunStartedPayload {
    pub run_id: RunId,
    pub pipeline_id: PipelineId,
    pub pipeline_name: String,
    pub trigger: TriggerKind,
    pub git_ref: String,
    pub job_count: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunCompletedPayload {
    pub run_id: RunId,
    pub pipeline_id: PipelineId,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub jobs_succeeded: u32,
    pub jobs_failed: u32,
    pub jobs_skipped: u32,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

// === Job payloads ===

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStartedPayload {
    pub run_id: RunId,
    pub job_name: String,
    pub step_count: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobCompletedPayload {
    pub run_id: RunId,
    pub job_name: String,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSkippedPayload {
    pub run_id: RunId,
    pub job_name: String,
    /// The failed job that caused this skip.
    pub caused_by: String,
    pub skipped_at: DateTime<Utc>,
}

// === Step payloads ===

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepCompletedPayload {
    pub run_id: RunId,
    pub job_name: String,
    pub step_index: u32,
    pub step_name: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

// === Artifact payloads ===

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactUploadedPayload {
    pub run_id: RunId,
    pub job_name: String,
    pub name: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

// === Release payloads ===

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReleasePublishedPayload {
    pub run_id: RunId,
    pub tag: String,
    pub artifact_names: Vec<String>,
    pub published_at: DateTime<Utc>,
}
