//! Run and job state types.

use crate::ids::{JobId, PipelineId, RunId};
use crate::pipeline::TriggerKind;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One execution instance of a pipeline for a single triggering event.
///
/// A run owns a fresh artifact namespace keyed by its id and a mutable
/// status per job. It is created when a trigger matches and archived once
/// every job has reached a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Run {
    pub id: RunId,
    pub pipeline_id: PipelineId,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub trigger: TriggerInfo,
    pub jobs: Vec<JobState>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl Run {
    pub fn job(&self, name: &str) -> Option<&JobState> {
        self.jobs.iter().find(|j| j.name.as_str() == name)
    }

    pub fn job_mut(&mut self, name: &str) -> Option<&mut JobState> {
        self.jobs.iter_mut().find(|j| j.name.as_str() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriggerInfo {
    pub kind: TriggerKind,
    pub git_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobState {
    pub name: JobId,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    /// Set when the job failed; human-readable cause.
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl JobState {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: JobId::new(name),
            status: JobStatus::Pending,
            exit_code: None,
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Skipped
        )
    }
}
