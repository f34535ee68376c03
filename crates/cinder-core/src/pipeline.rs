//! Pipeline definition types.
//!
//! These types represent the user-authored pipeline YAML configuration.

use crate::ids::PipelineId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineDefinition {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub triggers: Vec<TriggerRule>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    pub jobs: Vec<JobDefinition>,
}

/// A single trigger rule. Rules are evaluated in declaration order and
/// the first matching rule selects the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriggerRule {
    pub on: TriggerKind,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    BranchPush,
    TagPush,
    PullRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default = "default_platform")]
    pub platform: Platform,
    /// Names of jobs that must succeed before this job may start.
    #[serde(default)]
    pub needs: Vec<String>,
    pub steps: Vec<StepDefinition>,
    /// Artifacts this job uploads after its steps succeed.
    #[serde(default)]
    pub produces: Vec<ArtifactBinding>,
    /// Artifacts this job downloads into its workspace before running.
    #[serde(default)]
    pub consumes: Vec<ArtifactBinding>,
    /// When set, the job publishes a release from its consumed artifacts.
    #[serde(default)]
    pub release: Option<ReleaseSpec>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

fn default_platform() -> Platform {
    Platform::Linux
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linux,
    Macos,
    Windows,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepDefinition {
    pub name: String,
    pub run: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

fn default_shell() -> String {
    "sh".to_string()
}

/// Binds an artifact name to a workspace-relative path. For `produces`
/// the payload is read from the path; for `consumes` it is written there.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactBinding {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReleaseSpec {
    pub tag: String,
    /// The complete artifact-name set the release must contain.
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Pipeline {
    pub id: PipelineId,
    pub name: String,
    pub definition: PipelineDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pipeline {
    /// Wrap a definition with a fresh identity.
    pub fn from_definition(definition: PipelineDefinition) -> Self {
        let now = Utc::now();
        Self {
            id: PipelineId::new(),
            name: definition.name.clone(),
            definition,
            created_at: now,
            updated_at: now,
        }
    }
}
