//! Job execution: ordered steps with artifact brokering around them.

use crate::runner::{OutputLine, StepContext, StepRunner};
use cinder_artifacts::ArtifactStore;
use cinder_core::ids::RunId;
use cinder_core::pipeline::JobDefinition;
use cinder_core::run::JobStatus;
use cinder_core::{Error, Result};
use cinder_release::ReleasePublisher;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Execution environment for one job.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub run_id: RunId,
    pub workspace: PathBuf,
    pub variables: HashMap<String, String>,
}

/// Terminal result of one job execution.
#[derive(Debug)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    /// Cause of failure, if the job failed.
    pub error: Option<String>,
    pub steps: Vec<StepOutcome>,
    pub duration_ms: u64,
}

#[derive(Debug)]
pub struct StepOutcome {
    pub index: u32,
    pub name: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Runs one job to its terminal status.
///
/// Order of operations: consumed artifacts are downloaded into the
/// workspace, steps run strictly in sequence with the first failure
/// aborting the job, produced artifacts are uploaded, and a release
/// binding (if any) is published last. An artifact or release failure
/// downgrades the job to failed even when every step passed.
pub struct JobExecutor {
    runner: Arc<dyn StepRunner>,
    artifacts: Arc<ArtifactStore>,
    publisher: Arc<ReleasePublisher>,
}

impl JobExecutor {
    pub fn new(
        runner: Arc<dyn StepRunner>,
        artifacts: Arc<ArtifactStore>,
        publisher: Arc<ReleasePublisher>,
    ) -> Self {
        Self {
            runner,
            artifacts,
            publisher,
        }
    }

    pub async fn execute(&self, job: &JobDefinition, ctx: &JobContext) -> JobOutcome {
        let start = std::time::Instant::now();

        match self.try_execute(job, ctx).await {
            Ok((steps, exit_code)) => JobOutcome {
                status: JobStatus::Succeeded,
                exit_code,
                error: None,
                steps,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(failure) => {
                error!(job = %job.name, error = %failure.error, "Job failed");
                JobOutcome {
                    status: JobStatus::Failed,
                    exit_code: failure.exit_code,
                    error: Some(failure.error.to_string()),
                    steps: failure.steps,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
        }
    }

    async fn try_execute(
        &self,
        job: &JobDefinition,
        ctx: &JobContext,
    ) -> std::result::Result<(Vec<StepOutcome>, Option<i32>), JobFailure> {
        let mut steps = Vec::new();

        // Bring consumed artifacts into the workspace before any step runs.
        let consumed = self
            .download_consumed(job, ctx)
            .await
            .map_err(|e| JobFailure::new(e, &steps))?;

        let mut last_exit = None;
        for (index, step) in job.steps.iter().enumerate() {
            let mut variables = ctx.variables.clone();
            variables.extend(job.variables.clone());

            let step_ctx = StepContext {
                workspace: ctx.workspace.clone(),
                variables,
                step: step.clone(),
            };

            let (tx, mut rx) = mpsc::channel::<OutputLine>(100);
            let job_name = job.name.clone();
            let step_name = step.name.clone();
            let drain = tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    debug!(job = %job_name, step = %step_name, "{}", line.content);
                }
            });

            let result = self.runner.execute(&step_ctx, tx).await;
            let _ = drain.await;

            let result = result.map_err(|e| JobFailure::new(e, &steps))?;
            steps.push(StepOutcome {
                index: index as u32,
                name: step.name.clone(),
                exit_code: result.exit_code,
                duration_ms: result.duration_ms,
            });
            last_exit = Some(result.exit_code);

            // First failing step aborts the job; remaining steps never run.
            if !result.success {
                return Err(JobFailure::with_exit(
                    Error::StepFailed {
                        job: job.name.clone(),
                        step: step.name.clone(),
                        exit_code: result.exit_code,
                    },
                    result.exit_code,
                    &steps,
                ));
            }
        }

        self.upload_produced(job, ctx)
            .await
            .map_err(|e| JobFailure::with_opt_exit(e, last_exit, &steps))?;

        if let Some(spec) = &job.release {
            self.publisher
                .publish(&spec.tag, &spec.artifacts, consumed)
                .await
                .map_err(|e| JobFailure::with_opt_exit(e, last_exit, &steps))?;
        }

        Ok((steps, last_exit))
    }

    /// Download every consumed binding; returns the collected payloads so
    /// a release job can hand them to the publisher.
    async fn download_consumed(
        &self,
        job: &JobDefinition,
        ctx: &JobContext,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        let mut collected = Vec::with_capacity(job.consumes.len());

        for binding in &job.consumes {
            let payload = self.artifacts.download(ctx.run_id, &binding.name).await?;

            let dest = ctx.workspace.join(&binding.path);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&dest, &payload).await?;

            debug!(job = %job.name, artifact = %binding.name, path = %dest.display(), "Artifact staged");
            collected.push((binding.name.clone(), payload));
        }

        Ok(collected)
    }

    /// Upload every produced binding as the final act of a green job.
    async fn upload_produced(&self, job: &JobDefinition, ctx: &JobContext) -> Result<()> {
        for binding in &job.produces {
            let source = ctx.workspace.join(&binding.path);

            // A declared artifact whose file never materialized is an
            // empty result, which is fatal rather than a silent no-op.
            let payload = match tokio::fs::read(&source).await {
                Ok(bytes) => bytes,
                Err(_) => {
                    return Err(Error::ArtifactEmpty {
                        name: binding.name.clone(),
                    });
                }
            };

            self.artifacts
                .upload(ctx.run_id, &binding.name, payload)
                .await?;

            info!(job = %job.name, artifact = %binding.name, "Artifact published to run namespace");
        }

        Ok(())
    }
}

struct JobFailure {
    error: Error,
    exit_code: Option<i32>,
    steps: Vec<StepOutcome>,
}

impl JobFailure {
    fn new(error: Error, steps: &[StepOutcome]) -> Self {
        Self::with_opt_exit(error, None, steps)
    }

    fn with_exit(error: Error, exit_code: i32, steps: &[StepOutcome]) -> Self {
        Self::with_opt_exit(error, Some(exit_code), steps)
    }

    fn with_opt_exit(error: Error, exit_code: Option<i32>, steps: &[StepOutcome]) -> Self {
        Self {
            error,
            exit_code,
            steps: steps
                .iter()
                .map(|s| StepOutcome {
                    index: s.index,
                    name: s.name.clone(),
                    exit_code: s.exit_code,
                    duration_ms: s.duration_ms,
                })
                .collect(),
        }
    }
}
