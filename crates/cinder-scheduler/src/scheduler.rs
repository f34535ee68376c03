//! Run orchestration.

use crate::dag::GraphBuilder;
use chrono::Utc;
use cinder_core::events::{
    Event, JobCompletedPayload, JobSkippedPayload, JobStartedPayload, RunCompletedPayload,
    RunStartedPayload, StepCompletedPayload,
};
use cinder_core::ids::RunId;
use cinder_core::pipeline::{JobDefinition, Pipeline};
use cinder_core::ports::EventBus;
use cinder_core::run::{JobState, JobStatus, Run, RunStatus, TriggerInfo};
use cinder_core::{Error, Result};
use cinder_runner::{JobContext, JobExecutor, JobOutcome};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Drives a run over its job graph to completion.
///
/// The scheduler is a single coordinating loop: jobs execute as spawned
/// tasks, but every status transition is applied here, so the run state
/// needs no locking. Dispatch is greedy (all ready jobs at once) and a
/// failure skips its transitive dependents immediately, while in-flight
/// siblings are left to finish on their own.
pub struct Scheduler {
    executor: Arc<JobExecutor>,
    event_bus: Arc<dyn EventBus>,
    workspace_root: PathBuf,
}

impl Scheduler {
    pub fn new(
        executor: Arc<JobExecutor>,
        event_bus: Arc<dyn EventBus>,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            executor,
            event_bus,
            workspace_root,
        }
    }

    /// Instantiate and drive a run for the given pipeline.
    ///
    /// Graph validation happens before the run exists; a cyclic or
    /// dangling definition never produces a run. The returned run has
    /// every job in a terminal status.
    pub async fn run(&self, pipeline: &Pipeline, trigger: TriggerInfo) -> Result<Run> {
        let graph = GraphBuilder::new()
            .build(&pipeline.definition)
            .map_err(|e| Error::InvalidPipeline(e.to_string()))?;

        let now = Utc::now();
        let mut run = Run {
            id: RunId::new(),
            pipeline_id: pipeline.id,
            pipeline_name: pipeline.name.clone(),
            status: RunStatus::Running,
            trigger: trigger.clone(),
            jobs: pipeline
                .definition
                .jobs
                .iter()
                .map(|j| JobState::pending(&j.name))
                .collect(),
            queued_at: now,
            started_at: Some(now),
            completed_at: None,
            duration_ms: None,
        };

        info!(run_id = %run.id, pipeline = %pipeline.name, jobs = run.jobs.len(), "Run started");
        self.event_bus
            .publish(Event::RunStarted(RunStartedPayload {
                run_id: run.id,
                pipeline_id: pipeline.id,
                pipeline_name: pipeline.name.clone(),
                trigger: trigger.kind,
                git_ref: trigger.git_ref.clone(),
                job_count: run.jobs.len() as u32,
                started_at: now,
            }))
            .await?;

        // Run-scoped variables every job sees on top of its own.
        let mut base_variables = pipeline.definition.variables.clone();
        base_variables.insert("CINDER_RUN_ID".to_string(), run.id.to_string());
        base_variables.insert("CINDER_REF".to_string(), trigger.git_ref.clone());

        let mut statuses: HashMap<String, JobStatus> = run
            .jobs
            .iter()
            .map(|j| (j.name.as_str().to_string(), j.status))
            .collect();
        let mut join_set: JoinSet<(String, JobOutcome)> = JoinSet::new();

        loop {
            // Fan-out: dispatch everything that became ready.
            let ready: Vec<JobDefinition> = graph
                .ready(&statuses)
                .into_iter()
                .map(|n| n.definition.clone())
                .collect();

            for job in ready {
                self.dispatch(&mut run, job, &base_variables, &mut statuses, &mut join_set)
                    .await?;
            }

            // Nothing running and nothing newly ready: the run is settled.
            if join_set.is_empty() {
                break;
            }

            let (name, outcome) = match join_set.join_next().await {
                Some(Ok(result)) => result,
                Some(Err(e)) => return Err(Error::Internal(format!("Job task failed: {}", e))),
                None => break,
            };

            self.record_terminal(&mut run, &name, &outcome, &mut statuses)
                .await?;

            // Fail propagates downstream without waiting for in-flight
            // siblings; running jobs are never preempted.
            if outcome.status == JobStatus::Failed {
                self.skip_dependents(&graph, &mut run, &name, &mut statuses)
                    .await?;
            }
        }

        let failed = run.jobs.iter().any(|j| j.status == JobStatus::Failed);
        run.status = if failed {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        let completed_at = Utc::now();
        run.completed_at = Some(completed_at);
        run.duration_ms = run
            .started_at
            .map(|s| (completed_at - s).num_milliseconds() as u64);

        info!(run_id = %run.id, status = ?run.status, "Run completed");
        self.event_bus
            .publish(Event::RunCompleted(RunCompletedPayload {
                run_id: run.id,
                pipeline_id: run.pipeline_id,
                pipeline_name: run.pipeline_name.clone(),
                status: run.status,
                jobs_succeeded: count(&run, JobStatus::Succeeded),
                jobs_failed: count(&run, JobStatus::Failed),
                jobs_skipped: count(&run, JobStatus::Skipped),
                duration_ms: run.duration_ms.unwrap_or(0),
                completed_at,
            }))
            .await?;

        Ok(run)
    }

    async fn dispatch(
        &self,
        run: &mut Run,
        job: JobDefinition,
        base_variables: &HashMap<String, String>,
        statuses: &mut HashMap<String, JobStatus>,
        join_set: &mut JoinSet<(String, JobOutcome)>,
    ) -> Result<()> {
        let name = job.name.clone();
        let started_at = Utc::now();

        statuses.insert(name.clone(), JobStatus::Running);
        if let Some(state) = run.job_mut(&name) {
            state.status = JobStatus::Running;
            state.started_at = Some(started_at);
        }

        self.event_bus
            .publish(Event::JobStarted(JobStartedPayload {
                run_id: run.id,
                job_name: name.clone(),
                step_count: job.steps.len() as u32,
                started_at,
            }))
            .await?;

        let workspace = self
            .workspace_root
            .join(run.id.as_uuid().to_string())
            .join(&name);
        tokio::fs::create_dir_all(&workspace).await?;

        let ctx = JobContext {
            run_id: run.id,
            workspace,
            variables: base_variables.clone(),
        };

        let executor = self.executor.clone();
        join_set.spawn(async move {
            let outcome = executor.execute(&job, &ctx).await;
            (job.name, outcome)
        });

        Ok(())
    }

    async fn record_terminal(
        &self,
        run: &mut Run,
        name: &str,
        outcome: &JobOutcome,
        statuses: &mut HashMap<String, JobStatus>,
    ) -> Result<()> {
        let completed_at = Utc::now();
        statuses.insert(name.to_string(), outcome.status);

        if let Some(state) = run.job_mut(name) {
            state.status = outcome.status;
            state.exit_code = outcome.exit_code;
            state.error = outcome.error.clone();
            state.completed_at = Some(completed_at);
            state.duration_ms = Some(outcome.duration_ms);
        }

        for step in &outcome.steps {
            self.event_bus
                .publish(Event::StepCompleted(StepCompletedPayload {
                    run_id: run.id,
                    job_name: name.to_string(),
                    step_index: step.index,
                    step_name: step.name.clone(),
                    exit_code: step.exit_code,
                    duration_ms: step.duration_ms,
                    completed_at,
                }))
                .await?;
        }

        self.event_bus
            .publish(Event::JobCompleted(JobCompletedPayload {
                run_id: run.id,
                job_name: name.to_string(),
                status: outcome.status,
                exit_code: outcome.exit_code,
                duration_ms: outcome.duration_ms,
                completed_at,
            }))
            .await?;

        Ok(())
    }

    /// Move every pending transitive dependent of `failed_job` to skipped.
    async fn skip_dependents(
        &self,
        graph: &crate::dag::JobGraph,
        run: &mut Run,
        failed_job: &str,
        statuses: &mut HashMap<String, JobStatus>,
    ) -> Result<()> {
        for dependent in graph.dependents_transitive(failed_job) {
            if statuses.get(&dependent) != Some(&JobStatus::Pending) {
                continue;
            }

            warn!(job = %dependent, caused_by = %failed_job, "Skipping dependent job");
            let skipped_at = Utc::now();
            statuses.insert(dependent.clone(), JobStatus::Skipped);
            if let Some(state) = run.job_mut(&dependent) {
                state.status = JobStatus::Skipped;
                state.completed_at = Some(skipped_at);
            }

            self.event_bus
                .publish(Event::JobSkipped(JobSkippedPayload {
                    run_id: run.id,
                    job_name: dependent,
                    caused_by: failed_job.to_string(),
                    skipped_at,
                }))
                .await?;
        }

        Ok(())
    }
}

fn count(run: &Run, status: JobStatus) -> u32 {
    run.jobs.iter().filter(|j| j.status == status).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cinder_artifacts::{ArtifactStore, MemoryBlobStore};
    use cinder_core::bus::MemoryEventBus;
    use cinder_core::pipeline::{Platform, PipelineDefinition, StepDefinition, TriggerKind};
    use cinder_core::ports::ReleaseHost;
    use cinder_release::ReleasePublisher;
    use cinder_runner::{OutputLine, StepContext, StepResult, StepRunner};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Runner that records execution order and fails on command "fail".
    #[derive(Default)]
    struct ScriptedRunner {
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StepRunner for ScriptedRunner {
        async fn execute(
            &self,
            ctx: &StepContext,
            _output_tx: mpsc::Sender<OutputLine>,
        ) -> Result<StepResult> {
            self.executed.lock().unwrap().push(ctx.step.name.clone());
            let success = ctx.step.run != "fail";
            Ok(StepResult {
                exit_code: if success { 0 } else { 1 },
                success,
                duration_ms: 1,
            })
        }
    }

    struct NullHost;

    #[async_trait]
    impl ReleaseHost for NullHost {
        async fn create_release(&self, _tag: &str, _artifacts: &[(String, Vec<u8>)]) -> Result<()> {
            Ok(())
        }
    }

    fn make_job(name: &str, needs: Vec<&str>, command: &str) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            platform: Platform::Linux,
            needs: needs.iter().map(|s| s.to_string()).collect(),
            // Step named after the job so the scripted runner records
            // job-level execution order.
            steps: vec![StepDefinition {
                name: name.to_string(),
                run: command.to_string(),
                shell: "sh".to_string(),
                working_directory: None,
                variables: Default::default(),
            }],
            produces: vec![],
            consumes: vec![],
            release: None,
            variables: Default::default(),
        }
    }

    fn make_pipeline(jobs: Vec<JobDefinition>) -> Pipeline {
        Pipeline::from_definition(PipelineDefinition {
            version: "1".to_string(),
            name: "test-pipeline".to_string(),
            description: None,
            triggers: vec![],
            variables: Default::default(),
            jobs,
        })
    }

    fn trigger() -> TriggerInfo {
        TriggerInfo {
            kind: TriggerKind::BranchPush,
            git_ref: "refs/heads/main".to_string(),
        }
    }

    struct Harness {
        scheduler: Scheduler,
        runner: Arc<ScriptedRunner>,
        _workspace: tempfile::TempDir,
    }

    fn make_harness() -> Harness {
        let runner = Arc::new(ScriptedRunner::default());
        let executor = Arc::new(JobExecutor::new(
            runner.clone(),
            Arc::new(ArtifactStore::new(Arc::new(MemoryBlobStore::new()))),
            Arc::new(ReleasePublisher::new(Arc::new(NullHost))),
        ));
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(
            executor,
            Arc::new(MemoryEventBus::default()),
            workspace.path().to_path_buf(),
        );
        Harness {
            scheduler,
            runner,
            _workspace: workspace,
        }
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[tokio::test]
    async fn test_execution_order_respects_needs() {
        let h = make_harness();
        let pipeline = make_pipeline(vec![
            make_job("test", vec![], "true"),
            make_job("build", vec!["test"], "true"),
            make_job("deploy", vec!["build"], "true"),
        ]);

        let run = h.scheduler.run(&pipeline, trigger()).await.unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);

        let order = h.runner.executed.lock().unwrap().clone();
        assert_eq!(order, vec!["test", "build", "deploy"]);
    }

    #[tokio::test]
    async fn test_failed_job_skips_transitive_dependents() {
        let h = make_harness();
        let pipeline = make_pipeline(vec![
            make_job("test", vec![], "fail"),
            make_job("build", vec!["test"], "true"),
            make_job("deploy", vec!["build"], "true"),
        ]);

        let run = h.scheduler.run(&pipeline, trigger()).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.job("test").unwrap().status, JobStatus::Failed);
        assert_eq!(run.job("build").unwrap().status, JobStatus::Skipped);
        assert_eq!(run.job("deploy").unwrap().status, JobStatus::Skipped);

        // Skipped jobs never reach the runner.
        let order = h.runner.executed.lock().unwrap().clone();
        assert_eq!(order, vec!["test"]);
    }

    #[tokio::test]
    async fn test_fan_in_waits_for_all_predecessors() {
        let h = make_harness();
        let pipeline = make_pipeline(vec![
            make_job("test", vec![], "true"),
            make_job("build-a", vec!["test"], "true"),
            make_job("build-b", vec!["test"], "true"),
            make_job("build-c", vec!["test"], "true"),
            make_job("deploy", vec!["build-a", "build-b", "build-c"], "true"),
        ]);

        let run = h.scheduler.run(&pipeline, trigger()).await.unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);

        let order = h.runner.executed.lock().unwrap().clone();
        let deploy = position(&order, "deploy");
        assert!(deploy > position(&order, "build-a"));
        assert!(deploy > position(&order, "build-b"));
        assert!(deploy > position(&order, "build-c"));
        assert_eq!(position(&order, "test"), 0);
    }

    #[tokio::test]
    async fn test_one_failed_build_skips_fan_in_job() {
        let h = make_harness();
        let pipeline = make_pipeline(vec![
            make_job("test", vec![], "true"),
            make_job("build-a", vec!["test"], "true"),
            make_job("build-b", vec!["test"], "fail"),
            make_job("build-c", vec!["test"], "true"),
            make_job("deploy", vec!["build-a", "build-b", "build-c"], "true"),
        ]);

        let run = h.scheduler.run(&pipeline, trigger()).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.job("build-b").unwrap().status, JobStatus::Failed);
        assert_eq!(run.job("deploy").unwrap().status, JobStatus::Skipped);

        // Sibling builds are not preempted and finish on their own.
        assert_eq!(run.job("build-a").unwrap().status, JobStatus::Succeeded);
        assert_eq!(run.job("build-c").unwrap().status, JobStatus::Succeeded);

        let order = h.runner.executed.lock().unwrap().clone();
        assert!(!order.contains(&"deploy".to_string()));
    }

    #[tokio::test]
    async fn test_config_error_creates_no_run() {
        let h = make_harness();
        let pipeline = make_pipeline(vec![
            make_job("a", vec!["b"], "true"),
            make_job("b", vec!["a"], "true"),
        ]);

        let err = h.scheduler.run(&pipeline, trigger()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPipeline(_)));
        assert!(h.runner.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_independent_jobs_have_no_imposed_order() {
        let h = make_harness();
        let pipeline = make_pipeline(vec![
            make_job("lint", vec![], "true"),
            make_job("unit", vec![], "true"),
        ]);

        let run = h.scheduler.run(&pipeline, trigger()).await.unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);

        let order = h.runner.executed.lock().unwrap().clone();
        assert_eq!(order.len(), 2);
        assert!(order.contains(&"lint".to_string()));
        assert!(order.contains(&"unit".to_string()));
    }
}
