//! End-to-end pipeline flow tests: trigger evaluation, fan-out builds,
//! artifact brokering, and fan-in release publishing over real shell steps.

use async_trait::async_trait;
use cinder_artifacts::{ArtifactStore, MemoryBlobStore};
use cinder_core::Result;
use cinder_core::bus::MemoryEventBus;
use cinder_core::pipeline::{
    ArtifactBinding, JobDefinition, Pipeline, PipelineDefinition, Platform, ReleaseSpec,
    StepDefinition, TriggerKind, TriggerRule,
};
use cinder_core::ports::ReleaseHost;
use cinder_core::run::{JobStatus, RunStatus, TriggerInfo};
use cinder_release::ReleasePublisher;
use cinder_runner::{JobExecutor, ShellRunner};
use cinder_scheduler::{EventDescriptor, Scheduler, TriggerEvaluator};
use std::sync::{Arc, Mutex};

/// Release host that captures what it is asked to publish.
#[derive(Default)]
struct CapturingHost {
    releases: Mutex<Vec<(String, Vec<(String, Vec<u8>)>)>>,
}

#[async_trait]
impl ReleaseHost for CapturingHost {
    async fn create_release(&self, tag: &str, artifacts: &[(String, Vec<u8>)]) -> Result<()> {
        self.releases
            .lock()
            .unwrap()
            .push((tag.to_string(), artifacts.to_vec()));
        Ok(())
    }
}

fn step(name: &str, run: &str) -> StepDefinition {
    StepDefinition {
        name: name.to_string(),
        run: run.to_string(),
        shell: "sh".to_string(),
        working_directory: None,
        variables: Default::default(),
    }
}

fn build_job(platform: &str, command: &str) -> JobDefinition {
    JobDefinition {
        name: format!("build-{}", platform),
        platform: Platform::Linux,
        needs: vec!["test".to_string()],
        steps: vec![step("build", command)],
        produces: vec![ArtifactBinding {
            name: platform.to_string(),
            path: "out.bin".to_string(),
        }],
        consumes: vec![],
        release: None,
        variables: Default::default(),
    }
}

/// The observed topology: one test job fanning out to three platform
/// builds, fanning back into one deploy job that publishes the release.
fn release_pipeline(failing_platform: Option<&str>) -> Pipeline {
    let platforms = ["linux", "macos", "windows"];

    let mut jobs = vec![JobDefinition {
        name: "test".to_string(),
        platform: Platform::Linux,
        needs: vec![],
        steps: vec![step("unit tests", "true")],
        produces: vec![],
        consumes: vec![],
        release: None,
        variables: Default::default(),
    }];

    for platform in platforms {
        let command = if Some(platform) == failing_platform {
            "exit 1".to_string()
        } else {
            format!("printf {} > out.bin", platform)
        };
        jobs.push(build_job(platform, &command));
    }

    jobs.push(JobDefinition {
        name: "deploy".to_string(),
        platform: Platform::Linux,
        needs: platforms.iter().map(|p| format!("build-{}", p)).collect(),
        steps: vec![step("verify artifacts", "ls dist")],
        produces: vec![],
        consumes: platforms
            .iter()
            .map(|p| ArtifactBinding {
                name: p.to_string(),
                path: format!("dist/{}", p),
            })
            .collect(),
        release: Some(ReleaseSpec {
            tag: "v1.0.0".to_string(),
            artifacts: platforms.iter().map(|p| p.to_string()).collect(),
        }),
        variables: Default::default(),
    });

    Pipeline::from_definition(PipelineDefinition {
        version: "1".to_string(),
        name: "release".to_string(),
        description: None,
        triggers: vec![TriggerRule {
            on: TriggerKind::TagPush,
            branches: vec![],
            tags: vec!["v*".to_string()],
        }],
        variables: Default::default(),
        jobs,
    })
}

fn ci_pipeline() -> Pipeline {
    Pipeline::from_definition(PipelineDefinition {
        version: "1".to_string(),
        name: "ci".to_string(),
        description: None,
        triggers: vec![TriggerRule {
            on: TriggerKind::BranchPush,
            branches: vec!["main".to_string()],
            tags: vec![],
        }],
        variables: Default::default(),
        jobs: vec![JobDefinition {
            name: "test".to_string(),
            platform: Platform::Linux,
            needs: vec![],
            steps: vec![step("unit tests", "true")],
            produces: vec![],
            consumes: vec![],
            release: None,
            variables: Default::default(),
        }],
    })
}

struct Flow {
    scheduler: Scheduler,
    host: Arc<CapturingHost>,
    _workspace: tempfile::TempDir,
}

fn make_flow() -> Flow {
    let host = Arc::new(CapturingHost::default());
    let executor = Arc::new(JobExecutor::new(
        Arc::new(ShellRunner::default()),
        Arc::new(ArtifactStore::new(Arc::new(MemoryBlobStore::new()))),
        Arc::new(ReleasePublisher::new(host.clone())),
    ));
    let workspace = tempfile::tempdir().unwrap();
    let scheduler = Scheduler::new(
        executor,
        Arc::new(MemoryEventBus::default()),
        workspace.path().to_path_buf(),
    );
    Flow {
        scheduler,
        host,
        _workspace: workspace,
    }
}

fn tag_trigger() -> TriggerInfo {
    TriggerInfo {
        kind: TriggerKind::TagPush,
        git_ref: "refs/tags/v1.0.0".to_string(),
    }
}

#[tokio::test]
async fn test_event_selects_pipeline_and_run_succeeds() {
    let evaluator = TriggerEvaluator::new(vec![ci_pipeline(), release_pipeline(None)]);

    let event = EventDescriptor::new(TriggerKind::TagPush, "refs/tags/v1.0.0");
    let pipeline = evaluator.evaluate(&event).expect("tag event should match");
    assert_eq!(pipeline.name, "release");

    let flow = make_flow();
    let run = flow.scheduler.run(pipeline, tag_trigger()).await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_unmatched_event_triggers_nothing() {
    let evaluator = TriggerEvaluator::new(vec![ci_pipeline(), release_pipeline(None)]);

    let event = EventDescriptor::new(TriggerKind::BranchPush, "refs/heads/feature/wip");
    assert!(evaluator.evaluate(&event).is_none());
}

#[tokio::test]
async fn test_all_builds_succeed_publishes_release_once() {
    let flow = make_flow();
    let run = flow
        .scheduler
        .run(&release_pipeline(None), tag_trigger())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    for job in &run.jobs {
        assert_eq!(job.status, JobStatus::Succeeded, "{} not green", job.name);
    }

    let releases = flow.host.releases.lock().unwrap();
    assert_eq!(releases.len(), 1);

    let (tag, artifacts) = &releases[0];
    assert_eq!(tag, "v1.0.0");
    assert_eq!(artifacts.len(), 3);

    let linux = artifacts.iter().find(|(n, _)| n == "linux").unwrap();
    assert_eq!(linux.1, b"linux");
}

#[tokio::test]
async fn test_one_failed_build_skips_deploy_and_fails_run() {
    let flow = make_flow();
    let run = flow
        .scheduler
        .run(&release_pipeline(Some("macos")), tag_trigger())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.job("test").unwrap().status, JobStatus::Succeeded);
    assert_eq!(run.job("build-macos").unwrap().status, JobStatus::Failed);
    assert_eq!(run.job("build-linux").unwrap().status, JobStatus::Succeeded);
    assert_eq!(run.job("build-windows").unwrap().status, JobStatus::Succeeded);
    assert_eq!(run.job("deploy").unwrap().status, JobStatus::Skipped);

    // The release is never partially created.
    assert!(flow.host.releases.lock().unwrap().is_empty());
}
