//! Command handlers for the local pipeline surface.

use crate::commands::EventKind;
use anyhow::Context;
use cinder_artifacts::{ArtifactStore, MemoryBlobStore};
use cinder_core::bus::MemoryEventBus;
use cinder_core::pipeline::{Pipeline, PipelineDefinition};
use cinder_core::run::{JobStatus, Run, RunStatus, TriggerInfo};
use cinder_release::{FsReleaseHost, ReleasePublisher};
use cinder_runner::{JobExecutor, ShellRunner};
use cinder_scheduler::{EventDescriptor, GraphBuilder, Scheduler, TriggerEvaluator};
use clap::ValueEnum;
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Load and parse a pipeline file.
fn load_pipeline(path: &Path) -> anyhow::Result<Pipeline> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading pipeline file {}", path.display()))?;
    let definition: PipelineDefinition = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing pipeline file {}", path.display()))?;
    Ok(Pipeline::from_definition(definition))
}

/// Validate a pipeline file: parse, then build the job graph so cyclic or
/// dangling definitions fail here instead of at run time.
pub fn validate(path: &str) -> anyhow::Result<bool> {
    let pipeline = load_pipeline(Path::new(path))?;

    match GraphBuilder::new().build(&pipeline.definition) {
        Ok(graph) => {
            println!(
                "{} {} is valid ({} jobs, {} roots)",
                style("✓").green().bold(),
                path,
                graph.len(),
                graph.roots().len()
            );
            Ok(true)
        }
        Err(e) => {
            println!("{} {}: {}", style("✗").red().bold(), path, e);
            Ok(false)
        }
    }
}

/// Evaluate an event against the given pipeline files and run the first
/// match, if any.
pub async fn trigger(kind: EventKind, git_ref: &str, paths: &[String]) -> anyhow::Result<bool> {
    let pipelines = paths
        .iter()
        .map(|p| load_pipeline(Path::new(p)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let evaluator = TriggerEvaluator::new(pipelines);
    let event = EventDescriptor::new(kind.into(), git_ref);

    let Some(pipeline) = evaluator.evaluate(&event) else {
        let kind_name = kind
            .to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default();
        println!(
            "{} No pipeline matches {} on {}",
            style("∅").dim(),
            kind_name,
            git_ref
        );
        return Ok(true);
    };

    let trigger_info = TriggerInfo {
        kind: kind.into(),
        git_ref: git_ref.to_string(),
    };
    execute(pipeline, trigger_info).await
}

/// Run a pipeline file directly as if a branch push had selected it.
pub async fn run(path: &str, git_ref: &str) -> anyhow::Result<bool> {
    let pipeline = load_pipeline(Path::new(path))?;
    let trigger_info = TriggerInfo {
        kind: cinder_core::pipeline::TriggerKind::BranchPush,
        git_ref: git_ref.to_string(),
    };
    execute(&pipeline, trigger_info).await
}

async fn execute(pipeline: &Pipeline, trigger_info: TriggerInfo) -> anyhow::Result<bool> {
    let work_root = PathBuf::from(".cinder");

    let executor = Arc::new(JobExecutor::new(
        Arc::new(ShellRunner::default()),
        Arc::new(ArtifactStore::new(Arc::new(MemoryBlobStore::new()))),
        Arc::new(ReleasePublisher::new(Arc::new(FsReleaseHost::new(
            work_root.join("releases"),
        )))),
    ));

    let scheduler = Scheduler::new(
        executor,
        Arc::new(MemoryEventBus::default()),
        work_root.join("runs"),
    );

    println!(
        "\n{} Running pipeline: {} ({} jobs)\n",
        style("▶").cyan().bold(),
        style(&pipeline.name).bold(),
        pipeline.definition.jobs.len()
    );

    let run = scheduler.run(pipeline, trigger_info).await?;
    print_summary(&run);

    Ok(run.status == RunStatus::Succeeded)
}

fn print_summary(run: &Run) {
    println!();
    for job in &run.jobs {
        let (mark, label) = match job.status {
            JobStatus::Succeeded => (style("✓").green(), style("succeeded").green()),
            JobStatus::Failed => (style("✗").red(), style("failed").red()),
            JobStatus::Skipped => (style("⊘").yellow(), style("skipped").yellow()),
            JobStatus::Pending | JobStatus::Running => (style("?").dim(), style("unsettled").dim()),
        };

        let duration = job
            .duration_ms
            .map(|ms| format!("{:.2}s", ms as f64 / 1000.0))
            .unwrap_or_default();
        let cause = job.error.as_deref().unwrap_or_default();

        println!("  {} {:<16} {:<10} {:>8}  {}", mark, job.name, label, duration, cause);
    }

    println!();
    match run.status {
        RunStatus::Succeeded => println!(
            "{} Run {} succeeded in {:.2}s",
            style("✓").green().bold(),
            run.id,
            run.duration_ms.unwrap_or(0) as f64 / 1000.0
        ),
        RunStatus::Failed => println!(
            "{} Run {} failed after {:.2}s",
            style("✗").red().bold(),
            run.id,
            run.duration_ms.unwrap_or(0) as f64 / 1000.0
        ),
        RunStatus::Running => {}
    }
}
