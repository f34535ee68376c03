//! Core runner trait and types.

use async_trait::async_trait;
use cinder_core::Result;
use cinder_core::pipeline::StepDefinition;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Output line from step execution.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub content: String,
    pub line_number: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Output stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Result of step execution.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub exit_code: i32,
    pub success: bool,
    pub duration_ms: u64,
}

/// Context for step execution.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub workspace: PathBuf,
    pub variables: HashMap<String, String>,
    pub step: StepDefinition,
}

/// Trait for step execution.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Execute a step, streaming output to the provided channel.
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult>;
}

/// Configuration for step execution.
///
/// There is deliberately no retry knob: a failed step is terminal and a
/// job is only re-run by a new triggering event.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub timeout_seconds: Option<u64>,
}
