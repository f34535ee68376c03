//! Shell-based step execution on the host.

use crate::runner::{OutputLine, OutputStream, RunnerConfig, StepContext, StepResult, StepRunner};
use async_trait::async_trait;
use cinder_core::Result;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

/// Shell runner for executing step commands on the host.
pub struct ShellRunner {
    config: RunnerConfig,
}

impl ShellRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

#[async_trait]
impl StepRunner for ShellRunner {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let start = std::time::Instant::now();
        let command = &ctx.step.run;

        let workdir = ctx
            .step
            .working_directory
            .as_ref()
            .map(|d| ctx.workspace.join(d))
            .unwrap_or_else(|| ctx.workspace.clone());

        info!(command = %command, workspace = %workdir.display(), "Executing shell command");

        // Build environment: process env, then job-level, then step-level.
        let mut env_vars: HashMap<String, String> = std::env::vars().collect();
        env_vars.extend(ctx.variables.clone());
        env_vars.extend(ctx.step.variables.clone());

        let mut child = Command::new(&ctx.step.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&workdir)
            .envs(&env_vars)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                cinder_core::Error::Internal(format!("Failed to spawn process: {}", e))
            })?;

        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();

        // Stream stdout
        let stdout_tx = output_tx.clone();
        let stdout_handle = tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            let mut line_num = 0u32;

            while let Ok(Some(line)) = lines.next_line().await {
                line_num += 1;
                let output = OutputLine {
                    stream: OutputStream::Stdout,
                    content: line,
                    line_number: line_num,
                    timestamp: chrono::Utc::now(),
                };
                if stdout_tx.send(output).await.is_err() {
                    break;
                }
            }
        });

        // Stream stderr
        let stderr_tx = output_tx;
        let stderr_handle = tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            let mut line_num = 0u32;

            while let Ok(Some(line)) = lines.next_line().await {
                line_num += 1;
                let output = OutputLine {
                    stream: OutputStream::Stderr,
                    content: line,
                    line_number: line_num,
                    timestamp: chrono::Utc::now(),
                };
                if stderr_tx.send(output).await.is_err() {
                    break;
                }
            }
        });

        // Wait for the process with optional timeout
        let wait_result = if let Some(timeout_secs) = self.config.timeout_seconds {
            match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_secs, "Command timed out, killing process");
                    let _ = child.kill().await;
                    return Err(cinder_core::Error::Internal(
                        "Command timed out".to_string(),
                    ));
                }
            }
        } else {
            child.wait().await
        };

        // Wait for output streaming to complete
        let _ = stdout_handle.await;
        let _ = stderr_handle.await;

        let status = wait_result.map_err(|e| {
            cinder_core::Error::Internal(format!("Failed to wait for process: {}", e))
        })?;

        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(exit_code, duration_ms, "Command completed");

        Ok(StepResult {
            exit_code,
            success: exit_code == 0,
            duration_ms,
        })
    }
}
