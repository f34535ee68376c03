//! CLI command definitions.

use clap::{Subcommand, ValueEnum};
use cinder_core::pipeline::TriggerKind;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a pipeline configuration
    Validate {
        /// Path to pipeline file
        #[arg(default_value = "cinder.yaml")]
        path: String,
    },

    /// Feed an event through trigger evaluation and run the matched pipeline
    Trigger {
        /// Event kind
        #[arg(short, long, value_enum)]
        kind: EventKind,

        /// Git ref of the event (e.g. refs/heads/main, refs/tags/v1.0.0)
        #[arg(short = 'r', long = "ref")]
        git_ref: String,

        /// Pipeline files to evaluate, in priority order
        #[arg(default_value = "cinder.yaml")]
        paths: Vec<String>,
    },

    /// Run a pipeline file directly, bypassing trigger evaluation
    Run {
        /// Path to pipeline file
        #[arg(default_value = "cinder.yaml")]
        path: String,

        /// Git ref to expose to the run
        #[arg(short = 'r', long = "ref", default_value = "refs/heads/main")]
        git_ref: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EventKind {
    BranchPush,
    TagPush,
    PullRequest,
}

impl From<EventKind> for TriggerKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::BranchPush => TriggerKind::BranchPush,
            EventKind::TagPush => TriggerKind::TagPush,
            EventKind::PullRequest => TriggerKind::PullRequest,
        }
    }
}
