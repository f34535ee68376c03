//! Cinder CI Scheduler
//!
//! Maps events to pipelines, validates job graphs at load time, and
//! drives runs to completion with fan-out dispatch and fail-propagating
//! skip semantics.

pub mod dag;
pub mod scheduler;
pub mod triggers;

pub use dag::{GraphBuilder, GraphError, JobGraph, JobNode};
pub use scheduler::Scheduler;
pub use triggers::{EventDescriptor, TriggerEvaluator};
