//! DAG resolution for pipeline jobs.

use cinder_core::pipeline::{JobDefinition, PipelineDefinition};
use cinder_core::run::JobStatus;
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Configuration errors, fatal at load time. No run is ever created from
/// a definition that fails graph construction.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Cycle detected in job dependencies")]
    CycleDetected,
    #[error("Job '{job}' depends on unknown job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },
    #[error("Duplicate job name: {0}")]
    DuplicateJob(String),
    #[error("Empty pipeline")]
    EmptyPipeline,
}

/// A node in the job graph.
#[derive(Debug, Clone)]
pub struct JobNode {
    pub name: String,
    pub definition: JobDefinition,
}

/// Directed acyclic graph over a pipeline's jobs.
#[derive(Debug)]
pub struct JobGraph {
    graph: DiGraph<JobNode, ()>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl JobGraph {
    /// Get the root jobs (jobs with no dependencies).
    pub fn roots(&self) -> Vec<&JobNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count()
                    == 0
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Get all jobs.
    pub fn jobs(&self) -> Vec<&JobNode> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Jobs that are pending and whose entire `needs` set has succeeded.
    ///
    /// This is the fan-out/fan-in core: every returned job may be
    /// dispatched concurrently, and a job with several dependencies shows
    /// up only once the last of them succeeds.
    pub fn ready(&self, statuses: &HashMap<String, JobStatus>) -> Vec<&JobNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                let node = &self.graph[idx];
                if statuses.get(&node.name) != Some(&JobStatus::Pending) {
                    return false;
                }
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .all(|dep| statuses.get(&self.graph[dep].name) == Some(&JobStatus::Succeeded))
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Names of every job that transitively depends on `job_name`.
    pub fn dependents_transitive(&self, job_name: &str) -> Vec<String> {
        let Some(&start) = self.name_to_index.get(job_name) else {
            return Vec::new();
        };

        let mut seen = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if seen.insert(next, ()).is_none() {
                    queue.push_back(next);
                }
            }
        }

        seen.keys().map(|&idx| self.graph[idx].name.clone()).collect()
    }

    /// Get topologically sorted jobs.
    pub fn topological_order(&self) -> Result<Vec<&JobNode>, GraphError> {
        toposort(&self.graph, None)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx))
                    .collect()
            })
            .map_err(|_| GraphError::CycleDetected)
    }
}

/// Builder for constructing job graphs.
pub struct GraphBuilder;

impl GraphBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a validated graph from a pipeline definition.
    pub fn build(&self, pipeline: &PipelineDefinition) -> Result<JobGraph, GraphError> {
        if pipeline.jobs.is_empty() {
            return Err(GraphError::EmptyPipeline);
        }

        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for job in &pipeline.jobs {
            if name_to_index.contains_key(&job.name) {
                return Err(GraphError::DuplicateJob(job.name.clone()));
            }
            let node = JobNode {
                name: job.name.clone(),
                definition: job.clone(),
            };
            let idx = graph.add_node(node);
            name_to_index.insert(job.name.clone(), idx);
        }

        for job in &pipeline.jobs {
            let job_idx = name_to_index[&job.name];
            for dep in &job.needs {
                let dep_idx =
                    name_to_index
                        .get(dep)
                        .ok_or_else(|| GraphError::UnknownDependency {
                            job: job.name.clone(),
                            dependency: dep.clone(),
                        })?;
                graph.add_edge(*dep_idx, job_idx, ());
            }
        }

        let dag = JobGraph {
            graph,
            name_to_index,
        };

        // Verify no cycles
        dag.topological_order()?;

        Ok(dag)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
