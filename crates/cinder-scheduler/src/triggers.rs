//! Trigger matching and evaluation.

use cinder_core::pipeline::{Pipeline, TriggerKind, TriggerRule};
use tracing::debug;

/// Incoming event from the hosting platform's delivery mechanism.
#[derive(Debug, Clone)]
pub struct EventDescriptor {
    pub kind: TriggerKind,
    /// Full ref (`refs/heads/main`, `refs/tags/v1.0.0`) or short name.
    /// For pull requests this is the target branch.
    pub git_ref: String,
}

impl EventDescriptor {
    pub fn new(kind: TriggerKind, git_ref: impl Into<String>) -> Self {
        Self {
            kind,
            git_ref: git_ref.into(),
        }
    }

    /// The branch or tag name without the `refs/...` prefix.
    fn short_ref(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .or_else(|| self.git_ref.strip_prefix("refs/tags/"))
            .unwrap_or(&self.git_ref)
    }
}

/// Maps an event to at most one pipeline.
///
/// Pipelines are checked in registration order and each pipeline's rules
/// in declaration order; the first matching rule wins. The evaluator never
/// assumes rules are mutually exclusive — later matches are simply
/// ignored. No match is an ordinary outcome, not an error.
pub struct TriggerEvaluator {
    pipelines: Vec<Pipeline>,
}

impl TriggerEvaluator {
    pub fn new(pipelines: Vec<Pipeline>) -> Self {
        Self { pipelines }
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    /// Select the pipeline the event should trigger, if any.
    pub fn evaluate(&self, event: &EventDescriptor) -> Option<&Pipeline> {
        for pipeline in &self.pipelines {
            for rule in &pipeline.definition.triggers {
                if self.rule_matches(rule, event) {
                    debug!(pipeline = %pipeline.name, git_ref = %event.git_ref, "Trigger matched");
                    return Some(pipeline);
                }
            }
        }
        None
    }

    fn rule_matches(&self, rule: &TriggerRule, event: &EventDescriptor) -> bool {
        if rule.on != event.kind {
            return false;
        }
        match event.kind {
            TriggerKind::BranchPush | TriggerKind::PullRequest => {
                self.branch_matches(&rule.branches, event.short_ref())
            }
            TriggerKind::TagPush => self.tag_matches(&rule.tags, event.short_ref()),
        }
    }

    fn branch_matches(&self, patterns: &[String], branch: &str) -> bool {
        if patterns.is_empty() {
            return true; // Match all branches if no patterns specified
        }
        patterns.iter().any(|p| self.glob_match(p, branch))
    }

    fn tag_matches(&self, patterns: &[String], tag: &str) -> bool {
        if patterns.is_empty() {
            return false; // Don't match tags unless explicitly specified
        }
        patterns.iter().any(|p| self.glob_match(p, tag))
    }

    fn glob_match(&self, pattern: &str, text: &str) -> bool {
        if pattern == "*" || pattern == "**" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix("/**") {
            return text.starts_with(prefix);
        }
        if let Some(prefix) = pattern.strip_suffix("/*") {
            let prefix_slash = format!("{}/", prefix);
            if text.starts_with(&prefix_slash) {
                return !text[prefix_slash.len()..].contains('/');
            }
            return false;
        }
        if pattern.contains('*') {
            let parts: Vec<&str> = pattern.split('*').collect();
            if parts.len() == 2 {
                return text.starts_with(parts[0]) && text.ends_with(parts[1]);
            }
        }
        pattern == text
    }
}
