//! Typed records for the slice of the Nomad v1 API slipway consumes.
//!
//! Statuses are kept as wire strings (the cluster may introduce values we
//! have never seen); the predicates below name the ones slipway acts on.

use serde::Deserialize;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// ParsedJob
// ---------------------------------------------------------------------------

/// Result of parsing a rendered template: the canonical job id plus the
/// cluster-native job document.
///
/// This is the intermediate artifact of the two-pass render pipeline: the
/// id from pass 1 keys the live group-size lookup that pass 2 depends on.
/// The document itself is opaque to slipway: it is produced by the cluster's
/// parse endpoint and passed back verbatim on registration, never inspected.
#[derive(Debug, Clone)]
pub struct ParsedJob {
    /// Canonical job id. Non-empty; an empty id fails the parse call.
    pub id: String,
    pub document: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(rename = "Type")]
    pub job_type: String,
    pub task_groups: Vec<TaskGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TaskGroup {
    pub name: String,
    pub count: u64,
}

impl Job {
    /// Batch jobs are fire-and-forget: they may finish before any
    /// evaluation exists, so registration without an evaluation id is fine.
    pub fn is_batch(&self) -> bool {
        self.job_type == "batch"
    }

    /// Current instance count per task group.
    pub fn group_sizes(&self) -> HashMap<String, u64> {
        self.task_groups
            .iter()
            .map(|g| (g.name.clone(), g.count))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Response to registering (submitting) a job.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Registration {
    #[serde(rename = "EvalID")]
    pub eval_id: String,
    pub eval_create_index: u64,
    pub job_modify_index: u64,
}

impl Registration {
    /// The evaluation id, if the cluster created one.
    pub fn eval_id(&self) -> Option<&str> {
        if self.eval_id.is_empty() {
            None
        } else {
            Some(&self.eval_id)
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Evaluation {
    #[serde(rename = "ID")]
    pub id: String,
    pub status: String,
    pub status_description: String,
}

impl Evaluation {
    /// `complete` is terminal; once observed, polling stops.
    pub fn is_complete(&self) -> bool {
        self.status == "complete"
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Deployment {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    pub status: String,
    pub status_description: String,
    pub task_groups: HashMap<String, TaskGroupHealth>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TaskGroupHealth {
    pub desired_total: u64,
    pub placed_allocs: u64,
    pub healthy_allocs: u64,
    pub unhealthy_allocs: u64,
}

/// Allocation health aggregated across every task group of a deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSummary {
    pub healthy: u64,
    pub unhealthy: u64,
    pub desired: u64,
}

impl Deployment {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    pub fn is_successful(&self) -> bool {
        self.status == "successful"
    }

    pub fn health(&self) -> HealthSummary {
        let mut summary = HealthSummary::default();
        for group in self.task_groups.values() {
            summary.healthy += group.healthy_allocs;
            summary.unhealthy += group.unhealthy_allocs;
            summary.desired += group.desired_total;
        }
        summary
    }

    /// Human-readable status for reporting; the description when the
    /// cluster supplied one, the raw status otherwise.
    pub fn describe_status(&self) -> &str {
        if self.status_description.is_empty() {
            &self.status
        } else {
            &self.status_description
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
