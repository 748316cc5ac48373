//! Job-lifecycle monitor: drive one submitted job to a terminal outcome.
//!
//! The flow for a unit is a straight line through three phases:
//!
//! ```text
//! register_job ──► read_job ──► (no eval id?) ──► batch: done
//!                                   │               service: protocol error
//!                                   ▼
//!                           await_evaluation   (fixed-interval poll)
//!                                   ▼
//!                           watch_deployment   (load-adaptive poll)
//!                                   ▼
//!                  successful ──► Outcome::Deployed
//!                  anything else ──► MonitorError::Unsuccessful
//! ```
//!
//! Any client failure at any phase is fatal to the unit being monitored;
//! retry, where configured, lives inside the client and never here.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::client::NomadClient;
use crate::error::MonitorError;
use crate::types::{HealthSummary, ParsedJob};

// ---------------------------------------------------------------------------
// PollPolicy
// ---------------------------------------------------------------------------

/// Polling intervals for the monitor, chosen from the rollout's aggregate
/// allocation health. Injected rather than ambient so tests can shrink the
/// waits to microseconds.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Between evaluation-status reads.
    pub evaluation: Duration,
    /// Every desired allocation is healthy; the terminal status should
    /// arrive shortly.
    pub converged: Duration,
    /// Some allocations are healthy, more are coming up.
    pub progressing: Duration,
    /// Nothing is healthy yet; poll slowly instead of hammering the API.
    pub stalled: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            evaluation: Duration::from_millis(500),
            converged: Duration::from_millis(500),
            progressing: Duration::from_secs(1),
            stalled: Duration::from_secs(5),
        }
    }
}

impl PollPolicy {
    fn health_interval(&self, health: &HealthSummary) -> Duration {
        if health.healthy == health.desired {
            self.converged
        } else if health.healthy > 0 {
            self.progressing
        } else {
            self.stalled
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal success states of a monitored unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The rollout reached terminal status `successful`.
    Deployed,
    /// A batch job was registered without an evaluation. Batch jobs may
    /// finish before any evaluation exists, so there is nothing to watch.
    BatchAccepted,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct Monitor<'a> {
    client: &'a dyn NomadClient,
    policy: &'a PollPolicy,
    unit: &'a str,
}

impl<'a> Monitor<'a> {
    pub fn new(client: &'a dyn NomadClient, policy: &'a PollPolicy, unit: &'a str) -> Self {
        Self {
            client,
            policy,
            unit,
        }
    }

    /// Register `job` and follow it to a terminal outcome.
    pub async fn run(&self, job: &ParsedJob) -> Result<Outcome, MonitorError> {
        let registration = self.client.register_job(job).await?;
        info!("[{}] job submitted", self.unit);

        let submitted = self.client.read_job(&job.id).await?;
        let Some(eval_id) = registration.eval_id() else {
            if submitted.is_batch() {
                return Ok(Outcome::BatchAccepted);
            }
            return Err(MonitorError::MissingEvaluationId {
                job_type: submitted.job_type,
            });
        };

        info!("[{}] monitoring deployment for success", self.unit);
        self.await_evaluation(eval_id).await?;
        self.watch_deployment(&job.id).await
    }

    /// Poll the evaluation at a fixed interval until it completes.
    async fn await_evaluation(&self, eval_id: &str) -> Result<(), MonitorError> {
        loop {
            let evaluation = self.client.read_evaluation(eval_id).await?;
            debug!("[{}] evaluation status: {}", self.unit, evaluation.status);
            if evaluation.is_complete() {
                return Ok(());
            }
            sleep(self.policy.evaluation).await;
        }
    }

    /// Poll the job's latest deployment until it leaves `running`, pacing
    /// each wait by the aggregate allocation health.
    async fn watch_deployment(&self, job_id: &str) -> Result<Outcome, MonitorError> {
        let mut deployment = self.client.latest_deployment(job_id).await?;

        while deployment.is_running() {
            let health = deployment.health();
            debug!(
                "[{}] deployment is: {} (healthy: {}, unhealthy: {}, desired: {})",
                self.unit,
                deployment.describe_status(),
                health.healthy,
                health.unhealthy,
                health.desired,
            );
            sleep(self.policy.health_interval(&health)).await;
            deployment = self.client.read_deployment(&deployment.id).await?;
        }

        if deployment.is_successful() {
            info!("[{}] deployment successful", self.unit);
            Ok(Outcome::Deployed)
        } else {
            Err(MonitorError::Unsuccessful {
                status: deployment.describe_status().to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
