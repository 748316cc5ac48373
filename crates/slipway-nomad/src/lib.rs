//! `slipway-nomad` — Nomad API client and job-lifecycle monitor.
//!
//! The crate has two layers:
//!
//! ```text
//! NomadClient trait   ← narrow capability surface: parse / register /
//!     │                 read job / read evaluation / read deployment / stop
//!     ▼
//! HttpNomadClient     ← reqwest against the cluster's v1 HTTP API, each
//!     │                 call behind a bounded-attempt RetryPolicy
//!     ▼
//! Monitor             ← drives one submitted job through registration,
//!                       evaluation, and rollout-health polling to a
//!                       terminal outcome
//! ```
//!
//! Commands talk to `&dyn NomadClient`, so tests drive the monitor with a
//! scripted in-memory client instead of a cluster.

pub mod client;
pub mod error;
pub mod monitor;
pub mod retry;
pub mod types;

pub use client::{HttpNomadClient, NomadClient};
pub use error::{ClientError, MonitorError};
pub use monitor::{Monitor, Outcome, PollPolicy};
pub use retry::RetryPolicy;
pub use types::{Deployment, Evaluation, Job, ParsedJob, Registration, TaskGroup, TaskGroupHealth};
