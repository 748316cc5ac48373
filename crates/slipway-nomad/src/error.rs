use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid cluster address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("cluster returned an empty job id from parse:\n  {body}")]
    EmptyJobId { body: String },
}

#[derive(Debug, Error)]
pub enum MonitorError {
    /// The cluster registered a non-batch job without an evaluation id.
    #[error("job update of type '{job_type}' returned no evaluation id")]
    MissingEvaluationId { job_type: String },

    /// The rollout reached a terminal status other than successful.
    #[error("deployment unsuccessful: {status}")]
    Unsuccessful { status: String },

    #[error(transparent)]
    Client(#[from] ClientError),
}
