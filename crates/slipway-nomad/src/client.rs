use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::error::ClientError;
use crate::retry::{self, RetryPolicy};
use crate::types::{Deployment, Evaluation, Job, ParsedJob, Registration};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How much of an unexpected response body is echoed into error messages.
const BODY_EXCERPT: usize = 500;

// ---------------------------------------------------------------------------
// NomadClient
// ---------------------------------------------------------------------------

/// The capability surface the deploy/destroy commands and the lifecycle
/// monitor consume. Kept narrow so tests can script it.
#[async_trait]
pub trait NomadClient: Send + Sync {
    /// Convert a rendered template into a canonical job document and id.
    async fn parse_job(&self, hcl: &str) -> Result<ParsedJob, ClientError>;

    /// Submit (create or update) a parsed job.
    async fn register_job(&self, job: &ParsedJob) -> Result<Registration, ClientError>;

    async fn read_job(&self, id: &str) -> Result<Job, ClientError>;

    async fn read_evaluation(&self, id: &str) -> Result<Evaluation, ClientError>;

    /// The most recent deployment for a job, if any.
    async fn latest_deployment(&self, job_id: &str) -> Result<Deployment, ClientError>;

    async fn read_deployment(&self, id: &str) -> Result<Deployment, ClientError>;

    async fn stop_job(&self, id: &str, purge: bool) -> Result<(), ClientError>;
}

// ---------------------------------------------------------------------------
// HttpNomadClient
// ---------------------------------------------------------------------------

/// reqwest-backed client for the cluster's v1 HTTP API.
///
/// Every call runs behind the configured [`RetryPolicy`]; once the attempt
/// budget is exhausted the last error surfaces to the caller.
pub struct HttpNomadClient {
    address: String,
    retry: RetryPolicy,
    http: reqwest::Client,
}

impl HttpNomadClient {
    pub fn new(address: &str, retry: RetryPolicy) -> Result<Self, ClientError> {
        let address = address.trim_end_matches('/').to_string();
        if address.is_empty() {
            return Err(ClientError::InvalidAddress {
                address,
                reason: "address is empty".to_string(),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            address,
            retry,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path);
        retry::with_attempts(self.retry, || async {
            let response = self.http.get(&url).send().await?.error_for_status()?;
            Ok(response.json::<T>().await?)
        })
        .await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        retry::with_attempts(self.retry, || async {
            let response = self
                .http
                .post(&url)
                .json(body)
                .send()
                .await?
                .error_for_status()?;
            Ok(response.json::<T>().await?)
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let url = self.url(path);
        retry::with_attempts(self.retry, || async {
            self.http.delete(&url).send().await?.error_for_status()?;
            Ok(())
        })
        .await
    }
}

#[derive(Serialize)]
struct ParseJobRequest<'a> {
    #[serde(rename = "Canonicalize")]
    canonicalize: bool,
    #[serde(rename = "JobHCL")]
    job_hcl: &'a str,
}

#[async_trait]
impl NomadClient for HttpNomadClient {
    async fn parse_job(&self, hcl: &str) -> Result<ParsedJob, ClientError> {
        let request = ParseJobRequest {
            canonicalize: true,
            job_hcl: hcl,
        };
        let document: serde_json::Value = self.post_json("/v1/jobs/parse", &request).await?;
        let id = document
            .get("ID")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            return Err(ClientError::EmptyJobId {
                body: excerpt(&document),
            });
        }
        Ok(ParsedJob { id, document })
    }

    async fn register_job(&self, job: &ParsedJob) -> Result<Registration, ClientError> {
        let body = serde_json::json!({ "Job": job.document });
        self.post_json(&format!("/v1/job/{}", job.id), &body).await
    }

    async fn read_job(&self, id: &str) -> Result<Job, ClientError> {
        self.get_json(&format!("/v1/job/{id}")).await
    }

    async fn read_evaluation(&self, id: &str) -> Result<Evaluation, ClientError> {
        self.get_json(&format!("/v1/evaluation/{id}")).await
    }

    async fn latest_deployment(&self, job_id: &str) -> Result<Deployment, ClientError> {
        // The endpoint returns JSON null for a job with no deployments;
        // treat that as an empty record rather than a decode failure.
        let deployment: Option<Deployment> = self
            .get_json(&format!("/v1/job/{job_id}/deployment"))
            .await?;
        Ok(deployment.unwrap_or_default())
    }

    async fn read_deployment(&self, id: &str) -> Result<Deployment, ClientError> {
        self.get_json(&format!("/v1/deployment/{id}")).await
    }

    async fn stop_job(&self, id: &str, purge: bool) -> Result<(), ClientError> {
        self.delete(&format!("/v1/job/{id}?purge={purge}")).await
    }
}

fn excerpt(document: &serde_json::Value) -> String {
    let body = document.to_string();
    if body.chars().count() > BODY_EXCERPT {
        body.chars().take(BODY_EXCERPT).collect()
    } else {
        body
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
