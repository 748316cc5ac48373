use anyhow::Result;
use slipway_core::config::{Config, Deployment};
use slipway_core::dispatch;
use slipway_core::render::GroupSizes;
use slipway_nomad::{HttpNomadClient, Monitor, NomadClient, Outcome, ParsedJob, PollPolicy, RetryPolicy};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{load_template, render_unit, warn_if_production, UnitContext};

pub async fn run(config: &Config, env_name: &str) -> Result<i32> {
    let environment = config.environment(env_name)?;
    warn_if_production(env_name);

    let client = HttpNomadClient::new(
        &environment.nomad_url,
        RetryPolicy::new(environment.retry_attempts),
    )?;
    let client: Arc<dyn NomadClient> = Arc::new(client);
    let policy = Arc::new(PollPolicy::default());
    let context = Arc::new(UnitContext {
        project: config.name.clone(),
        environment: environment.clone(),
    });

    let units: Vec<(String, Deployment)> = config.deployments.clone().into_iter().collect();

    let errors = dispatch::run(units, config.concurrency(), move |(unit, deployment), tally| {
        let client = Arc::clone(&client);
        let policy = Arc::clone(&policy);
        let context = Arc::clone(&context);
        async move {
            if let Err(err) =
                deploy_unit(client.as_ref(), &policy, &context, &unit, &deployment).await
            {
                error!("[{unit}] {err:#}");
                tally.record();
            }
        }
    })
    .await;

    if errors > 0 {
        error!("exiting with errors");
        return Ok(1);
    }
    Ok(0)
}

async fn deploy_unit(
    client: &dyn NomadClient,
    policy: &PollPolicy,
    context: &UnitContext,
    unit: &str,
    deployment: &Deployment,
) -> Result<()> {
    info!("[{unit}] starting deployment");

    let job_name = deployment.job_name(&context.project, unit);
    let template_path = deployment.template_path(&job_name);
    debug!("[{unit}] loading job template: {}", template_path.display());
    let template = load_template(&template_path)?;

    let job = resolve_job(client, context, unit, deployment, &template).await?;

    match Monitor::new(client, policy, unit).run(&job).await? {
        Outcome::Deployed => {}
        Outcome::BatchAccepted => {
            debug!("[{unit}] batch job registered without an evaluation; nothing to monitor");
        }
    }
    Ok(())
}

/// Two-pass render pipeline.
///
/// Parsing needs a fully rendered template, but rendering group sizes needs
/// the canonical job id. So the first pass renders sizeless purely to
/// obtain the id, the cluster is asked for that job's current group sizes,
/// and the second pass renders the document that is actually submitted.
/// This keeps a redeploy from scaling a running job back down to its
/// hint/default counts.
async fn resolve_job(
    client: &dyn NomadClient,
    context: &UnitContext,
    unit: &str,
    deployment: &Deployment,
    template: &str,
) -> Result<ParsedJob> {
    let sizeless = render_unit(template, context, unit, deployment, &GroupSizes::new())?;
    let probe = client.parse_job(&sizeless).await?;

    // A job that has never been deployed has no sizes to preserve.
    let sizes = match client.read_job(&probe.id).await {
        Ok(job) => job.group_sizes(),
        Err(err) => {
            debug!("[{unit}] no existing job '{}': {err}", probe.id);
            GroupSizes::new()
        }
    };

    let rendered = render_unit(template, context, unit, deployment, &sizes)?;
    debug!("[{unit}] rendered job specification:\n{rendered}");
    Ok(client.parse_job(&rendered).await?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
