use anyhow::Result;
use slipway_core::config::{Config, Deployment};
use slipway_core::dispatch;
use slipway_core::render::GroupSizes;
use slipway_nomad::{HttpNomadClient, NomadClient, RetryPolicy};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{load_template, render_unit, warn_if_production, UnitContext};

pub async fn run(config: &Config, env_name: &str, purge: bool, force: bool) -> Result<i32> {
    let environment = config.environment(env_name)?;
    warn_if_production(env_name);

    if !force && !confirm()? {
        return Ok(0);
    }

    let client = HttpNomadClient::new(
        &environment.nomad_url,
        RetryPolicy::new(environment.retry_attempts),
    )?;
    let client: Arc<dyn NomadClient> = Arc::new(client);
    let context = Arc::new(UnitContext {
        project: config.name.clone(),
        environment: environment.clone(),
    });

    let units: Vec<(String, Deployment)> = config.deployments.clone().into_iter().collect();

    let errors = dispatch::run(units, config.concurrency(), move |(unit, deployment), tally| {
        let client = Arc::clone(&client);
        let context = Arc::clone(&context);
        async move {
            if let Err(err) =
                destroy_unit(client.as_ref(), &context, &unit, &deployment, purge).await
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

/// Ask before destroying anything; only an explicit `Y`/`y` proceeds.
fn confirm() -> Result<bool> {
    print!("Are you sure? [Y|n] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "Y" | "y"))
}

async fn destroy_unit(
    client: &dyn NomadClient,
    context: &UnitContext,
    unit: &str,
    deployment: &Deployment,
    purge: bool,
) -> Result<()> {
    info!("[{unit}] starting destruction");

    let job_name = deployment.job_name(&context.project, unit);

    // Render with the job's live sizes so the parsed spec matches what is
    // running; a job the cluster no longer knows still parses with defaults.
    let sizes = match client.read_job(&job_name).await {
        Ok(job) => job.group_sizes(),
        Err(err) => {
            debug!("[{unit}] unable to read job '{job_name}': {err}");
            GroupSizes::new()
        }
    };

    let template = load_template(&deployment.template_path(&job_name))?;
    let rendered = render_unit(&template, context, unit, deployment, &sizes)?;
    let parsed = client.parse_job(&rendered).await?;

    info!("[{unit}] stopping job: {}", parsed.id);
    client.stop_job(&parsed.id, purge).await?;
    info!("[{unit}] successfully stopped job: {}", parsed.id);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
