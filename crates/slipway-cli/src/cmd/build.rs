use anyhow::Result;
use slipway_core::config::{Build, Config};
use slipway_core::dispatch::{self, ErrorTally};
use std::sync::Arc;
use tracing::{error, info};

use crate::docker::{run_script, DockerCli, ImageBuilder};

pub async fn run(config: &Config) -> Result<i32> {
    let concurrency = config.concurrency();
    info!("running up to {concurrency} builds concurrently");

    let builder: Arc<dyn ImageBuilder> = Arc::new(DockerCli);
    let units: Vec<(String, Build)> = config
        .deployments
        .values()
        .flat_map(|deployment| deployment.builds.clone())
        .collect();

    let errors = dispatch::run(units, concurrency, move |(unit, build), tally| {
        let builder = Arc::clone(&builder);
        async move { build_unit(builder.as_ref(), &unit, &build, &tally).await }
    })
    .await;

    if errors > 0 {
        error!("exiting with errors");
        return Ok(1);
    }
    Ok(0)
}

/// Build (or script-build) one image and push its tags. Push failures are
/// tallied per tag but do not stop the remaining pushes.
async fn build_unit(builder: &dyn ImageBuilder, unit: &str, build: &Build, tally: &ErrorTally) {
    info!("[{unit}] starting build");

    if let Some(script) = build.script.as_deref().filter(|s| !s.is_empty()) {
        info!("[{unit}] running build script: {script}");
        if let Err(err) = run_script(unit, script).await {
            error!("[{unit}] build script {script} failed: {err}");
            tally.record();
            return;
        }
        info!("[{unit}] completed build and push process");
        return;
    }

    let tags = build.image_tags();
    if let Err(err) = builder.build_image(unit, build, &tags).await {
        error!("[{unit}] failed building image: {err}");
        tally.record();
        return;
    }
    info!("[{unit}] finished build");

    if build.push {
        for tag in &tags {
            info!("[{unit}] pushing tag: {tag}");
            if let Err(err) = builder.push_image(unit, tag).await {
                error!("[{unit}] failed pushing tag {tag}, did you log in? ({err})");
                tally.record();
            }
        }
    }

    info!("[{unit}] completed build and push process");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
