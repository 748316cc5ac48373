//! Thin wrapper around the `docker` CLI (and build scripts).
//!
//! Build and push are subprocess invocations; output is echoed line-by-line
//! at debug level with the owning unit's prefix so interleaved concurrent
//! builds stay readable.

use async_trait::async_trait;
use slipway_core::config::Build;
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DockerError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {status}")]
    Failed { program: String, status: ExitStatus },
}

// ---------------------------------------------------------------------------
// ImageBuilder
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build the image for `unit`, tagging it with every entry of `tags`.
    async fn build_image(&self, unit: &str, build: &Build, tags: &[String])
        -> Result<(), DockerError>;

    /// Push one full image reference.
    async fn push_image(&self, unit: &str, image: &str) -> Result<(), DockerError>;
}

/// Production implementation shelling out to the `docker` binary.
pub struct DockerCli;

#[async_trait]
impl ImageBuilder for DockerCli {
    async fn build_image(
        &self,
        unit: &str,
        build: &Build,
        tags: &[String],
    ) -> Result<(), DockerError> {
        let args = build_args(build, tags);
        debug!("[{unit}]    docker args: {args:?}");
        run_logged(unit, "docker", &args).await
    }

    async fn push_image(&self, unit: &str, image: &str) -> Result<(), DockerError> {
        run_logged(unit, "docker", &["push".to_string(), image.to_string()]).await
    }
}

/// Run a configured build script through `bash` instead of `docker build`.
pub async fn run_script(unit: &str, script: &str) -> Result<(), DockerError> {
    run_logged(unit, "bash", &[script.to_string()]).await
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

fn build_args(build: &Build, tags: &[String]) -> Vec<String> {
    let mut args = vec!["build".to_string()];

    if let Some(target) = build.target.as_deref().filter(|t| !t.is_empty()) {
        args.push(format!("--target={target}"));
    }
    for tag in tags {
        args.push(format!("--tag={tag}"));
    }
    for (key, value) in &build.build_args {
        args.push(format!("--build-arg={key}={value}"));
    }
    // Seed the layer cache from the most specific tag built last time.
    if let Some(cache_from) = tags.last() {
        args.push(format!("--cache-from={cache_from}"));
    }
    if let Some(file) = build.file.as_deref().filter(|f| !f.is_empty()) {
        args.push(format!("--file={file}"));
    }
    args.push(if build.context.is_empty() {
        ".".to_string()
    } else {
        build.context.clone()
    });

    args
}

async fn run_logged(unit: &str, program: &str, args: &[String]) -> Result<(), DockerError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| DockerError::Spawn {
            program: program.to_string(),
            source,
        })?;

    for line in String::from_utf8_lossy(&output.stdout)
        .lines()
        .chain(String::from_utf8_lossy(&output.stderr).lines())
    {
        debug!("[{unit}]    {line}");
    }

    if !output.status.success() {
        return Err(DockerError::Failed {
            program: program.to_string(),
            status: output.status,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
