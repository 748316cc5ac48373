mod cmd;
mod docker;

use clap::{Parser, Subcommand};
use slipway_core::config::{Config, CONFIG_FILE};
use std::path::Path;

#[derive(Parser)]
#[command(
    name = "slipway",
    about = "Build container images and deploy versioned jobs to a Nomad cluster",
    version,
    propagate_version = true
)]
struct Cli {
    /// Enable verbose output
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (and optionally push) every configured image
    Build,

    /// Deploy every configured job and monitor each rollout to completion
    Deploy {
        /// Environment configuration to target
        #[arg(long)]
        env: String,
    },

    /// Stop every configured job on the cluster
    Destroy {
        /// Environment configuration to target
        #[arg(long)]
        env: String,

        /// Garbage-collect the jobs immediately
        #[arg(long)]
        purge: bool,

        /// Skip the interactive confirmation
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let config = match Config::load(Path::new(CONFIG_FILE)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Build => cmd::build::run(&config).await,
        Commands::Deploy { env } => cmd::deploy::run(&config, &env).await,
        Commands::Destroy { env, purge, force } => {
            cmd::destroy::run(&config, &env, purge, force).await
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
