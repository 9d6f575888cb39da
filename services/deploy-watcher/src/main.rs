//! Deploy Watcher CLI
//!
//! Watches service health endpoints after a deployment.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use deploy_watcher::report::{render_plan, render_table};
use deploy_watcher::{load_config, WatcherBuilder};
use tracing::Level;

#[derive(Parser)]
#[command(name = "deploy-watcher")]
#[command(about = "Post-deployment health monitor with alerting and rollback")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log every check result
    #[arg(short, long)]
    verbose: bool,

    /// Check every service once, print a table and exit
    #[arg(long, conflicts_with = "dry_run")]
    once: bool,

    /// Validate the configuration and list the services without checking them
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose {
        args.log_level.max(Level::DEBUG)
    } else {
        args.log_level
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::debug!(
        "Parsed arguments: config={:?}, verbose={}, once={}, dry_run={}, log_level={:?}",
        args.config,
        args.verbose,
        args.once,
        args.dry_run,
        args.log_level
    );

    let config = load_config(&args.config)?;
    let supervisor = WatcherBuilder::new(config).verbose(args.verbose).build()?;

    if args.dry_run {
        let services = supervisor.services();
        println!("Config valid - {} services configured", services.len());
        print!("{}", render_plan(&services));
        return Ok(ExitCode::SUCCESS);
    }

    if args.once {
        let summary = supervisor.run_once().await;
        print!("{}", render_table(&summary.services));
        return Ok(if summary.is_failing() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    }

    let cancel = supervisor.cancel_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        cancel.cancel();
    });

    tracing::info!("Starting deploy watcher");
    let summary = supervisor.run().await;
    tracing::info!("Deploy watcher stopped");
    if summary.is_failing() {
        tracing::warn!(
            "Services unhealthy at shutdown: {}",
            summary.unhealthy_services().join(", ")
        );
    }

    Ok(ExitCode::SUCCESS)
}
