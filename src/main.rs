//! Junction daemon entry point.
//!
//! Watches the local Docker daemon and keeps the local Consul agent's
//! service registrations in line with the containers carrying a
//! `consul.service` label.

use clap::Parser;
use log::{error, info};
use tokio::signal;

mod agent;
mod config;
mod error;
mod event_loop;
mod registry;
mod runtime;
#[cfg(test)]
mod testing;
mod translate;
mod types;

use agent::Agent;
use config::{Cli, Config};
use error::report_all;
use registry::ConsulRegistry;
use runtime::DockerRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let cfg = Config::load(&cli)?;

    // Initialize logging; RUST_LOG refines the configured level
    env_logger::Builder::new()
        .filter_level(cfg.log_filter()?)
        .parse_default_env()
        .init();
    info!("Starting junction with config: {:?}", cfg);

    let runtime = DockerRuntime::connect(&cfg.docker_socket)
        .map_err(|e| anyhow::anyhow!("Failed to connect to docker: {}", e))?;
    let registry = ConsulRegistry::new(&cfg.consul_endpoint)
        .map_err(|e| anyhow::anyhow!("Failed to connect to consul: {}", e))?;
    info!("Using consul agent at {}", registry.endpoint());
    let agent = Agent::new(runtime, registry);

    if cfg.run_once {
        let errors = agent.check_registrations().await;
        report_all(&errors);
        info!("Run once finished with {} errors", errors.len());
        return Ok(());
    }

    tokio::select! {
        _ = agent.run(cfg.sync_interval()) => {}
        res = signal::ctrl_c() => match res {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(err) => {
                error!("Unable to listen for shutdown signal: {}", err);
                agent.run(cfg.sync_interval()).await;
            }
        },
    }

    info!("Shutdown complete.");
    Ok(())
}
