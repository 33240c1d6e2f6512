use clap::Parser;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Command-line flags.  Only flags actually given override other sources.
#[derive(Debug, Default, Parser, Serialize)]
#[command(
    name = "junction",
    version,
    about = "Keeps Consul service registrations in sync with labelled Docker containers"
)]
pub struct Cli {
    /// Local consul agent endpoint
    #[arg(short = 'e', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consul_endpoint: Option<String>,

    /// Docker endpoint location
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket: Option<String>,

    /// error, warn, info, debug or trace
    #[arg(short = 'l', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Exit after the initial service registration
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub run_once: bool,

    /// Seconds between full reconciliation passes
    #[arg(long = "sync-interval")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub consul_endpoint: String,
    pub docker_socket: String,
    pub log_level: String,
    pub run_once: bool,
    pub sync_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            consul_endpoint: "http://localhost:8500".into(),
            docker_socket: "unix:///var/run/docker.sock".into(),
            log_level: "error".into(),
            run_once: false,
            sync_interval_secs: 30,
        }
    }
}

impl Config {
    /// Defaults, then `junction.toml`, `junction.json`, `JUNCTION_*` env
    /// vars and finally the command line.
    pub fn figment(cli: &Cli) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("junction.toml"))
            .merge(Json::file("junction.json"))
            .merge(Env::prefixed("JUNCTION_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let config: Config = Self::figment(cli)
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if config.sync_interval_secs == 0 {
            anyhow::bail!("sync_interval_secs must be greater than zero");
        }
        config.log_filter()?;

        Ok(config)
    }

    pub fn log_filter(&self) -> anyhow::Result<LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid log level: {}", self.log_level))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
