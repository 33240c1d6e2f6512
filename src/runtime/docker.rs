use super::{ContainerRuntime, EventStream};
use crate::types::{Container, ContainerFilter, ExposedPort, NetworkAction, NetworkEvent};
use anyhow::Result;
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, EndpointSettings, EventMessage};
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::StreamExt;
use log::{debug, info};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Request timeout handed to bollard, in seconds (bollard's own default).
const DOCKER_TIMEOUT_SECS: u64 = 120;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the Docker daemon at `socket`.
    ///
    /// `unix://` URIs and bare paths use the local socket; `tcp://` and
    /// `http://` go over HTTP.
    pub fn connect(socket: &str) -> Result<Self> {
        let docker = if socket.starts_with("tcp://") || socket.starts_with("http://") {
            Docker::connect_with_http(socket, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)?
        } else {
            Docker::connect_with_socket(socket, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)?
        };
        info!("Connected to Docker at {}", socket);
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<Container>> {
        let opts = ListContainersOptions::<String> {
            all: false,
            filters: list_filters(filter),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;
        Ok(containers.into_iter().filter_map(to_container).collect())
    }

    fn network_events(&self, action: NetworkAction) -> EventStream<'_> {
        // The request is only sent on first poll; `since` makes Docker
        // replay anything emitted in between.
        let opts = events_options(action, SystemTime::now());

        info!("Listening for Docker network {} events...", action);
        self.docker
            .events(Some(opts))
            .map(move |msg| {
                msg.map(|event| to_network_event(action, event))
                    .map_err(anyhow::Error::from)
            })
            .boxed()
    }
}

fn events_options(action: NetworkAction, since: SystemTime) -> EventsOptions<String> {
    let filters = [
        ("type".to_string(), vec!["network".to_string()]),
        ("event".to_string(), vec![action.as_str().to_string()]),
    ]
    .into_iter()
    .collect();
    EventsOptions::<String> {
        since: since
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs().to_string()),
        filters,
        ..Default::default()
    }
}

fn list_filters(filter: &ContainerFilter) -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    if let Some(label) = &filter.label {
        filters.insert("label".to_string(), vec![label.clone()]);
    }
    if let Some(id) = &filter.id {
        filters.insert("id".to_string(), vec![id.clone()]);
    }
    filters
}

fn to_container(summary: ContainerSummary) -> Option<Container> {
    let id = match summary.id {
        Some(id) if !id.is_empty() => id,
        _ => {
            debug!("Skipping container without id");
            return None;
        }
    };

    let networks = summary
        .network_settings
        .and_then(|s| s.networks)
        .map(|networks| {
            networks
                .iter()
                .filter_map(|(name, net)| get_ip(net).map(|ip| (name.clone(), ip)))
                .collect()
        })
        .unwrap_or_default();

    Some(Container {
        id,
        labels: summary.labels.unwrap_or_default().into_iter().collect(),
        ports: summary
            .ports
            .unwrap_or_default()
            .into_iter()
            .map(|p| ExposedPort {
                private_port: p.private_port,
            })
            .collect(),
        network_mode: summary
            .host_config
            .and_then(|h| h.network_mode)
            .unwrap_or_default(),
        networks,
    })
}

fn to_network_event(action: NetworkAction, event: EventMessage) -> NetworkEvent {
    let attributes = event.actor.and_then(|a| a.attributes).unwrap_or_default();
    NetworkEvent {
        action,
        container: attributes
            .get("container")
            .filter(|id| !id.is_empty())
            .cloned(),
        network: attributes.get("name").cloned(),
    }
}

/// IPv4 address if set, else the global IPv6 address.
fn get_ip(net: &EndpointSettings) -> Option<String> {
    if let Some(ipv4) = &net.ip_address {
        if !ipv4.is_empty() {
            return Some(ipv4.clone());
        }
    }
    if let Some(ipv6) = &net.global_ipv6_address {
        if !ipv6.is_empty() {
            return Some(ipv6.clone());
        }
    }
    None
}
