//! Data structures shared by the synchronisation engine.
//!
//! [`Container`] is the runtime-neutral view of a running container as
//! read from the container runtime.  [`RegistryEntry`] is the service
//! record pushed to the registry.  The two are correlated solely by
//! identifier: an entry's `id` is always the id of the container it was
//! built from.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label carrying the service name.  Only containers bearing it are synced.
pub const SERVICE_LABEL: &str = "consul.service";
/// Label overriding the network used to resolve the service address.
pub const NETWORK_LABEL: &str = "consul.network";
/// Label overriding the service port.
pub const PORT_LABEL: &str = "consul.port";

/// A port exposed by a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedPort {
    pub private_port: u16,
}

/// A running container as seen by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    /// Sorted, so anything derived from the labels is deterministic.
    pub labels: BTreeMap<String, String>,
    /// Exposed ports in the order reported by the runtime.
    pub ports: Vec<ExposedPort>,
    /// Resolved network mode, e.g. `default`, `bridge` or a network name.
    pub network_mode: String,
    /// Network name -> assigned IPv4/IPv6 address.
    pub networks: HashMap<String, String>,
}

impl Container {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// A service registration.
///
/// Serialises to the body accepted by the Consul agent's
/// `/v1/agent/service/register` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegistryEntry {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
}

/// Filter pushed down to the runtime when listing containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    /// Only containers carrying this label key.
    pub label: Option<String>,
    /// Only the container with this id.
    pub id: Option<String>,
}

impl ContainerFilter {
    /// All containers carrying the service label.
    pub fn labelled() -> Self {
        Self {
            label: Some(SERVICE_LABEL.to_string()),
            id: None,
        }
    }

    /// The container `id`, provided it carries the service label.
    pub fn labelled_id(id: &str) -> Self {
        Self {
            label: Some(SERVICE_LABEL.to_string()),
            id: Some(id.to_string()),
        }
    }
}

/// The network events the agent subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkAction {
    Connect,
    Disconnect,
}

impl NetworkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkAction::Connect => "connect",
            NetworkAction::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for NetworkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A container attached to or detached from a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    pub action: NetworkAction,
    /// Id of the affected container, if the runtime reported one.
    pub container: Option<String>,
    /// Name of the network, for logging.
    pub network: Option<String>,
}
