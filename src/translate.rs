//! Container -> registry entry translation.

use log::{debug, warn};

use crate::error::SyncError;
use crate::types::{Container, RegistryEntry, NETWORK_LABEL, PORT_LABEL, SERVICE_LABEL};

/// Network name the runtime reports as `default` for the default bridge.
const DEFAULT_NETWORK_ALIAS: &str = "bridge";

/// Build the registry entry for `container`.
///
/// Callers only pass containers carrying the service label.  The entry id
/// is always the container id, so the same container always maps to the
/// same entry.
pub fn container_to_entry(container: &Container) -> Result<RegistryEntry, SyncError> {
    debug!("converting container {} to service", container.id);

    let tags = container
        .labels
        .iter()
        .map(|(label, value)| format!("{}={}", label, value))
        .collect();

    let name = container.label(SERVICE_LABEL).unwrap_or_default().to_string();

    let network = container
        .label(NETWORK_LABEL)
        .unwrap_or(container.network_mode.as_str());
    let network = if network == "default" {
        DEFAULT_NETWORK_ALIAS
    } else {
        network
    };
    let address = container.networks.get(network).cloned().unwrap_or_default();
    if address.is_empty() {
        warn!(
            "Container {} has no address on network {}",
            container.id, network
        );
    }

    let port = match container.label(PORT_LABEL) {
        Some(raw) => raw.parse::<u16>().map_err(|source| SyncError::InvalidPort {
            container: container.id.clone(),
            service: name.clone(),
            value: raw.to_string(),
            source,
        })?,
        None => container
            .ports
            .first()
            .map(|p| p.private_port)
            .ok_or_else(|| SyncError::NoExposedPort {
                container: container.id.clone(),
                service: name.clone(),
            })?,
    };

    Ok(RegistryEntry {
        id: container.id.clone(),
        name,
        address,
        port,
        tags,
    })
}
