//! Registration and reconciliation.
//!
//! [`Agent`] owns the runtime and registry handles.  It offers the
//! single-container register/deregister paths used by the event loop and
//! the full reconciliation pass used on startup and on every tick.

use log::{debug, info};

use crate::error::SyncError;
use crate::registry::ServiceRegistry;
use crate::runtime::ContainerRuntime;
use crate::translate::container_to_entry;
use crate::types::{Container, ContainerFilter, RegistryEntry};

pub struct Agent<R, S> {
    pub(crate) runtime: R,
    pub(crate) registry: S,
}

impl<R, S> Agent<R, S>
where
    R: ContainerRuntime,
    S: ServiceRegistry,
{
    pub fn new(runtime: R, registry: S) -> Self {
        Self { runtime, registry }
    }

    /// Run one full reconciliation pass.
    ///
    /// Labelled containers without an entry are registered, entries without
    /// a labelled container are deregistered.  Failures are collected and
    /// never stop the rest of the pass.  An empty result means the registry
    /// matches the runtime.
    pub async fn check_registrations(&self) -> Vec<SyncError> {
        debug!("checking service registration");
        let containers = match self
            .runtime
            .list_containers(&ContainerFilter::labelled())
            .await
        {
            Ok(containers) => containers,
            Err(e) => {
                return vec![SyncError::RuntimeQuery {
                    container: None,
                    source: e.into(),
                }]
            }
        };

        let mut services = match self.registry.services().await {
            Ok(services) => services,
            Err(e) => return vec![SyncError::RegistryQuery { source: e.into() }],
        };

        let mut errors = Vec::new();
        let mut registered = 0usize;

        for container in &containers {
            debug!("checking container {}", container.id);
            // A failed registration stays failed until the next pass.
            if services.remove(&container.id).is_none() {
                match self.register_container(container).await {
                    Ok(()) => registered += 1,
                    Err(e) => errors.push(e),
                }
            }
        }

        let orphans = services.len();
        for id in services.into_keys() {
            if let Err(e) = self.deregister(&id).await {
                errors.push(e);
            }
        }

        info!(
            "Reconciled {} containers: {} registered, {} orphans removed, {} errors",
            containers.len(),
            registered,
            orphans,
            errors.len()
        );
        errors
    }

    /// Register container `id` if it is running and labelled.
    pub async fn register(&self, id: &str) -> Result<(), SyncError> {
        let containers = self
            .runtime
            .list_containers(&ContainerFilter::labelled_id(id))
            .await
            .map_err(|e| SyncError::RuntimeQuery {
                container: Some(id.to_string()),
                source: e.into(),
            })?;

        match containers.first() {
            Some(container) => self.register_container(container).await,
            None => {
                debug!("container {} is gone or not labelled, skipping", id);
                Ok(())
            }
        }
    }

    async fn register_container(&self, container: &Container) -> Result<(), SyncError> {
        debug!("register container {}", container.id);
        let entry = container_to_entry(container)?;
        self.register_entry(&entry).await
    }

    /// Create or replace `entry` in the registry.
    pub async fn register_entry(&self, entry: &RegistryEntry) -> Result<(), SyncError> {
        self.registry
            .register(entry)
            .await
            .map_err(|e| SyncError::Registration {
                id: entry.id.clone(),
                name: entry.name.clone(),
                source: e.into(),
            })?;
        info!("Registered service {} ({})", entry.name, entry.id);
        Ok(())
    }

    /// Remove entry `id` from the registry.
    pub async fn deregister(&self, id: &str) -> Result<(), SyncError> {
        debug!("deregister service {}", id);
        self.registry
            .deregister(id)
            .await
            .map_err(|e| SyncError::Deregistration {
                id: id.to_string(),
                source: e.into(),
            })?;
        info!("Deregistered service {}", id);
        Ok(())
    }
}
