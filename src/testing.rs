//! In-memory collaborators for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::registry::ServiceRegistry;
use crate::runtime::{ContainerRuntime, EventStream};
use crate::types::{
    Container, ContainerFilter, ExposedPort, NetworkAction, NetworkEvent, RegistryEntry,
    SERVICE_LABEL,
};

/// A labelled container on the default bridge exposing `port`.
pub fn service_container(id: &str, service: &str, port: u16) -> Container {
    Container {
        id: id.to_string(),
        labels: BTreeMap::from([(SERVICE_LABEL.to_string(), service.to_string())]),
        ports: vec![ExposedPort { private_port: port }],
        network_mode: "default".to_string(),
        networks: HashMap::from([("bridge".to_string(), "172.17.0.2".to_string())]),
    }
}

pub fn entry(id: &str, name: &str) -> RegistryEntry {
    RegistryEntry {
        id: id.to_string(),
        name: name.to_string(),
        address: "172.17.0.2".to_string(),
        port: 80,
        tags: Vec::new(),
    }
}

/// Docker's semantics for the `label` and `id` list filters.
fn matches(filter: &ContainerFilter, container: &Container) -> bool {
    let label_ok = filter
        .label
        .as_ref()
        .map_or(true, |l| container.labels.contains_key(l));
    let id_ok = filter.id.as_ref().map_or(true, |id| &container.id == id);
    label_ok && id_ok
}

#[derive(Default)]
pub struct FakeRuntime {
    pub containers: Vec<Container>,
    pub fail_list: bool,
    events: Mutex<HashMap<NetworkAction, Vec<Result<NetworkEvent>>>>,
    subscriptions: Mutex<Vec<NetworkAction>>,
}

impl FakeRuntime {
    pub fn with_containers(containers: Vec<Container>) -> Self {
        Self {
            containers,
            ..Default::default()
        }
    }

    /// Queue items for the next subscription to `action`.  Once drained the
    /// stream ends.  Subscriptions with nothing queued never yield.
    pub fn queue(&self, action: NetworkAction, items: Vec<Result<NetworkEvent>>) {
        self.events.lock().unwrap().insert(action, items);
    }

    pub fn subscriptions(&self) -> Vec<NetworkAction> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<Container>> {
        if self.fail_list {
            return Err(anyhow!("docker daemon unavailable"));
        }
        Ok(self
            .containers
            .iter()
            .filter(|c| matches(filter, c))
            .cloned()
            .collect())
    }

    fn network_events(&self, action: NetworkAction) -> EventStream<'_> {
        self.subscriptions.lock().unwrap().push(action);
        match self.events.lock().unwrap().remove(&action) {
            Some(items) => stream::iter(items).boxed(),
            None => stream::pending().boxed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Register(String),
    Deregister(String),
}

#[derive(Default)]
pub struct FakeRegistry {
    entries: Mutex<HashMap<String, RegistryEntry>>,
    calls: Mutex<Vec<Call>>,
    pub fail_list: bool,
    pub fail_register: HashSet<String>,
    pub fail_deregister: HashSet<String>,
}

impl FakeRegistry {
    pub fn with_entries(entries: Vec<RegistryEntry>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().map(|e| (e.id.clone(), e)).collect()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entries.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn entry(&self, id: &str) -> Option<RegistryEntry> {
        self.entries.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl ServiceRegistry for FakeRegistry {
    async fn services(&self) -> Result<HashMap<String, RegistryEntry>> {
        if self.fail_list {
            return Err(anyhow!("consul agent unavailable"));
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn register(&self, entry: &RegistryEntry) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Register(entry.id.clone()));
        if self.fail_register.contains(&entry.id) {
            return Err(anyhow!("register rejected"));
        }
        self.entries
            .lock()
            .unwrap()
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn deregister(&self, id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Deregister(id.to_string()));
        if self.fail_deregister.contains(id) {
            return Err(anyhow!("deregister rejected"));
        }
        self.entries.lock().unwrap().remove(id);
        Ok(())
    }
}
