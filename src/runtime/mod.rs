use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::types::{Container, ContainerFilter, NetworkAction, NetworkEvent};

pub mod docker;
pub use docker::DockerRuntime;

/// Stream of network events; transport failures arrive as `Err` items.
pub type EventStream<'a> = BoxStream<'a, Result<NetworkEvent>>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List running containers matching `filter`.
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<Container>>;

    /// Subscribe to network connect or disconnect events.
    fn network_events(&self, action: NetworkAction) -> EventStream<'_>;
}
