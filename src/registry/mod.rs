use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::RegistryEntry;

pub mod consul;
pub use consul::ConsulRegistry;

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// All entries currently registered, keyed by id.
    async fn services(&self) -> Result<HashMap<String, RegistryEntry>>;

    /// Create or replace `entry`.
    async fn register(&self, entry: &RegistryEntry) -> Result<()>;

    /// Remove the entry with `id`.
    async fn deregister(&self, id: &str) -> Result<()>;
}
