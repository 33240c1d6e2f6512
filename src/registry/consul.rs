//! Consul agent client.
//!
//! Talks to the local agent's HTTP API.  Only the three endpoints the
//! agent needs are covered: listing services, registering a service and
//! deregistering one.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::ServiceRegistry;
use crate::types::RegistryEntry;

pub struct ConsulRegistry {
    client: Client,
    endpoint: Url,
}

/// A service as returned by `/v1/agent/services`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    service: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: u16,
}

impl From<AgentService> for RegistryEntry {
    fn from(s: AgentService) -> Self {
        Self {
            id: s.id,
            name: s.service,
            address: s.address,
            port: s.port,
            tags: s.tags.unwrap_or_default(),
        }
    }
}

impl ConsulRegistry {
    /// `endpoint` may omit the scheme (`host:port`), in which case `http`
    /// is assumed.
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = parse_endpoint(endpoint)?;
        let client = Client::builder().build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str().trim_end_matches('/')
    }

    /// `/v1/agent/<segments>`, each segment percent-encoded on its own.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Consul endpoint {} cannot be a base URL", self.endpoint))?
            .pop_if_empty()
            .extend(["v1", "agent"])
            .extend(segments);
        Ok(url)
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| anyhow!("Invalid consul endpoint {}: {}", endpoint, e))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        "http" | "https" => Err(anyhow!("Consul endpoint {} has no host", endpoint)),
        scheme => Err(anyhow!(
            "Consul endpoint {} uses unsupported scheme {}",
            endpoint,
            scheme
        )),
    }
}

#[async_trait]
impl ServiceRegistry for ConsulRegistry {
    async fn services(&self) -> Result<HashMap<String, RegistryEntry>> {
        let services: HashMap<String, AgentService> = self
            .client
            .get(self.url(&["services"])?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(services
            .into_iter()
            .map(|(id, service)| (id, service.into()))
            .collect())
    }

    async fn register(&self, entry: &RegistryEntry) -> Result<()> {
        debug!("PUT service/register {}", entry.id);
        self.client
            .put(self.url(&["service", "register"])?)
            .json(entry)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn deregister(&self, id: &str) -> Result<()> {
        debug!("PUT service/deregister/{}", id);
        self.client
            .put(self.url(&["service", "deregister", id])?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry() -> RegistryEntry {
        RegistryEntry {
            id: "c1".into(),
            name: "web".into(),
            address: "10.0.0.5".into(),
            port: 8080,
            tags: vec!["consul.service=web".into()],
        }
    }

    #[test]
    fn rejects_invalid_endpoint() {
        assert!(ConsulRegistry::new("not a url").is_err());
    }

    #[test]
    fn endpoint_without_scheme_defaults_to_http() {
        for raw in ["localhost:8500", "consul:8500"] {
            let registry = ConsulRegistry::new(raw).unwrap();
            assert_eq!(registry.endpoint(), format!("http://{}", raw));
        }
    }

    #[test]
    fn endpoint_with_unsupported_scheme_is_rejected() {
        assert!(ConsulRegistry::new("ftp://consul:8500").is_err());
        assert!(ConsulRegistry::new("unix:///var/run/consul.sock").is_err());
        assert!(ConsulRegistry::new("https://consul.internal:8501").is_ok());
    }

    #[test]
    fn endpoint_trailing_slash_is_dropped() {
        let registry = ConsulRegistry::new("http://consul.local:8500/").unwrap();
        assert_eq!(registry.endpoint(), "http://consul.local:8500");
        assert_eq!(
            registry.url(&["services"]).unwrap().as_str(),
            "http://consul.local:8500/v1/agent/services"
        );
    }

    #[test]
    fn endpoint_path_prefix_is_kept() {
        let registry = ConsulRegistry::new("http://gateway/consul/").unwrap();
        assert_eq!(
            registry.url(&["services"]).unwrap().as_str(),
            "http://gateway/consul/v1/agent/services"
        );
    }

    #[tokio::test]
    async fn services_are_keyed_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/agent/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "c1": {
                    "ID": "c1",
                    "Service": "web",
                    "Tags": ["consul.service=web"],
                    "Address": "10.0.0.5",
                    "Port": 8080,
                    "Weights": {"Passing": 1, "Warning": 1}
                },
                "consul": {
                    "ID": "consul",
                    "Service": "consul",
                    "Tags": null,
                    "Address": "",
                    "Port": 8300
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registry = ConsulRegistry::new(&server.uri()).unwrap();
        let services = registry.services().await.unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services["c1"], entry());
        assert!(services["consul"].tags.is_empty());
    }

    #[tokio::test]
    async fn register_puts_entry_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/register"))
            .and(body_json(serde_json::json!({
                "ID": "c1",
                "Name": "web",
                "Address": "10.0.0.5",
                "Port": 8080,
                "Tags": ["consul.service=web"]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let registry = ConsulRegistry::new(&server.uri()).unwrap();
        registry.register(&entry()).await.unwrap();
    }

    #[tokio::test]
    async fn deregister_targets_the_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/deregister/c1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let registry = ConsulRegistry::new(&server.uri()).unwrap();
        registry.deregister("c1").await.unwrap();
    }

    #[tokio::test]
    async fn deregister_encodes_the_id_as_one_segment() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/deregister/redis%2F1%3Fa%23b"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let registry = ConsulRegistry::new(&server.uri()).unwrap();
        registry.deregister("redis/1?a#b").await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let registry = ConsulRegistry::new(&server.uri()).unwrap();
        assert!(registry.register(&entry()).await.is_err());
        assert!(registry.deregister("c1").await.is_err());
    }
}
