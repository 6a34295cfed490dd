//! OpenStack Adapters
//!
//! Provides the block storage clients behind the provider:
//! - Keystone v3 identity session
//! - Cinder v3 volume type client
//! - In-memory simulator for tests and dry runs

pub mod cinder;
pub mod config;
pub mod identity;
pub mod memory;

pub use cinder::*;
pub use config::*;
pub use identity::*;
pub use memory::*;

use crate::domain::ports::{BlockStorageApi, BlockStorageConnector};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Connector that authenticates against Keystone and builds Cinder clients
pub struct OpenStackConnector {
    session: Arc<IdentitySession>,
}

impl OpenStackConnector {
    /// Create a connector from configuration
    pub fn new(config: OpenStackConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.insecure)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            session: Arc::new(IdentitySession::new(config, http)),
        })
    }

    pub fn config(&self) -> &OpenStackConfig {
        self.session.config()
    }

    /// Resolve the block storage endpoint for a region
    async fn block_storage_endpoint(&self, region: &str) -> Result<String> {
        let config = self.session.config();

        for service_type in BLOCK_STORAGE_SERVICE_TYPES {
            if let Some(url) = config.endpoint_overrides.get(*service_type) {
                debug!("Using endpoint override for {}: {}", service_type, url);
                return Ok(url.clone());
            }
        }

        let token = self.session.token().await?;
        endpoint_for(
            &token.catalog,
            BLOCK_STORAGE_SERVICE_TYPES,
            region,
            config.interface,
        )
    }
}

#[async_trait]
impl BlockStorageConnector for OpenStackConnector {
    async fn block_storage_client(&self, region: &str) -> Result<Arc<dyn BlockStorageApi>> {
        let endpoint = self.block_storage_endpoint(region).await?;
        debug!("Block storage endpoint for {}: {}", region, endpoint);

        let client: Arc<dyn BlockStorageApi> =
            Arc::new(CinderClient::new(self.session.clone(), endpoint, region));
        Ok(client)
    }

    fn default_region(&self) -> &str {
        &self.session.config().region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_client_uses_catalog_endpoint() {
        let server = MockServer::start().await;
        let expires_at = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "tok-1")
                    .set_body_json(json!({"token": {
                        "expires_at": expires_at,
                        "catalog": [{
                            "type": "volumev3",
                            "endpoints": [{
                                "interface": "public",
                                "region": "RegionOne",
                                "url": format!("{}/volume/v3/p1", server.uri())
                            }]
                        }]
                    }})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/volume/v3/p1/types"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"volume_types": []})))
            .expect(1)
            .mount(&server)
            .await;

        let connector = OpenStackConnector::new(OpenStackConfig {
            auth_url: format!("{}/v3", server.uri()),
            username: "admin".into(),
            password: "secret".into(),
            project_name: "admin".into(),
            ..Default::default()
        })
        .unwrap();

        let client = connector.block_storage_client("RegionOne").await.unwrap();
        assert!(client.list_volume_types().await.unwrap().is_empty());
        assert_eq!(connector.default_region(), "RegionOne");

        let err = connector.block_storage_client("RegionNine").await.err().unwrap();
        assert!(matches!(err, Error::EndpointNotFound { .. }));
    }

    #[tokio::test]
    async fn test_endpoint_override_skips_catalog() {
        let mut config = OpenStackConfig::default();
        config
            .endpoint_overrides
            .insert("volumev3".into(), "http://cinder.local:8776/v3/p1".into());

        let connector = OpenStackConnector::new(config).unwrap();
        assert_eq!(
            connector.block_storage_endpoint("RegionOne").await.unwrap(),
            "http://cinder.local:8776/v3/p1"
        );
    }
}
