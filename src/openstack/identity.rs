//! Keystone v3 identity session
//!
//! Issues a scoped token, caches it until shortly before it expires, and
//! resolves service endpoints from the token's catalog.

use super::config::{AuthMethod, Interface, OpenStackConfig};
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Tokens are renewed this long before Keystone would expire them
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

// =============================================================================
// Catalog
// =============================================================================

/// A service in the token catalog
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

/// A single endpoint of a catalog service
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    pub interface: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

impl CatalogEndpoint {
    fn in_region(&self, region: &str) -> bool {
        self.region.as_deref() == Some(region) || self.region_id.as_deref() == Some(region)
    }
}

/// Find the endpoint URL of the first matching service type
pub fn endpoint_for(
    catalog: &[CatalogEntry],
    service_types: &[&str],
    region: &str,
    interface: Interface,
) -> Result<String> {
    for service_type in service_types {
        let endpoint = catalog
            .iter()
            .filter(|entry| entry.service_type == *service_type)
            .flat_map(|entry| entry.endpoints.iter())
            .find(|ep| ep.interface == interface.as_str() && ep.in_region(region));

        if let Some(ep) = endpoint {
            return Ok(ep.url.trim_end_matches('/').to_string());
        }
    }

    Err(Error::EndpointNotFound {
        service_type: service_types.join("|"),
        region: region.to_string(),
        interface: interface.to_string(),
    })
}

// =============================================================================
// Token
// =============================================================================

/// An issued token together with its catalog
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub id: String,
    pub expires_at: DateTime<Utc>,
    pub catalog: Vec<CatalogEntry>,
}

impl AuthToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) > now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    expires_at: DateTime<Utc>,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

/// Build the `POST /auth/tokens` request body
pub fn auth_request_body(method: &AuthMethod) -> Value {
    let project_scope = |project_name: &str, domain: &str| {
        json!({"project": {"name": project_name, "domain": {"name": domain}}})
    };

    match method {
        AuthMethod::Password {
            username,
            password,
            user_domain_name,
            project_name,
            project_domain_name,
        } => {
            let mut auth = json!({
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": username,
                            "password": password,
                            "domain": {"name": user_domain_name}
                        }
                    }
                }
            });
            if !project_name.is_empty() {
                auth["scope"] = project_scope(project_name.as_str(), project_domain_name.as_str());
            }
            json!({ "auth": auth })
        }
        AuthMethod::Token {
            token,
            project_name,
            project_domain_name,
        } => {
            let mut auth = json!({
                "identity": {"methods": ["token"], "token": {"id": token}}
            });
            if !project_name.is_empty() {
                auth["scope"] = project_scope(project_name.as_str(), project_domain_name.as_str());
            }
            json!({ "auth": auth })
        }
        AuthMethod::ApplicationCredential { id, secret } => json!({
            "auth": {
                "identity": {
                    "methods": ["application_credential"],
                    "application_credential": {"id": id, "secret": secret}
                }
            }
        }),
    }
}

// =============================================================================
// Identity Session
// =============================================================================

/// Authenticated Keystone session shared by all block storage clients
pub struct IdentitySession {
    config: OpenStackConfig,
    http: reqwest::Client,
    token: RwLock<Option<Arc<AuthToken>>>,
}

impl IdentitySession {
    /// Create a session; no request is made until a token is needed
    pub fn new(config: OpenStackConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            token: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &OpenStackConfig {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Return a valid token, authenticating if none is cached or it is about to expire
    pub async fn token(&self) -> Result<Arc<AuthToken>> {
        let cached = self.token.read().clone();
        if let Some(token) = cached {
            if token.is_fresh(Utc::now()) {
                return Ok(token);
            }
        }

        let token = Arc::new(self.authenticate().await?);
        *self.token.write() = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call re-authenticates
    pub fn invalidate(&self) {
        *self.token.write() = None;
    }

    async fn authenticate(&self) -> Result<AuthToken> {
        let method = self.config.auth_method()?;
        let url = self.config.token_url();

        info!("Authenticating against Keystone at {}", url);

        let response = self
            .http
            .post(&url)
            .json(&auth_request_body(&method))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authentication(format!("{} from {}: {}", status, url, body)));
        }

        let id = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Authentication("Keystone response carried no X-Subject-Token".into())
            })?;

        let body: TokenResponse = response.json().await?;

        debug!(
            "Issued token expiring at {} with {} catalog entries",
            body.token.expires_at,
            body.token.catalog.len()
        );

        Ok(AuthToken {
            id,
            expires_at: body.token.expires_at,
            catalog: body.token.catalog,
        })
    }
}
