//! Cinder v3 volume type client
//!
//! Talks to the `/types` collection of a block storage endpoint using the
//! token of a shared [`IdentitySession`].

use super::identity::IdentitySession;
use crate::domain::ports::{
    tolerate_not_found, BlockStorageApi, CreateOpts, Lookup, UpdateOpts, VolumeType,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Service types under which the catalog may publish Cinder v3
pub const BLOCK_STORAGE_SERVICE_TYPES: &[&str] = &["volumev3", "block-storage"];

// =============================================================================
// Wire Envelopes
// =============================================================================

#[derive(Debug, Serialize)]
struct VolumeTypeRequest<'a, T> {
    volume_type: &'a T,
}

#[derive(Debug, Deserialize)]
struct VolumeTypeResponse {
    volume_type: VolumeType,
}

#[derive(Debug, Deserialize)]
struct VolumeTypeListResponse {
    #[serde(default)]
    volume_types: Vec<VolumeType>,
    #[serde(default)]
    volume_type_links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

// =============================================================================
// Cinder Client
// =============================================================================

/// Region-scoped Cinder client
pub struct CinderClient {
    session: Arc<IdentitySession>,
    endpoint: String,
    region: String,
}

impl CinderClient {
    /// Create a client for an already-resolved endpoint
    pub fn new(
        session: Arc<IdentitySession>,
        endpoint: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            session,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            region: region.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn type_url(&self, id: &str) -> String {
        format!("{}/types/{}", self.endpoint, urlencoding::encode(id))
    }

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let token = self.session.token().await?;
        Ok(self
            .session
            .http()
            .request(method, url)
            .header("X-Auth-Token", token.id.as_str())
            .header("Accept", "application/json"))
    }

    /// Send a request, turning non-2xx responses into errors
    async fn send(&self, method: Method, url: &str, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.session.invalidate();
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::UnexpectedStatus {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl BlockStorageApi for CinderClient {
    async fn list_volume_types(&self) -> Result<Vec<VolumeType>> {
        let mut all = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(format!("{}/types", self.endpoint));

        while let Some(url) = next.take() {
            if !seen.insert(url.clone()) {
                break;
            }

            let builder = self.request(Method::GET, &url).await?;
            let page: VolumeTypeListResponse =
                self.send(Method::GET, &url, builder).await?.json().await?;

            debug!("Fetched {} volume types from {}", page.volume_types.len(), url);

            all.extend(page.volume_types);
            next = page
                .volume_type_links
                .into_iter()
                .find(|link| link.rel == "next")
                .map(|link| link.href);
        }

        Ok(all)
    }

    async fn get_volume_type(&self, id: &str) -> Result<Lookup<VolumeType>> {
        let url = self.type_url(id);
        let builder = self.request(Method::GET, &url).await?;

        let result = match self.send(Method::GET, &url, builder).await {
            Ok(response) => Ok(response.json::<VolumeTypeResponse>().await?.volume_type),
            Err(e) => Err(e),
        };
        tolerate_not_found(result)
    }

    async fn create_volume_type(&self, opts: &CreateOpts) -> Result<VolumeType> {
        let url = format!("{}/types", self.endpoint);
        let builder = self
            .request(Method::POST, &url)
            .await?
            .json(&VolumeTypeRequest { volume_type: opts });

        let response: VolumeTypeResponse =
            self.send(Method::POST, &url, builder).await?.json().await?;
        Ok(response.volume_type)
    }

    async fn update_volume_type(&self, id: &str, opts: &UpdateOpts) -> Result<Lookup<VolumeType>> {
        let url = self.type_url(id);
        let builder = self
            .request(Method::PUT, &url)
            .await?
            .json(&VolumeTypeRequest { volume_type: opts });

        let result = match self.send(Method::PUT, &url, builder).await {
            Ok(response) => Ok(response.json::<VolumeTypeResponse>().await?.volume_type),
            Err(e) => Err(e),
        };
        tolerate_not_found(result)
    }

    async fn delete_volume_type(&self, id: &str) -> Result<Lookup<()>> {
        let url = self.type_url(id);
        let builder = self.request(Method::DELETE, &url).await?;
        tolerate_not_found(self.send(Method::DELETE, &url, builder).await.map(|_| ()))
    }

    fn region(&self) -> &str {
        &self.region
    }
}
