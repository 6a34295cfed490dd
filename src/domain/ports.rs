//! Domain Ports - Core trait definitions for the volume type provider
//!
//! These traits define the boundary between the provider lifecycle logic and
//! the OpenStack Block Storage service. Adapters implement these traits to
//! talk to a real Cinder endpoint or to the in-memory simulator.

use crate::error::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Volume Type
// =============================================================================

/// A Cinder volume type as returned by the block storage API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VolumeType {
    /// Server-assigned identifier
    pub id: String,
    /// Human-readable name
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Free-form description
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Whether the type is visible to all projects
    #[serde(default)]
    pub is_public: bool,
    /// Public access flag as echoed by the volume-type-access extension
    #[serde(rename = "os-volume-type-access:is_public", default)]
    pub public_access: bool,
    /// Associated QoS specification
    #[serde(default, deserialize_with = "null_as_default")]
    pub qos_specs_id: String,
    /// Backend-interpreted key/value annotations
    #[serde(default, deserialize_with = "null_as_default")]
    pub extra_specs: BTreeMap<String, String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Options for creating a volume type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOpts {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    #[serde(
        rename = "os-volume-type-access:is_public",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub extra_specs: BTreeMap<String, String>,
}

/// Options for updating a volume type
///
/// Extra specs and the QoS binding are managed through separate API calls and
/// are not part of an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_public: Option<bool>,
}

// =============================================================================
// Lookup
// =============================================================================

/// Outcome of an operation against an object that may no longer exist
///
/// Together with `Err` this forms the Found/NotFound/Error tri-state used by
/// read and delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    /// Convert into an `Option`, dropping the not-found distinction
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Lookup::Found(v) => Lookup::Found(f(v)),
            Lookup::NotFound => Lookup::NotFound,
        }
    }
}

/// Fold a not-found error into `Lookup::NotFound`, leaving other errors alone
pub fn tolerate_not_found<T>(result: Result<T>) -> Result<Lookup<T>> {
    match result {
        Ok(v) => Ok(Lookup::Found(v)),
        Err(e) if e.is_not_found() => Ok(Lookup::NotFound),
        Err(e) => Err(e),
    }
}

// =============================================================================
// Block Storage Port
// =============================================================================

/// Volume type operations of a region-scoped block storage client
#[async_trait]
pub trait BlockStorageApi: Send + Sync {
    /// List every volume type visible to the client, across all pages
    async fn list_volume_types(&self) -> Result<Vec<VolumeType>>;

    /// Fetch a volume type by id
    async fn get_volume_type(&self, id: &str) -> Result<Lookup<VolumeType>>;

    /// Create a volume type
    async fn create_volume_type(&self, opts: &CreateOpts) -> Result<VolumeType>;

    /// Update name, description and visibility of a volume type
    async fn update_volume_type(&self, id: &str, opts: &UpdateOpts) -> Result<Lookup<VolumeType>>;

    /// Delete a volume type
    async fn delete_volume_type(&self, id: &str) -> Result<Lookup<()>>;

    /// Region this client is scoped to
    fn region(&self) -> &str;
}

/// Source of region-scoped block storage clients
#[async_trait]
pub trait BlockStorageConnector: Send + Sync {
    /// Build (or reuse) a block storage client for the given region
    async fn block_storage_client(&self, region: &str) -> Result<Arc<dyn BlockStorageApi>>;

    /// Region used when a resource does not name one
    fn default_region(&self) -> &str;
}
