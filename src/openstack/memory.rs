//! In-memory Block Storage simulator
//!
//! Tracks volume types per region in process memory and mimics the Cinder
//! behaviours the provider relies on: server-assigned ids, listing in
//! creation order, echoed public access flag, and 404 for unknown ids.

use crate::domain::ports::{
    BlockStorageApi, BlockStorageConnector, CreateOpts, Lookup, UpdateOpts, VolumeType,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

// =============================================================================
// Region Store
// =============================================================================

/// Simulated Cinder volume type store for one region
pub struct InMemoryBlockStorage {
    region: String,
    /// Volume types in creation order
    volume_types: RwLock<IndexMap<String, VolumeType>>,
    next_id: AtomicU64,
    /// When set, every call fails as if the service were down
    unavailable: AtomicBool,
}

impl InMemoryBlockStorage {
    /// Create an empty store for a region
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            volume_types: RwLock::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Insert a volume type as-is, bypassing create validation
    pub async fn insert(&self, volume_type: VolumeType) {
        self.volume_types
            .write()
            .await
            .insert(volume_type.id.clone(), volume_type);
    }

    /// Toggle simulated service outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.volume_types.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self, operation: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::UnexpectedStatus {
                method: operation.to_string(),
                url: format!("memory://{}/types", self.region),
                status: 503,
                body: "block storage service unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn generate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{:08x}-0000-4000-8000-{:012x}", n, n)
    }
}

#[async_trait]
impl BlockStorageApi for InMemoryBlockStorage {
    async fn list_volume_types(&self) -> Result<Vec<VolumeType>> {
        self.check_available("GET")?;
        Ok(self.volume_types.read().await.values().cloned().collect())
    }

    async fn get_volume_type(&self, id: &str) -> Result<Lookup<VolumeType>> {
        self.check_available("GET")?;
        Ok(match self.volume_types.read().await.get(id) {
            Some(vt) => Lookup::Found(vt.clone()),
            None => Lookup::NotFound,
        })
    }

    async fn create_volume_type(&self, opts: &CreateOpts) -> Result<VolumeType> {
        self.check_available("POST")?;

        if opts.name.is_empty() {
            return Err(Error::OpenStackApi {
                service: "cinder".into(),
                reason: "Volume type name can not be empty".into(),
            });
        }

        let mut types = self.volume_types.write().await;
        if types.values().any(|vt| vt.name == opts.name) {
            return Err(Error::OpenStackApi {
                service: "cinder".into(),
                reason: format!("Volume Type {} already exists", opts.name),
            });
        }

        let is_public = opts.is_public.unwrap_or(true);
        let volume_type = VolumeType {
            id: self.generate_id(),
            name: opts.name.clone(),
            description: opts.description.clone(),
            is_public,
            public_access: is_public,
            qos_specs_id: String::new(),
            extra_specs: opts.extra_specs.clone(),
        };

        info!(
            "Created simulated volume type {} ({}) in {}",
            volume_type.name, volume_type.id, self.region
        );

        types.insert(volume_type.id.clone(), volume_type.clone());
        Ok(volume_type)
    }

    async fn update_volume_type(&self, id: &str, opts: &UpdateOpts) -> Result<Lookup<VolumeType>> {
        self.check_available("PUT")?;

        let mut types = self.volume_types.write().await;
        let Some(volume_type) = types.get_mut(id) else {
            return Ok(Lookup::NotFound);
        };

        if let Some(name) = &opts.name {
            volume_type.name = name.clone();
        }
        if let Some(description) = &opts.description {
            volume_type.description = description.clone();
        }
        if let Some(is_public) = opts.is_public {
            volume_type.is_public = is_public;
            volume_type.public_access = is_public;
        }

        debug!("Updated simulated volume type {}", id);
        Ok(Lookup::Found(volume_type.clone()))
    }

    async fn delete_volume_type(&self, id: &str) -> Result<Lookup<()>> {
        self.check_available("DELETE")?;

        // shift_remove keeps the listing order of the remaining entries
        Ok(match self.volume_types.write().await.shift_remove(id) {
            Some(_) => Lookup::Found(()),
            None => Lookup::NotFound,
        })
    }

    fn region(&self) -> &str {
        &self.region
    }
}

// =============================================================================
// Simulated Cloud
// =============================================================================

/// Connector handing out one simulated store per region
pub struct InMemoryCloud {
    default_region: String,
    regions: RwLock<BTreeMap<String, Arc<InMemoryBlockStorage>>>,
}

impl InMemoryCloud {
    pub fn new(default_region: impl Into<String>) -> Self {
        Self {
            default_region: default_region.into(),
            regions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get the store for a region, creating it on first use
    pub async fn region(&self, region: &str) -> Arc<InMemoryBlockStorage> {
        if let Some(store) = self.regions.read().await.get(region) {
            return store.clone();
        }

        self.regions
            .write()
            .await
            .entry(region.to_string())
            .or_insert_with(|| Arc::new(InMemoryBlockStorage::new(region)))
            .clone()
    }
}

#[async_trait]
impl BlockStorageConnector for InMemoryCloud {
    async fn block_storage_client(&self, region: &str) -> Result<Arc<dyn BlockStorageApi>> {
        let store: Arc<dyn BlockStorageApi> = self.region(region).await;
        Ok(store)
    }

    fn default_region(&self) -> &str {
        &self.default_region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn create_opts(name: &str) -> CreateOpts {
        CreateOpts {
            name: name.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_list_in_order() {
        let store = InMemoryBlockStorage::new("RegionOne");

        store.create_volume_type(&create_opts("gold")).await.unwrap();
        store.create_volume_type(&create_opts("silver")).await.unwrap();
        store.create_volume_type(&create_opts("bronze")).await.unwrap();

        let names: Vec<_> = store
            .list_volume_types()
            .await
            .unwrap()
            .into_iter()
            .map(|vt| vt.name)
            .collect();
        assert_eq!(names, vec!["gold", "silver", "bronze"]);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = InMemoryBlockStorage::new("RegionOne");

        store.create_volume_type(&create_opts("gold")).await.unwrap();
        let err = store.create_volume_type(&create_opts("gold")).await.unwrap_err();
        assert_matches!(err, Error::OpenStackApi { .. });
    }

    #[tokio::test]
    async fn test_public_access_echoed() {
        let store = InMemoryBlockStorage::new("RegionOne");

        let private = store
            .create_volume_type(&CreateOpts {
                name: "private".into(),
                is_public: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!private.is_public);
        assert!(!private.public_access);

        let default = store.create_volume_type(&create_opts("default")).await.unwrap();
        assert!(default.public_access);
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let store = InMemoryBlockStorage::new("RegionOne");

        assert_matches!(store.get_volume_type("nope").await, Ok(Lookup::NotFound));
        assert_matches!(
            store.update_volume_type("nope", &UpdateOpts::default()).await,
            Ok(Lookup::NotFound)
        );
        assert_matches!(store.delete_volume_type("nope").await, Ok(Lookup::NotFound));
    }

    #[tokio::test]
    async fn test_unavailable_service() {
        let store = InMemoryBlockStorage::new("RegionOne");
        store.set_unavailable(true);

        let err = store.list_volume_types().await.unwrap_err();
        assert!(err.is_transient());
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_regions_are_isolated() {
        let cloud = InMemoryCloud::new("RegionOne");

        let one = cloud.block_storage_client("RegionOne").await.unwrap();
        one.create_volume_type(&create_opts("gold")).await.unwrap();

        let two = cloud.block_storage_client("RegionTwo").await.unwrap();
        assert!(two.list_volume_types().await.unwrap().is_empty());
        assert_eq!(cloud.region("RegionOne").await.len().await, 1);
        assert_eq!(two.region(), "RegionTwo");
    }
}
