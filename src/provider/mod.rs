//! Provider
//!
//! Registers the volume type resource and data source, dispatches lifecycle
//! calls to them by type name, and records metrics for every call.

pub mod volume_type;
pub mod volume_type_data_source;

pub use volume_type::VolumeTypeResource;
pub use volume_type_data_source::VolumeTypeDataSource;

use crate::domain::ports::{BlockStorageApi, BlockStorageConnector, Lookup, VolumeType};
use crate::error::{Error, Result};
use crate::metrics::{Outcome, ProviderMetrics};
use crate::schema::{PlanResult, ResourceData, Schema};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Type name of the volume type resource and data source
pub const VOLUME_TYPE_V3: &str = "openstack_blockstorage_volume_type_v3";

// =============================================================================
// Handler Traits
// =============================================================================

/// Lifecycle callbacks of a managed resource
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn schema(&self) -> Schema;

    async fn create(&self, d: &mut ResourceData) -> Result<()>;

    /// Refresh state; clears the id when the remote object is gone
    async fn read(&self, d: &mut ResourceData) -> Result<()>;

    async fn update(&self, d: &mut ResourceData) -> Result<()>;

    async fn delete(&self, d: &mut ResourceData) -> Result<()>;

    /// Import by remote id, passing straight through to read
    async fn import(&self, id: &str) -> Result<ResourceData> {
        let mut d = ResourceData::new().with_id(id);
        self.read(&mut d).await?;

        if d.id().is_none() {
            return Err(Error::ImportNotFound(id.to_string()));
        }
        Ok(d)
    }
}

/// Read callback of a data source
#[async_trait]
pub trait DataSourceHandler: Send + Sync {
    fn schema(&self) -> Schema;

    /// Populate `d` from the remote system; leaves the id unset on no match
    async fn read(&self, d: &mut ResourceData) -> Result<()>;
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Region named by the resource, or the connector's default
pub fn get_region(d: &ResourceData, connector: &dyn BlockStorageConnector) -> String {
    match d.get_string("region") {
        region if !region.is_empty() => region,
        _ => connector.default_region().to_string(),
    }
}

/// Build the block storage client for the resource's region
pub async fn block_storage_client(
    d: &ResourceData,
    connector: &dyn BlockStorageConnector,
) -> Result<(Arc<dyn BlockStorageApi>, String)> {
    let region = get_region(d, connector);
    let client = connector
        .block_storage_client(&region)
        .await
        .map_err(|e| e.context("Error creating OpenStack block storage client"))?;
    Ok((client, region))
}

/// Resolve a lookup, clearing the id when the remote object is gone
pub fn check_deleted<T>(d: &mut ResourceData, lookup: Lookup<T>, what: &str) -> Option<T> {
    match lookup {
        Lookup::Found(value) => Some(value),
        Lookup::NotFound => {
            warn!(
                "{} {} no longer exists, removing from state",
                what,
                d.id().unwrap_or_default()
            );
            d.clear_id();
            None
        }
    }
}

/// Copy every attribute of a volume type into `d`
pub fn set_volume_type_attributes(d: &mut ResourceData, volume_type: &VolumeType, region: &str) {
    d.set("name", volume_type.name.as_str());
    d.set("description", volume_type.description.as_str());
    d.set("os_volume_type_access", volume_type.public_access);
    d.set("qos_specs_id", volume_type.qos_specs_id.as_str());
    d.set("is_public", volume_type.is_public);
    d.set_string_map("extra_specs", &volume_type.extra_specs);
    d.set("region", region);
}

// =============================================================================
// Provider Schema
// =============================================================================

/// Schemas of everything the provider serves
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSchema {
    pub resources: BTreeMap<String, Schema>,
    pub data_sources: BTreeMap<String, Schema>,
    /// JSON Schema of the remote object as returned by the block storage API
    pub remote_object: serde_json::Value,
}

// =============================================================================
// Provider
// =============================================================================

/// Dispatches lifecycle calls to registered resources and data sources
pub struct Provider {
    resources: BTreeMap<String, Arc<dyn ResourceHandler>>,
    data_sources: BTreeMap<String, Arc<dyn DataSourceHandler>>,
    metrics: Arc<ProviderMetrics>,
}

impl Provider {
    /// Create a provider serving the volume type resource and data source
    pub fn new(connector: Arc<dyn BlockStorageConnector>, metrics: Arc<ProviderMetrics>) -> Self {
        let mut resources: BTreeMap<String, Arc<dyn ResourceHandler>> = BTreeMap::new();
        resources.insert(
            VOLUME_TYPE_V3.to_string(),
            Arc::new(VolumeTypeResource::new(connector.clone())),
        );

        let mut data_sources: BTreeMap<String, Arc<dyn DataSourceHandler>> = BTreeMap::new();
        data_sources.insert(
            VOLUME_TYPE_V3.to_string(),
            Arc::new(VolumeTypeDataSource::new(connector)),
        );

        Self {
            resources,
            data_sources,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<ProviderMetrics> {
        &self.metrics
    }

    pub fn schema(&self) -> ProviderSchema {
        ProviderSchema {
            resources: self
                .resources
                .iter()
                .map(|(name, handler)| (name.clone(), handler.schema()))
                .collect(),
            data_sources: self
                .data_sources
                .iter()
                .map(|(name, handler)| (name.clone(), handler.schema()))
                .collect(),
            remote_object: serde_json::to_value(schemars::schema_for!(VolumeType))
                .unwrap_or_default(),
        }
    }

    fn resource(&self, type_name: &str) -> Result<&Arc<dyn ResourceHandler>> {
        self.resources
            .get(type_name)
            .ok_or_else(|| Error::UnknownResourceType(type_name.to_string()))
    }

    fn data_source(&self, type_name: &str) -> Result<&Arc<dyn DataSourceHandler>> {
        self.data_sources
            .get(type_name)
            .ok_or_else(|| Error::UnknownResourceType(type_name.to_string()))
    }

    async fn observed<T, F>(&self, kind: &str, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<(T, Outcome)>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let outcome = match &result {
            Ok((_, outcome)) => *outcome,
            Err(_) => Outcome::Error,
        };
        self.metrics.observe(kind, operation, outcome, started.elapsed());
        result.map(|(value, _)| value)
    }

    pub fn validate_resource_config(&self, type_name: &str, config: &ResourceData) -> Result<()> {
        self.resource(type_name)?.schema().validate(config)
    }

    pub fn validate_data_source_config(&self, type_name: &str, config: &ResourceData) -> Result<()> {
        self.data_source(type_name)?.schema().validate(config)
    }

    /// Plan the transition from prior to proposed state
    pub fn plan(
        &self,
        type_name: &str,
        prior: Option<&ResourceData>,
        proposed: &ResourceData,
    ) -> Result<PlanResult> {
        let schema = self.resource(type_name)?.schema();
        schema.validate(proposed)?;

        // A prior state without id describes nothing
        let prior = prior.filter(|p| p.id().is_some());
        let plan = schema.plan(prior, proposed);

        debug!(
            "Planned {}: changed={:?} requires_replace={:?}",
            type_name, plan.changed, plan.requires_replace
        );
        Ok(plan)
    }

    pub async fn create(&self, type_name: &str, planned: ResourceData) -> Result<ResourceData> {
        let handler = self.resource(type_name)?.clone();
        self.observed("resource", "create", async move {
            let mut d = planned;
            if let Err(e) = handler.create(&mut d).await {
                // Once an id is assigned the remote object exists
                if d.id().is_some() {
                    return Err(Error::Tainted {
                        state: Box::new(d),
                        source: Box::new(e),
                    });
                }
                return Err(e);
            }
            Ok::<_, Error>((d, Outcome::Success))
        })
        .await
    }

    /// Refresh state; `None` means the remote object is gone
    pub async fn read(&self, type_name: &str, current: ResourceData) -> Result<Option<ResourceData>> {
        let handler = self.resource(type_name)?.clone();
        self.observed("resource", "read", async move {
            let mut d = current;
            handler.read(&mut d).await?;
            Ok::<_, Error>(if d.id().is_some() {
                (Some(d), Outcome::Success)
            } else {
                (None, Outcome::Gone)
            })
        })
        .await
    }

    pub async fn update(
        &self,
        type_name: &str,
        prior: ResourceData,
        planned: ResourceData,
    ) -> Result<ResourceData> {
        let handler = self.resource(type_name)?.clone();
        if prior.id().is_none() {
            return Err(Error::Validation(
                "update requires a prior state with an id".into(),
            ));
        }

        // Unset attributes keep their prior value or reset to zero, as in plan
        let plan = handler.schema().plan(Some(&prior), &planned);
        if plan.requires_replacement() {
            return Err(Error::Validation(format!(
                "cannot update {} in place, changed attributes force replacement: {}",
                type_name,
                plan.requires_replace.join(", ")
            )));
        }

        self.observed("resource", "update", async move {
            let mut d = plan.planned_state;
            handler.update(&mut d).await?;
            Ok::<_, Error>((d, Outcome::Success))
        })
        .await
    }

    pub async fn delete(&self, type_name: &str, current: ResourceData) -> Result<()> {
        let handler = self.resource(type_name)?.clone();
        self.observed("resource", "delete", async move {
            let mut d = current;
            handler.delete(&mut d).await?;
            Ok::<_, Error>(((), Outcome::Success))
        })
        .await
    }

    pub async fn import(&self, type_name: &str, id: &str) -> Result<ResourceData> {
        let handler = self.resource(type_name)?.clone();
        self.observed("resource", "import", async move {
            Ok::<_, Error>((handler.import(id).await?, Outcome::Success))
        })
        .await
    }

    /// Read a data source; `None` means nothing matched
    pub async fn read_data_source(
        &self,
        type_name: &str,
        config: ResourceData,
    ) -> Result<Option<ResourceData>> {
        let handler = self.data_source(type_name)?.clone();
        handler.schema().validate(&config)?;

        self.observed("data_source", "read", async move {
            let mut d = config;
            handler.read(&mut d).await?;
            Ok::<_, Error>(if d.id().is_some() {
                (Some(d), Outcome::Success)
            } else {
                (None, Outcome::Gone)
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{CreateOpts, UpdateOpts};
    use crate::openstack::{InMemoryBlockStorage, InMemoryCloud};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn provider() -> (Provider, Arc<InMemoryCloud>) {
        let cloud = Arc::new(InMemoryCloud::new("RegionOne"));
        let metrics = Arc::new(ProviderMetrics::new().unwrap());
        (Provider::new(cloud.clone(), metrics), cloud)
    }

    fn data(value: serde_json::Value) -> ResourceData {
        ResourceData::from_value(value).unwrap()
    }

    #[test]
    fn test_schema_lists_resource_and_data_source() {
        let (provider, _) = provider();
        let schema = provider.schema();

        let resource = &schema.resources[VOLUME_TYPE_V3];
        assert!(resource.attribute("name").unwrap().force_new);
        assert!(resource.attribute("is_public").unwrap().force_new);
        assert!(resource.attribute("region").unwrap().force_new);
        assert!(!resource.attribute("description").unwrap().force_new);

        let data_source = &schema.data_sources[VOLUME_TYPE_V3];
        assert!(data_source.attribute("name").unwrap().required);
        assert!(schema.remote_object.is_object());
    }

    #[test]
    fn test_get_region_falls_back_to_default() {
        let cloud = InMemoryCloud::new("RegionOne");
        assert_eq!(get_region(&ResourceData::new(), &cloud), "RegionOne");
        assert_eq!(get_region(&data(json!({"region": "RegionTwo"})), &cloud), "RegionTwo");
    }

    #[test]
    fn test_check_deleted_clears_id() {
        let mut d = ResourceData::new().with_id("vt-1");
        assert_eq!(check_deleted(&mut d, Lookup::Found(5), "thing"), Some(5));
        assert_eq!(d.id(), Some("vt-1"));

        assert_eq!(check_deleted::<u32>(&mut d, Lookup::NotFound, "thing"), None);
        assert_eq!(d.id(), None);
    }

    #[tokio::test]
    async fn test_unknown_type_rejected() {
        let (provider, _) = provider();
        let err = provider
            .create("openstack_compute_instance_v2", ResourceData::new())
            .await
            .unwrap_err();
        assert_matches!(err, Error::UnknownResourceType(_));
    }

    #[tokio::test]
    async fn test_read_gone_is_recorded() {
        let (provider, _) = provider();

        let state = provider
            .read(VOLUME_TYPE_V3, ResourceData::new().with_id("missing"))
            .await
            .unwrap();
        assert!(state.is_none());
        assert_eq!(provider.metrics().count("resource", "read", Outcome::Gone), 1);
    }

    #[tokio::test]
    async fn test_plan_rejects_invalid_config() {
        let (provider, _) = provider();
        let err = provider
            .plan(VOLUME_TYPE_V3, None, &data(json!({"name": true})))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_update_takes_id_from_prior() {
        let (provider, cloud) = provider();
        let store = cloud.region("RegionOne").await;
        let created = store
            .create_volume_type(&CreateOpts {
                name: "gold".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let prior = provider
            .read(VOLUME_TYPE_V3, ResourceData::new().with_id(created.id.as_str()))
            .await
            .unwrap()
            .unwrap();
        let planned = data(json!({"name": "gold", "description": "updated", "is_public": true}));

        let state = provider.update(VOLUME_TYPE_V3, prior, planned).await.unwrap();
        assert_eq!(state.id(), Some(created.id.as_str()));
        assert_eq!(state.get_string("description"), "updated");
    }

    #[tokio::test]
    async fn test_update_rejects_force_new_change() {
        let (provider, cloud) = provider();
        let prior = provider
            .create(
                VOLUME_TYPE_V3,
                data(json!({"name": "gold", "description": "keep", "is_public": true})),
            )
            .await
            .unwrap();
        let id = prior.id().unwrap().to_string();

        // Omitting is_public resets it to false, which needs a new volume type
        let err = provider
            .update(VOLUME_TYPE_V3, prior, data(json!({"name": "gold", "extra_specs": {"a": "b"}})))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("is_public"));

        let stored = cloud
            .region("RegionOne")
            .await
            .get_volume_type(&id)
            .await
            .unwrap()
            .found()
            .unwrap();
        assert!(stored.is_public);
        assert_eq!(stored.description, "keep");
    }

    #[tokio::test]
    async fn test_update_keeps_unset_attributes_from_prior() {
        let (provider, _) = provider();
        let prior = provider
            .create(
                VOLUME_TYPE_V3,
                data(json!({"name": "gold", "description": "keep", "is_public": true})),
            )
            .await
            .unwrap();

        let state = provider
            .update(VOLUME_TYPE_V3, prior, data(json!({"name": "gold", "is_public": true})))
            .await
            .unwrap();
        assert_eq!(state.get_string("description"), "keep");
        assert!(state.get_bool("is_public"));
    }

    #[tokio::test]
    async fn test_update_without_prior_id_rejected() {
        let (provider, _) = provider();
        let err = provider
            .update(VOLUME_TYPE_V3, ResourceData::new(), data(json!({"name": "gold"})))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    /// Block storage whose reads fail while writes succeed
    struct FailingReads {
        inner: Arc<InMemoryBlockStorage>,
    }

    #[async_trait]
    impl BlockStorageApi for FailingReads {
        async fn list_volume_types(&self) -> Result<Vec<VolumeType>> {
            self.inner.list_volume_types().await
        }

        async fn get_volume_type(&self, id: &str) -> Result<Lookup<VolumeType>> {
            Err(Error::UnexpectedStatus {
                method: "GET".into(),
                url: format!("memory://RegionOne/types/{}", id),
                status: 503,
                body: "block storage service unavailable".into(),
            })
        }

        async fn create_volume_type(&self, opts: &CreateOpts) -> Result<VolumeType> {
            self.inner.create_volume_type(opts).await
        }

        async fn update_volume_type(&self, id: &str, opts: &UpdateOpts) -> Result<Lookup<VolumeType>> {
            self.inner.update_volume_type(id, opts).await
        }

        async fn delete_volume_type(&self, id: &str) -> Result<Lookup<()>> {
            self.inner.delete_volume_type(id).await
        }

        fn region(&self) -> &str {
            self.inner.region()
        }
    }

    #[async_trait]
    impl BlockStorageConnector for FailingReads {
        async fn block_storage_client(&self, _region: &str) -> Result<Arc<dyn BlockStorageApi>> {
            let client: Arc<dyn BlockStorageApi> = Arc::new(FailingReads {
                inner: self.inner.clone(),
            });
            Ok(client)
        }

        fn default_region(&self) -> &str {
            self.inner.region()
        }
    }

    #[tokio::test]
    async fn test_create_keeps_id_when_read_back_fails() {
        let store = Arc::new(InMemoryBlockStorage::new("RegionOne"));
        let connector = Arc::new(FailingReads {
            inner: store.clone(),
        });
        let provider = Provider::new(connector, Arc::new(ProviderMetrics::new().unwrap()));

        let err = provider
            .create(VOLUME_TYPE_V3, data(json!({"name": "gold"})))
            .await
            .unwrap_err();

        assert!(err
            .to_string()
            .starts_with("Error retrieving openstack_blockstorage_volume_type_v3:"));
        let remote = store.list_volume_types().await.unwrap();
        assert_eq!(remote.len(), 1);

        let state = err.partial_state().unwrap();
        assert_eq!(state.id(), Some(remote[0].id.as_str()));
        assert_eq!(provider.metrics().count("resource", "create", Outcome::Error), 1);
    }

    #[tokio::test]
    async fn test_create_failure_without_id_has_no_state() {
        let (provider, cloud) = provider();
        cloud.region("RegionOne").await.set_unavailable(true);

        let err = provider
            .create(VOLUME_TYPE_V3, data(json!({"name": "gold"})))
            .await
            .unwrap_err();
        assert!(err.partial_state().is_none());
    }

    #[tokio::test]
    async fn test_data_source_requires_name() {
        let (provider, _) = provider();
        let err = provider
            .read_data_source(VOLUME_TYPE_V3, ResourceData::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing required attribute \"name\""));
    }
}
