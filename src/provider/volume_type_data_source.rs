//! `openstack_blockstorage_volume_type_v3` data source
//!
//! Looks a volume type up by exact name. Cinder does not enforce unique
//! names; when several types share the queried name the first one in listing
//! order is used and the others are reported in a warning.

use super::{block_storage_client, set_volume_type_attributes, DataSourceHandler, VOLUME_TYPE_V3};
use crate::domain::ports::BlockStorageConnector;
use crate::error::Result;
use crate::schema::{Attribute, ResourceData, Schema};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct VolumeTypeDataSource {
    connector: Arc<dyn BlockStorageConnector>,
}

impl VolumeTypeDataSource {
    pub fn new(connector: Arc<dyn BlockStorageConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl DataSourceHandler for VolumeTypeDataSource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("region", Attribute::string().optional().computed())
            .with_attribute("name", Attribute::string().required())
            .with_attribute("description", Attribute::string().optional().computed())
            .with_attribute("qos_specs_id", Attribute::string().optional().computed())
            .with_attribute("extra_specs", Attribute::map().optional().computed())
            .with_attribute("os_volume_type_access", Attribute::bool().computed())
            .with_attribute("is_public", Attribute::bool().computed())
    }

    async fn read(&self, d: &mut ResourceData) -> Result<()> {
        let (client, region) = block_storage_client(d, self.connector.as_ref()).await?;

        let volume_types = client
            .list_volume_types()
            .await
            .map_err(|e| e.context(format!("Unable to query {}", VOLUME_TYPE_V3)))?;

        let name = d.get_string("name");
        let mut matches = volume_types.iter().filter(|vt| vt.name == name);

        let Some(volume_type) = matches.next() else {
            debug!("No {} named {:?} in {}", VOLUME_TYPE_V3, name, region);
            return Ok(());
        };

        let others: Vec<&str> = matches.map(|vt| vt.id.as_str()).collect();
        if !others.is_empty() {
            warn!(
                "Multiple {} named {:?}: using {}, ignoring {:?}",
                VOLUME_TYPE_V3, name, volume_type.id, others
            );
        }

        d.set_id(volume_type.id.as_str());
        set_volume_type_attributes(d, volume_type, &region);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{BlockStorageApi, CreateOpts, VolumeType};
    use crate::openstack::InMemoryCloud;
    use serde_json::json;

    fn setup() -> (VolumeTypeDataSource, Arc<InMemoryCloud>) {
        let cloud = Arc::new(InMemoryCloud::new("RegionOne"));
        (VolumeTypeDataSource::new(cloud.clone()), cloud)
    }

    fn query(name: &str) -> ResourceData {
        ResourceData::from_value(json!({ "name": name })).unwrap()
    }

    fn named(id: &str, name: &str, description: &str) -> VolumeType {
        VolumeType {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            is_public: true,
            public_access: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_exact_name_match() {
        let (data_source, cloud) = setup();
        let store = cloud.region("RegionOne").await;
        for name in ["gold", "gold-fast", "silver"] {
            store
                .create_volume_type(&CreateOpts {
                    name: name.into(),
                    extra_specs: [("tier".to_string(), name.to_string())].into(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let mut d = query("gold");
        data_source.read(&mut d).await.unwrap();

        assert!(d.id().is_some());
        assert_eq!(d.get_string("name"), "gold");
        assert_eq!(d.get_string("region"), "RegionOne");
        assert!(d.get_bool("is_public"));
        assert_eq!(d.get_string_map("extra_specs")["tier"], "gold");
    }

    #[tokio::test]
    async fn test_duplicate_names_return_first_listed() {
        let (data_source, cloud) = setup();
        let store = cloud.region("RegionOne").await;
        store.insert(named("vt-b", "dup", "first")).await;
        store.insert(named("vt-a", "dup", "second")).await;

        let mut d = query("dup");
        data_source.read(&mut d).await.unwrap();
        assert_eq!(d.id(), Some("vt-b"));
        assert_eq!(d.get_string("description"), "first");
    }

    #[tokio::test]
    async fn test_no_match_leaves_state_unset() {
        let (data_source, cloud) = setup();
        cloud.region("RegionOne").await.insert(named("vt-1", "Gold", "")).await;

        let mut d = query("gold");
        data_source.read(&mut d).await.unwrap();
        assert_eq!(d.id(), None);
        assert!(!d.contains("description"));
    }

    #[tokio::test]
    async fn test_list_failure_is_fatal() {
        let (data_source, cloud) = setup();
        cloud.region("RegionOne").await.set_unavailable(true);

        let err = data_source.read(&mut query("gold")).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Unable to query openstack_blockstorage_volume_type_v3:"));
    }
}
