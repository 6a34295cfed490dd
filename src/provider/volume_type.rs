//! `openstack_blockstorage_volume_type_v3` resource

use super::{
    block_storage_client, check_deleted, set_volume_type_attributes, ResourceHandler,
    VOLUME_TYPE_V3,
};
use crate::domain::ports::{BlockStorageConnector, CreateOpts, Lookup, UpdateOpts};
use crate::error::{Error, Result};
use crate::schema::{Attribute, ResourceData, Schema};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Manages one Cinder volume type identified by its server-assigned id
pub struct VolumeTypeResource {
    connector: Arc<dyn BlockStorageConnector>,
}

impl VolumeTypeResource {
    pub fn new(connector: Arc<dyn BlockStorageConnector>) -> Self {
        Self { connector }
    }

    fn require_id(d: &ResourceData) -> Result<String> {
        d.id()
            .map(str::to_string)
            .ok_or_else(|| Error::Validation(format!("{} state has no id", VOLUME_TYPE_V3)))
    }
}

#[async_trait]
impl ResourceHandler for VolumeTypeResource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "region",
                Attribute::string().optional().computed().force_new(),
            )
            .with_attribute("name", Attribute::string().optional().force_new())
            .with_attribute("description", Attribute::string().optional().computed())
            .with_attribute("qos_specs_id", Attribute::string().optional().computed())
            .with_attribute(
                "extra_specs",
                Attribute::map()
                    .optional()
                    .computed()
                    .with_description("Key/value pairs interpreted by the volume backend"),
            )
            .with_attribute(
                "os_volume_type_access",
                Attribute::bool().optional().computed(),
            )
            .with_attribute("is_public", Attribute::bool().optional().force_new())
    }

    async fn create(&self, d: &mut ResourceData) -> Result<()> {
        let (client, _) = block_storage_client(d, self.connector.as_ref()).await?;

        let opts = CreateOpts {
            name: d.get_string("name"),
            description: d.get_string("description"),
            is_public: Some(d.get_bool("is_public")),
            extra_specs: d.get_string_map("extra_specs"),
        };
        debug!("{} create options: {:?}", VOLUME_TYPE_V3, opts);

        let volume_type = client
            .create_volume_type(&opts)
            .await
            .map_err(|e| e.context(format!("Error creating {}", VOLUME_TYPE_V3)))?;

        info!("Created {} {} ({})", VOLUME_TYPE_V3, volume_type.name, volume_type.id);
        d.set_id(volume_type.id);

        self.read(d).await
    }

    async fn read(&self, d: &mut ResourceData) -> Result<()> {
        let (client, region) = block_storage_client(d, self.connector.as_ref()).await?;
        let id = Self::require_id(d)?;

        let lookup = client
            .get_volume_type(&id)
            .await
            .map_err(|e| e.context(format!("Error retrieving {}", VOLUME_TYPE_V3)))?;

        let Some(volume_type) = check_deleted(d, lookup, VOLUME_TYPE_V3) else {
            return Ok(());
        };

        debug!("Retrieved {} {}: {:?}", VOLUME_TYPE_V3, id, volume_type);
        set_volume_type_attributes(d, &volume_type, &region);
        Ok(())
    }

    async fn update(&self, d: &mut ResourceData) -> Result<()> {
        let (client, _) = block_storage_client(d, self.connector.as_ref()).await?;
        let id = Self::require_id(d)?;

        // Extra specs and the QoS binding are not updated on this path
        let opts = UpdateOpts {
            name: Some(d.get_string("name")),
            description: Some(d.get_string("description")),
            is_public: Some(d.get_bool("is_public")),
        };

        let context = format!("Error updating {} {}", VOLUME_TYPE_V3, id);
        match client.update_volume_type(&id, &opts).await {
            Ok(Lookup::Found(_)) => {}
            Ok(Lookup::NotFound) => {
                return Err(Error::ResourceNotFound {
                    kind: VOLUME_TYPE_V3.to_string(),
                    name: id,
                }
                .context(context))
            }
            Err(e) => return Err(e.context(context)),
        }

        info!("Updated {} {}", VOLUME_TYPE_V3, id);
        self.read(d).await
    }

    async fn delete(&self, d: &mut ResourceData) -> Result<()> {
        let (client, _) = block_storage_client(d, self.connector.as_ref()).await?;
        let id = Self::require_id(d)?;

        let lookup = client
            .get_volume_type(&id)
            .await
            .map_err(|e| e.context(format!("Error retrieving {}", VOLUME_TYPE_V3)))?;
        if check_deleted(d, lookup, VOLUME_TYPE_V3).is_none() {
            return Ok(());
        }

        let lookup = client
            .delete_volume_type(&id)
            .await
            .map_err(|e| e.context(format!("Error deleting {}", VOLUME_TYPE_V3)))?;
        check_deleted(d, lookup, VOLUME_TYPE_V3);

        info!("Deleted {} {}", VOLUME_TYPE_V3, id);
        d.clear_id();
        Ok(())
    }
}
