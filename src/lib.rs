//! OpenStack Volume Type Provider
//!
//! Provider resource and data source for OpenStack Block Storage (Cinder v3)
//! volume types, served over a JSON plugin protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Plugin API (axum REST)                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Provider: schema, validate, plan, CRUD + import dispatch    │
//! │  ┌────────────────────────┐  ┌────────────────────────────┐  │
//! │  │  volume type resource  │  │  volume type data source   │  │
//! │  └───────────┬────────────┘  └──────────────┬─────────────┘  │
//! │              └──────────────┬───────────────┘                │
//! │                 BlockStorageConnector port                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Keystone v3 session + Cinder v3 client │ in-memory cloud    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`api`]: REST plugin protocol and server
//! - [`provider`]: resource and data source lifecycle logic
//! - [`schema`]: attribute schemas, validation and planning
//! - [`openstack`]: Keystone and Cinder clients, configuration, simulator
//! - [`domain`]: Core domain types and traits
//! - [`metrics`]: Prometheus operation metrics
//! - [`error`]: Error types and handling

pub mod api;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod openstack;
pub mod provider;
pub mod schema;

// Re-export commonly used types
pub use api::{handshake_line, ApiServer, ApiServerConfig, Listeners, RestRouter};

pub use domain::ports::{
    BlockStorageApi, BlockStorageConnector, CreateOpts, Lookup, UpdateOpts, VolumeType,
};

pub use error::{Error, Result};

pub use metrics::{Outcome, ProviderMetrics};

pub use openstack::{
    CinderClient, CloudsFile, ConfigOverrides, IdentitySession, InMemoryCloud, Interface,
    OpenStackConfig, OpenStackConnector,
};

pub use provider::{
    DataSourceHandler, Provider, ProviderSchema, ResourceHandler, VolumeTypeDataSource,
    VolumeTypeResource, VOLUME_TYPE_V3,
};

pub use schema::{Attribute, PlanResult, ResourceData, Schema, ValueType};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
