//! Error types for the volume type provider
//!
//! Provides structured error types for configuration, identity, the block
//! storage API and the provider lifecycle callbacks.

use crate::schema::ResourceData;
use thiserror::Error;

/// Unified error type for the provider
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An error wrapped with the name of the operation that failed
    #[error("{context}: {source}")]
    Operation {
        context: String,
        #[source]
        source: Box<Error>,
    },

    /// A call that failed after the remote object was created; the host must
    /// keep `state` so the object is not orphaned
    #[error("{source}")]
    Tainted {
        state: Box<ResourceData>,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // OpenStack Errors
    // =========================================================================
    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("OpenStack API error: {service} - {reason}")]
    OpenStackApi { service: String, reason: String },

    #[error("OpenStack API returned status {status} for {method} {url}: {body}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("No {service_type} endpoint found in catalog for region {region} ({interface})")]
    EndpointNotFound {
        service_type: String,
        region: String,
        interface: String,
    },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Provider Errors
    // =========================================================================
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot import non-existent remote object: {0}")]
    ImportNotFound(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap this error with a message naming the failing operation
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Operation {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// State left behind by a partially applied call
    pub fn partial_state(&self) -> Option<&ResourceData> {
        match self {
            Error::Tainted { state, .. } => Some(state.as_ref()),
            _ => None,
        }
    }

    /// Check if the remote object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ResourceNotFound { .. } => true,
            Error::UnexpectedStatus { status, .. } => *status == 404,
            Error::Operation { source, .. } | Error::Tainted { source, .. } => {
                source.is_not_found()
            }
            _ => false,
        }
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::UnexpectedStatus { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            Error::Operation { source, .. } | Error::Tainted { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }

    /// Check if this error was caused by invalid caller input
    pub fn is_validation(&self) -> bool {
        match self {
            Error::Validation(_) | Error::ImportNotFound(_) => true,
            Error::Operation { source, .. } | Error::Tainted { source, .. } => {
                source.is_validation()
            }
            _ => false,
        }
    }
}

/// Result type alias for the provider
pub type Result<T> = std::result::Result<T, Error>;
