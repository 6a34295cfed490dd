//! REST API Handlers
//!
//! Implements the plugin protocol endpoints: schema, validation, planning,
//! resource lifecycle calls and data source reads.

use crate::error::Error;
use crate::provider::Provider;
use crate::schema::{PlanResult, ResourceData};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Configuration validation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub config: ResourceData,
}

/// Plan request; `prior_state` is absent when the resource does not exist yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    #[serde(default)]
    pub prior_state: Option<ResourceData>,
    pub proposed_state: ResourceData,
}

/// Create request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub planned_state: ResourceData,
}

/// Read or delete request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentStateRequest {
    pub current_state: ResourceData,
}

/// Update request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub prior_state: ResourceData,
    pub planned_state: ResourceData,
}

/// Import request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    pub id: String,
}

/// Data source read request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceReadRequest {
    #[serde(default)]
    pub config: ResourceData,
}

/// Resulting state; `None` means the object does not exist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateResponse {
    pub state: Option<ResourceData>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// State the host must keep despite the failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ResourceData>,
}

impl ApiErrorResponse {
    fn from_error(e: &Error) -> (StatusCode, Self) {
        let (status, code) = match e {
            Error::UnknownResourceType(_) => (StatusCode::NOT_FOUND, "unknown_resource_type"),
            e if e.is_validation() => (StatusCode::BAD_REQUEST, "validation_failed"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "operation_failed"),
        };

        let cause = match e {
            Error::Tainted { source, .. } => source.as_ref(),
            e => e,
        };
        let details = match cause {
            Error::Operation { source, .. } => Some(source.to_string()),
            _ => None,
        };

        (
            status,
            Self {
                error: code.into(),
                message: e.to_string(),
                details,
                state: e.partial_state().cloned(),
            },
        )
    }
}

fn error_response(operation: &str, type_name: &str, e: Error) -> Response {
    let (status, body) = ApiErrorResponse::from_error(&e);
    if status.is_server_error() {
        error!("{} {} failed: {}", operation, type_name, e);
    } else {
        debug!("{} {} rejected: {}", operation, type_name, e);
    }
    (status, Json(body)).into_response()
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    provider: Arc<Provider>,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            provider: self.provider,
        };

        Router::new()
            .route("/v1/schema", get(get_schema))
            // Resource endpoints
            .route("/v1/resources/:type_name/validate", post(validate_resource))
            .route("/v1/resources/:type_name/plan", post(plan_resource))
            .route("/v1/resources/:type_name/create", post(create_resource))
            .route("/v1/resources/:type_name/read", post(read_resource))
            .route("/v1/resources/:type_name/update", post(update_resource))
            .route("/v1/resources/:type_name/delete", post(delete_resource))
            .route("/v1/resources/:type_name/import", post(import_resource))
            // Data source endpoints
            .route("/v1/data-sources/:type_name/validate", post(validate_data_source))
            .route("/v1/data-sources/:type_name/read", post(read_data_source))
            // Health endpoints
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    provider: Arc<Provider>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn get_schema(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.provider.schema()))
}

async fn validate_resource(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Json(request): Json<ValidateRequest>,
) -> Response {
    match state.provider.validate_resource_config(&type_name, &request.config) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response("validate", &type_name, e),
    }
}

async fn plan_resource(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Json(request): Json<PlanRequest>,
) -> Response {
    let plan: Result<PlanResult, Error> = state.provider.plan(
        &type_name,
        request.prior_state.as_ref(),
        &request.proposed_state,
    );

    match plan {
        Ok(plan) => (StatusCode::OK, Json(plan)).into_response(),
        Err(e) => error_response("plan", &type_name, e),
    }
}

async fn create_resource(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Json(request): Json<CreateRequest>,
) -> Response {
    info!("Creating {}", type_name);

    match state.provider.create(&type_name, request.planned_state).await {
        Ok(d) => (StatusCode::OK, Json(StateResponse { state: Some(d) })).into_response(),
        Err(e) => error_response("create", &type_name, e),
    }
}

async fn read_resource(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Json(request): Json<CurrentStateRequest>,
) -> Response {
    match state.provider.read(&type_name, request.current_state).await {
        Ok(d) => (StatusCode::OK, Json(StateResponse { state: d })).into_response(),
        Err(e) => error_response("read", &type_name, e),
    }
}

async fn update_resource(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Json(request): Json<UpdateRequest>,
) -> Response {
    info!("Updating {} {}", type_name, request.prior_state.id().unwrap_or_default());

    match state
        .provider
        .update(&type_name, request.prior_state, request.planned_state)
        .await
    {
        Ok(d) => (StatusCode::OK, Json(StateResponse { state: Some(d) })).into_response(),
        Err(e) => error_response("update", &type_name, e),
    }
}

async fn delete_resource(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Json(request): Json<CurrentStateRequest>,
) -> Response {
    info!("Deleting {} {}", type_name, request.current_state.id().unwrap_or_default());

    match state.provider.delete(&type_name, request.current_state).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response("delete", &type_name, e),
    }
}

async fn import_resource(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Json(request): Json<ImportRequest>,
) -> Response {
    info!("Importing {} {}", type_name, request.id);

    match state.provider.import(&type_name, &request.id).await {
        Ok(d) => (StatusCode::OK, Json(StateResponse { state: Some(d) })).into_response(),
        Err(e) => error_response("import", &type_name, e),
    }
}

async fn validate_data_source(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Json(request): Json<ValidateRequest>,
) -> Response {
    match state.provider.validate_data_source_config(&type_name, &request.config) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response("validate", &type_name, e),
    }
}

async fn read_data_source(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Json(request): Json<DataSourceReadRequest>,
) -> Response {
    match state.provider.read_data_source(&type_name, request.config).await {
        Ok(d) => (StatusCode::OK, Json(StateResponse { state: d })).into_response(),
        Err(e) => error_response("read data source", &type_name, e),
    }
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.provider.schema().resources.is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "no resources registered")
    } else {
        (StatusCode::OK, "ready")
    }
}
