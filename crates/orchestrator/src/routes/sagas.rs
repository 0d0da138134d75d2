//! Saga creation, inspection and operator purge endpoints.
//!
//! Every request names its tenant through the `TENANT_ID`, `REGION`,
//! `MAJOR_VERSION` and `MINOR_VERSION` headers used on the wire.

use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use common::{Tenant, TransactionId};
use messaging::tenant::{
    Headers, MAJOR_VERSION_HEADER, MINOR_VERSION_HEADER, REGION_HEADER, TENANT_ID_HEADER,
    read_tenant,
};
use saga::{Saga, SagaDefinition, SagaOrchestrator, SagaType};
use saga_store::{SagaStatus, SagaStore};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: SagaStore> {
    pub orchestrator: Arc<SagaOrchestrator<S>>,
}

/// Tenant taken from the request headers.
#[derive(Debug, Clone)]
pub struct RequestTenant(pub Tenant);

impl<St: Send + Sync> FromRequestParts<St> for RequestTenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let mut headers = Headers::new();
        for name in [
            TENANT_ID_HEADER,
            REGION_HEADER,
            MAJOR_VERSION_HEADER,
            MINOR_VERSION_HEADER,
        ] {
            if let Some(value) = parts.headers.get(name).and_then(|v| v.to_str().ok()) {
                headers.insert(name.to_string(), value.to_string());
            }
        }

        read_tenant(&headers)
            .map(RequestTenant)
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

/// One row of the saga listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaSummary {
    pub transaction_id: TransactionId,
    pub saga_type: SagaType,
    pub status: SagaStatus,
    pub current_step_index: usize,
    pub step_count: usize,
    pub compensation_incomplete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Saga> for SagaSummary {
    fn from(saga: &Saga) -> Self {
        Self {
            transaction_id: saga.transaction_id,
            saga_type: saga.saga_type,
            status: saga.status,
            current_step_index: saga.current_step_index,
            step_count: saga.steps.len(),
            compensation_incomplete: saga.compensation_incomplete,
            created_at: saga.created_at,
            updated_at: saga.updated_at,
        }
    }
}

/// POST /sagas: create a saga and dispatch its first step.
#[tracing::instrument(skip(state, definition), fields(tenant = %tenant.id))]
pub async fn create<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestTenant(tenant): RequestTenant,
    Json(definition): Json<SagaDefinition>,
) -> Result<(StatusCode, Json<Saga>), ApiError> {
    let saga = state
        .orchestrator
        .create_from_definition(tenant, definition)
        .await?;
    Ok((StatusCode::CREATED, Json(saga)))
}

/// GET /sagas: list the tenant's sagas, optionally filtered by status.
#[tracing::instrument(skip(state), fields(tenant = %tenant.id))]
pub async fn list<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestTenant(tenant): RequestTenant,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<SagaSummary>>, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(|s| s.to_ascii_uppercase().parse::<SagaStatus>())
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let sagas = state.orchestrator.list_sagas(tenant.id, status).await?;
    Ok(Json(sagas.iter().map(SagaSummary::from).collect()))
}

/// GET /sagas/{id}: load one saga with its steps.
#[tracing::instrument(skip(state), fields(tenant = %tenant.id))]
pub async fn get<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<String>,
) -> Result<Json<Saga>, ApiError> {
    let transaction_id = parse_transaction_id(&id)?;
    let saga = state
        .orchestrator
        .get_saga(tenant.id, transaction_id)
        .await?;
    Ok(Json(saga))
}

/// DELETE /sagas/{id}: operator purge of a terminal saga.
#[tracing::instrument(skip(state), fields(tenant = %tenant.id))]
pub async fn purge<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let transaction_id = parse_transaction_id(&id)?;
    state.orchestrator.purge(tenant.id, transaction_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_transaction_id(id: &str) -> Result<TransactionId, ApiError> {
    TransactionId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid saga id: {e}")))
}
