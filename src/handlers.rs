use crate::auth::Caller;
use crate::ccs_workflow::CcsWorkflow;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::validation::parse_relationship_id;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// CCS workflow engine (registry client, store, clock).
    pub workflow: CcsWorkflow,
}

/// Health check endpoint.
///
/// Returns the service status, version, and database reachability. Always
/// answers 200 so the platform health check does not restart the service when only
/// the database is down.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "up",
        Err(e) => {
            tracing::warn!("Health check database ping failed: {}", e);
            "down"
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-bacen-api",
            "version": env!("CARGO_PKG_VERSION"),
            "database": database
        })),
    )
}

/// GET /api/bacen/ccs/relacionamento
///
/// Queries the CCS registry for the bank-account relationships of a CPF/CNPJ
/// in a period and stores the result under the caller's name.
///
/// # Arguments
///
/// * `cpfCnpj`, `dataInicio`, `dataFim`, `numProcesso`, `motivo` - Required query parameters.
/// * `caso` - Optional case label.
///
/// # Returns
///
/// * `Result<Json<Vec<QueryResult>>, AppError>` - The stored request with its
///   relationships, or a single notice when nothing was found.
pub async fn query_relationships(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Query(params): Query<RelationshipQueryParams>,
) -> Result<Json<Vec<QueryResult>>, AppError> {
    tracing::info!(
        "CCS relationship query by {} ({})",
        caller.document,
        caller.unit
    );

    let results = state.workflow.query_relationships(&caller, &params).await?;
    Ok(Json(results))
}

/// GET /api/bacen/ccs/detalhamento
///
/// Requests detailing of one relationship owned by the caller. Outside the
/// submission window the request is queued instead.
///
/// # Arguments
///
/// * `idRelacionamento` - Relationship id.
///
/// # Returns
///
/// * `Result<Json<Vec<DetailingResult>>, AppError>` - One `{banco, msg, status}` entry.
pub async fn request_detailing(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Query(params): Query<DetailingParams>,
) -> Result<Json<Vec<DetailingResult>>, AppError> {
    let relationship_id = parse_relationship_id(params.id_relacionamento.as_deref())?;

    let results = state
        .workflow
        .request_detailing(&caller, relationship_id)
        .await?;
    Ok(Json(results))
}

/// GET /api/bacen/ccs/requisicoesccs
///
/// Lists the caller's CCS requests, newest first, with relationships, asset
/// values and linked parties.
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<Vec<RelationshipRequest>>, AppError> {
    let requests = state.workflow.list_by_responsible(&caller).await?;
    Ok(Json(requests))
}

/// GET /api/utils/processaFilaCCS
///
/// Manual trigger for the detailing queue processor.
pub async fn process_queue(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<Vec<DetailingResult>>, AppError> {
    tracing::info!("Detailing queue processing triggered by {}", caller.document);
    let results = state.workflow.process_queue().await?;
    Ok(Json(results))
}

/// GET /api/utils/recebeBDVCCS
///
/// Manual trigger for harvesting detailing responses.
pub async fn harvest_responses(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<HarvestSummary>, AppError> {
    tracing::info!("Response harvesting triggered by {}", caller.document);
    let summary = state.workflow.harvest_responses().await?;
    Ok(Json(summary))
}
