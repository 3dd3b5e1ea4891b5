use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
    routing::post,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::db::services::{IngestError, endpoint_service, ingest_service};
use crate::services::credential_service;
use crate::web::{AppError, AppState};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Serialize)]
pub struct IngestResponse {
    ok: bool,
    snapshot_id: i32,
}

pub fn create_ingest_router() -> Router<Arc<AppState>> {
    Router::new().route("/ingest", post(ingest_handler))
}

async fn ingest_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, AppError> {
    let api_key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = credential_service::extract_token(api_key, authorization)
        .ok_or_else(|| AppError::Unauthorized("Missing API token".to_string()))?;
    let endpoint = endpoint_service::resolve_endpoint(&app_state.db_pool, &token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))?;

    let document: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(endpoint_id = endpoint.id, error = %e, "Rejected undecodable ingest body.");
        IngestError::MalformedRequest(format!("Invalid JSON body: {e}"))
    })?;

    let endpoint_id = endpoint.id;
    let snapshot_id = ingest_service::ingest_snapshot(&app_state.db_pool, endpoint, document)
        .await
        .inspect_err(|e| warn!(endpoint_id, error = %e, "Ingest rejected."))?;

    Ok(Json(IngestResponse {
        ok: true,
        snapshot_id,
    }))
}
