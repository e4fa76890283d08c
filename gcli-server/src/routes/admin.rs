use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use gcli_core::credentials::parse_credential;
use gcli_core::usage::ErrorEntry;
use gcli_core::CredentialStatus;
use gcli_types::{GatewayError, OwnerScope};

use crate::state::AppState;

type AdminResult<T> = Result<T, (StatusCode, String)>;

fn internal(e: GatewayError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn not_found(id: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("Credential {} not found", id))
}

pub async fn list_credentials(State(state): State<AppState>) -> Json<Vec<CredentialStatus>> {
    Json(state.pool().snapshot_all())
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Credential JSON as produced by Google tooling
    pub credential: Value,
    pub name: Option<String>,
    /// Owning user; omitted means the global pool
    pub user: Option<String>,
}

pub async fn import_credential(
    State(state): State<AppState>,
    Json(payload): Json<ImportRequest>,
) -> AdminResult<impl IntoResponse> {
    let owner = match payload.user.filter(|u| !u.is_empty()) {
        Some(user) => OwnerScope::User(user),
        None => OwnerScope::Global,
    };
    let record = parse_credential(&payload.credential.to_string(), payload.name.as_deref(), owner)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let id = record.id.clone();
    let kind = record.kind();
    state.pool().add(record).await.map_err(internal)?;
    info!("[Admin] Imported credential {}", id);
    Ok((StatusCode::CREATED, Json(json!({"id": id, "kind": kind}))))
}

pub async fn delete_credential(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AdminResult<StatusCode> {
    if state.pool().remove(&id).await.map_err(internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&id))
    }
}

pub async fn enable_credential(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AdminResult<StatusCode> {
    if state.pool().enable(&id).await.map_err(internal)? {
        Ok(StatusCode::OK)
    } else {
        Err(not_found(&id))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DisableRequest {
    pub reason: Option<String>,
}

pub async fn disable_credential(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<DisableRequest>>,
) -> AdminResult<StatusCode> {
    let reason = payload
        .and_then(|Json(p)| p.reason)
        .unwrap_or_else(|| "disabled by operator".to_string());
    if state.pool().disable(&id, &reason).await.map_err(internal)? {
        Ok(StatusCode::OK)
    } else {
        Err(not_found(&id))
    }
}

pub async fn reload(State(state): State<AppState>) -> AdminResult<Json<Value>> {
    let loaded = state.pool().reload().await.map_err(internal)?;
    Ok(Json(json!({"loaded": loaded})))
}

#[derive(Debug, Deserialize)]
pub struct ErrorsQuery {
    pub limit: Option<usize>,
}

pub async fn recent_errors(
    State(state): State<AppState>,
    Query(query): Query<ErrorsQuery>,
) -> Json<Vec<ErrorEntry>> {
    Json(state.gateway().dispatcher().errors().recent(query.limit.unwrap_or(50)))
}
