use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{ClientEnvelope, ClientList, ClientRequest};
use super::repo;
use crate::{
    auth::services::AuthUser,
    db::is_foreign_key_violation,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn client_routes() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients).post(save_client))
        .route("/clients/:id", delete(delete_client))
}

#[instrument(skip(state))]
pub async fn list_clients(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> ApiResult<Json<ClientList>> {
    let clients = repo::list(&state.db).await?;
    Ok(Json(ClientList { clients }))
}

#[instrument(skip(state, payload))]
pub async fn save_client(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ClientRequest>,
) -> ApiResult<Json<ClientEnvelope>> {
    let details = payload.into_details().map_err(ApiError::bad_request)?;
    let client = repo::upsert_by_email(&state.db, &details, auth.user_id).await?;
    info!(client_id = %client.id, email = %client.email, "client saved");
    Ok(Json(ClientEnvelope { client }))
}

#[instrument(skip(state))]
pub async fn delete_client(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    match repo::delete(&state.db, id).await {
        Ok(true) => {
            info!(client_id = %id, "client deleted");
            Ok(Json(json!({ "success": true })))
        }
        Ok(false) => Err(ApiError::not_found("Client not found")),
        Err(e) if is_foreign_key_violation(&e) => {
            warn!(client_id = %id, "client still has invoices");
            Err(ApiError::Conflict(
                "Client has invoices; delete them first".into(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}
