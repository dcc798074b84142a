use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use rand::{distributions::Alphanumeric, Rng};
use tracing::{info, instrument, warn};

use super::dto::{CreateInviteRequest, InviteEnvelope, InviteList};
use super::repo;
use crate::{
    auth::{
        repo_types::Role,
        services::{is_valid_email, normalize_email, AdminUser},
    },
    error::{ApiError, ApiResult},
    state::AppState,
};

const TOKEN_LEN: usize = 32;

pub fn invite_routes() -> Router<AppState> {
    Router::new().route("/invites", post(create_invite).get(list_invites))
}

fn new_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[instrument(skip(state, payload))]
pub async fn create_invite(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CreateInviteRequest>,
) -> ApiResult<(StatusCode, Json<InviteEnvelope>)> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(%email, "invalid invite email");
        return Err(ApiError::bad_request("Invalid email"));
    }
    let role = payload.role.unwrap_or(Role::Team);
    let token = new_token();

    let invite = repo::create(&state.db, &email, &token, role, admin.user_id).await?;
    info!(
        invite_id = %invite.id,
        %email,
        ?role,
        invited_by = %admin.email,
        "invite created"
    );
    Ok((StatusCode::CREATED, Json(InviteEnvelope { invite })))
}

#[instrument(skip(state))]
pub async fn list_invites(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Json<InviteList>> {
    let invites = repo::list(&state.db).await?;
    Ok(Json(InviteList { invites }))
}
