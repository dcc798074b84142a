use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest,
            SettingsRequest, SettingsResponse, UserEnvelope,
        },
        repo_types::{User, UserChanges},
        services::{
            hash_password, is_valid_email, normalize_email, verify_password, AuthUser, JwtKeys,
            MIN_PASSWORD_LEN,
        },
    },
    db::is_unique_violation,
    error::{ApiError, ApiResult},
    invites,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/settings", get(get_me).put(update_settings))
}

fn issue_tokens(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign_access(&user).map_err(|e| {
        ApiError::internal(e, "JWT_ERROR", "Failed to sign token")
    })?;
    let refresh_token = keys.sign_refresh(&user).map_err(|e| {
        ApiError::internal(e, "JWT_ERROR", "Failed to sign token")
    })?;
    Ok(AuthResponse {
        token,
        refresh_token,
        user: user.into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let name = payload.name.trim().to_string();
    let email = normalize_email(&payload.email);

    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("All fields are required."));
    }

    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(ApiError::bad_request("Invalid email"));
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::bad_request("Password too short"));
    }

    // Ensure email is not taken
    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(ApiError::Conflict("User already exists.".into()));
    }

    let hash = hash_password(&payload.password)?;

    let created = match payload.invite_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            let mut tx = state.db.begin().await?;
            let Some(invite) = invites::repo::claim_tx(&mut tx, token, &email).await? else {
                warn!(%email, "invalid invite token");
                return Err(ApiError::bad_request("Invalid or expired invite"));
            };
            let created =
                User::create(&mut *tx, &name, &email, &hash, Some(invite.role)).await;
            if created.is_ok() {
                tx.commit().await?;
            }
            created
        }
        None => {
            let mut tx = state.db.begin().await?;
            User::lock_open_registration(&mut *tx).await?;
            let created = User::create(&mut *tx, &name, &email, &hash, None).await;
            if created.is_ok() {
                tx.commit().await?;
            }
            created
        }
    };

    let user = match created {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => {
            warn!(%email, "email registered concurrently");
            return Err(ApiError::Conflict("User already exists.".into()));
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err(e.into());
        }
    };

    info!(user_id = %user.id, email = %user.email, role = ?user.role, "user registered");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = normalize_email(&payload.email);

    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required."));
    }

    let user = match User::find_by_email(&state.db, &email).await? {
        Some(u) => u,
        None => {
            warn!(%email, "login unknown email");
            return Err(ApiError::Unauthorized("Invalid credentials.".into()));
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized("Invalid credentials.".into()));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    // Reload so role or email changes since the last login are picked up
    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;

    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<UserEnvelope>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %auth.user_id, "user not found");
            ApiError::not_found("User not found")
        })?;

    Ok(Json(UserEnvelope { user: user.into() }))
}

#[instrument(skip(state, payload))]
pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SettingsRequest>,
) -> ApiResult<Json<SettingsResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let mut changes = UserChanges::default();

    if let Some(name) = payload.name.map(|n| n.trim().to_string()) {
        if !name.is_empty() && name != user.name {
            changes.name = Some(name);
        }
    }

    if let Some(email) = payload.email.map(|e| normalize_email(&e)) {
        if !email.is_empty() && email != user.email {
            if !is_valid_email(&email) {
                return Err(ApiError::bad_request("Invalid email"));
            }
            if let Some(other) = User::find_by_email(&state.db, &email).await? {
                if other.id != user.id {
                    return Err(ApiError::Conflict("Email already exists".into()));
                }
            }
            changes.email = Some(email);
        }
    }

    if let (Some(current), Some(new)) = (
        payload.current_password.as_deref().filter(|p| !p.is_empty()),
        payload.new_password.as_deref().filter(|p| !p.is_empty()),
    ) {
        if !verify_password(current, &user.password_hash)? {
            return Err(ApiError::bad_request("Current password is incorrect"));
        }
        if new.len() < MIN_PASSWORD_LEN {
            return Err(ApiError::bad_request("Password too short"));
        }
        changes.password_hash = Some(hash_password(new)?);
    }

    if let Some(url) = payload.profile_image.filter(|u| !u.is_empty()) {
        changes.profile_image = Some(url);
    }

    if changes.is_empty() {
        return Err(ApiError::bad_request("No changes provided"));
    }

    let updated = match User::update(&state.db, user.id, &changes).await {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::Conflict("Email already exists".into()));
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        user_id = %updated.id,
        name = changes.name.is_some(),
        email = changes.email.is_some(),
        password = changes.password_hash.is_some(),
        profile_image = changes.profile_image.is_some(),
        "settings updated"
    );
    Ok(Json(SettingsResponse {
        user: PublicUser::from(updated),
        message: "Settings updated successfully",
    }))
}
