//! User profile and role administration endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{get, patch},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt, validate_uuid};
use crate::auth::{AccessGuard, AdminOnly, AnyRole, Auth, StaffOnly};
use crate::db::{Database, User, UserRole, UserSummary};
use crate::impl_has_auth_state;
use crate::rate_limit::{RateLimitConfig, rate_limit_avatar};

const MAX_AVATAR_URL_LENGTH: usize = 2048;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub guard: AccessGuard,
    pub rate_limit: Option<Arc<RateLimitConfig>>,
}

impl_has_auth_state!(UsersState);

pub fn router(state: UsersState) -> Router {
    let mut avatar_router = Router::new()
        .route("/avatar", patch(update_avatar))
        .with_state(state.clone());
    if let Some(config) = state.rate_limit.clone() {
        avatar_router =
            avatar_router.layer(middleware::from_fn_with_state(config, rate_limit_avatar));
    }

    Router::new()
        .route("/", get(list_users))
        .route("/me", get(me))
        .route("/{uuid}", get(get_user))
        .route("/{uuid}/role", patch(update_role))
        .with_state(state)
        .merge(avatar_router)
}

async fn load_user(db: &Database, uuid: &str) -> Result<User, ApiError> {
    db.users()
        .get_by_uuid(uuid)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

async fn me(
    State(state): State<UsersState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state.db, &auth.context.user_uuid).await?;
    Ok(Json(UserSummary::from(user)))
}

#[derive(Deserialize)]
struct AvatarRequest {
    avatar_url: Option<String>,
}

async fn update_avatar(
    State(state): State<UsersState>,
    auth: Auth<AnyRole>,
    Json(payload): Json<AvatarRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let avatar = payload
        .avatar_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty());

    if let Some(url) = avatar {
        if url.len() > MAX_AVATAR_URL_LENGTH {
            return Err(ApiError::bad_request("Avatar URL is too long"));
        }
        let parsed = url::Url::parse(url).map_err(|_| ApiError::bad_request("Invalid avatar URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::bad_request("Avatar URL must use http or https"));
        }
    }

    let user = load_user(&state.db, &auth.context.user_uuid).await?;
    state
        .db
        .users()
        .set_avatar(user.id, avatar)
        .await
        .db_err("Failed to update avatar")?;

    let user = load_user(&state.db, &auth.context.user_uuid).await?;
    Ok(Json(UserSummary::from(user)))
}

async fn list_users(
    State(state): State<UsersState>,
    _auth: Auth<AdminOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .db
        .users()
        .list()
        .await
        .db_err("Failed to list users")?;

    Ok(Json(users))
}

async fn get_user(
    State(state): State<UsersState>,
    _auth: Auth<StaffOnly>,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;
    let user = load_user(&state.db, &uuid).await?;
    Ok(Json(UserSummary::from(user)))
}

#[derive(Deserialize)]
struct RoleRequest {
    role: UserRole,
}

async fn update_role(
    State(state): State<UsersState>,
    auth: Auth<AdminOnly>,
    Path(uuid): Path<String>,
    Json(payload): Json<RoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;

    if uuid == auth.context.user_uuid {
        return Err(ApiError::forbidden("Cannot change your own role"));
    }

    let user = load_user(&state.db, &uuid).await?;
    state
        .db
        .users()
        .set_role(user.id, payload.role)
        .await
        .db_err("Failed to update role")?;

    info!(
        admin = %auth.context.user_uuid,
        user = %user.uuid,
        role = payload.role.as_str(),
        "Role changed"
    );

    let user = load_user(&state.db, &uuid).await?;
    Ok(Json(UserSummary::from(user)))
}
