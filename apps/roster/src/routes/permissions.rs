use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::put;
use axum::Router;
use serde::Deserialize;

use crate::auth::AdminCaller;
use crate::error::Error;
use crate::models::permission::SERVER_ADMINS;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/permissions/{name}/members/{user_id}",
        put(grant_permission).delete(revoke_permission),
    )
}

#[derive(Debug, Deserialize)]
pub struct PermissionPath {
    pub name: String,
    pub user_id: String,
}

#[utoipa::path(
    put,
    path = "/api/v1/permissions/{name}/members/{user_id}",
    tag = "Permissions",
    security(("bearer" = [])),
    params(
        ("name" = String, Path, description = "Permission name"),
        ("user_id" = String, Path, description = "Chat user id"),
    ),
    responses(
        (status = 204, description = "Permission granted"),
        (status = 403, description = "Forbidden", body = crate::error::ApiErrorBody),
        (status = 404, description = "Unknown permission", body = crate::error::ApiErrorBody),
        (status = 409, description = "Already held", body = crate::error::ApiErrorBody),
    ),
)]
pub async fn grant_permission(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<PermissionPath>,
) -> Result<StatusCode, Error> {
    caller.require(&state, SERVER_ADMINS).await?;

    state
        .store
        .grant_permission(&path.name, &path.user_id)
        .await?;
    tracing::info!(permission = %path.name, user = %path.user_id, by = %caller.user_id, "permission granted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/v1/permissions/{name}/members/{user_id}",
    tag = "Permissions",
    security(("bearer" = [])),
    params(
        ("name" = String, Path, description = "Permission name"),
        ("user_id" = String, Path, description = "Chat user id"),
    ),
    responses(
        (status = 204, description = "Permission revoked"),
        (status = 403, description = "Forbidden", body = crate::error::ApiErrorBody),
        (status = 404, description = "Unknown permission", body = crate::error::ApiErrorBody),
    ),
)]
pub async fn revoke_permission(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<PermissionPath>,
) -> Result<StatusCode, Error> {
    caller.require(&state, SERVER_ADMINS).await?;

    state
        .store
        .revoke_permission(&path.name, &path.user_id)
        .await?;
    tracing::info!(permission = %path.name, user = %path.user_id, by = %caller.user_id, "permission revoked");
    Ok(StatusCode::NO_CONTENT)
}
