//! Filter and filter membership endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use roster_common::Set;

use super::reconcile_users;
use super::roles::MembersResponse;
use crate::auth::AdminCaller;
use crate::error::{ApiErrorBody, Error};
use crate::models::{Filter, FilterRef, RoleKind};
use crate::AppState;

/// Filters are shared by both kinds; editing them takes the role admin permission.
const FILTER_PERMISSION: RoleKind = RoleKind::Role;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/filters", get(list_filters).post(create_filter))
        .route("/filters/{name}", delete(delete_filter))
        .route("/filters/{name}/members", get(list_filter_members))
        .route(
            "/filters/{name}/members/{user_id}",
            put(add_filter_member).delete(remove_filter_member),
        )
}

#[derive(Debug, Deserialize)]
pub struct MemberPath {
    pub name: String,
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// GET /api/v1/filters
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/filters",
    tag = "Filters",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All filters", body = [Filter]),
    ),
)]
pub async fn list_filters(
    _caller: AdminCaller,
    State(state): State<AppState>,
) -> Result<Json<Vec<Filter>>, Error> {
    Ok(Json(state.store.list_filters().await?))
}

// ---------------------------------------------------------------------------
// POST /api/v1/filters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFilterRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/filters",
    tag = "Filters",
    security(("bearer" = [])),
    request_body = CreateFilterRequest,
    responses(
        (status = 201, description = "Filter created", body = Filter),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 409, description = "Name taken", body = ApiErrorBody),
    ),
)]
pub async fn create_filter(
    caller: AdminCaller,
    State(state): State<AppState>,
    Json(body): Json<CreateFilterRequest>,
) -> Result<(StatusCode, Json<Filter>), Error> {
    caller
        .require(&state, FILTER_PERMISSION.admin_permission())
        .await?;

    let name = body.name.trim();
    if name.is_empty() {
        return Err(Error::invalid_input("filter name is required"));
    }

    let id = state.store.create_filter(name, &body.description).await?;
    let filter = state.store.get_filter(FilterRef::Id(&id)).await?;
    tracing::info!(filter = %filter.name, by = %caller.user_id, "filter created");

    Ok((StatusCode::CREATED, Json(filter)))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/filters/:name
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/filters/{name}",
    tag = "Filters",
    security(("bearer" = [])),
    params(("name" = String, Path, description = "Filter name or id")),
    responses(
        (status = 204, description = "Filter deleted"),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Filter not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_filter(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, Error> {
    caller
        .require(&state, FILTER_PERMISSION.admin_permission())
        .await?;

    let filter = FilterRef::parse(&name);
    let members = state.store.list_filter_members(filter).await?;
    let attached = state.store.filter_roles(filter).await?;
    state.store.delete_filter(filter).await?;
    tracing::info!(filter = %name, by = %caller.user_id, "filter deleted");

    // Dropping a conjunct widens every attached role that survives.
    let mut users = Set::new();
    for user_id in members {
        users.add(user_id);
    }
    for role in &attached {
        match state.store.get_role_entitlement(&role.short_name, role.kind).await {
            Ok(entitled) => {
                for user_id in entitled {
                    users.add(user_id);
                }
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
    }

    reconcile_users(&state, &users.to_sorted_vec()).await;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// GET /api/v1/filters/:name/members
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/filters/{name}/members",
    tag = "Filters",
    security(("bearer" = [])),
    params(("name" = String, Path, description = "Filter name or id")),
    responses(
        (status = 200, description = "Members of the filter", body = MembersResponse),
        (status = 404, description = "Filter not found", body = ApiErrorBody),
    ),
)]
pub async fn list_filter_members(
    _caller: AdminCaller,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MembersResponse>, Error> {
    let members = state
        .store
        .list_filter_members(FilterRef::parse(&name))
        .await?;
    Ok(Json(MembersResponse { members }))
}

// ---------------------------------------------------------------------------
// PUT|DELETE /api/v1/filters/:name/members/:user_id
// ---------------------------------------------------------------------------

#[utoipa::path(
    put,
    path = "/api/v1/filters/{name}/members/{user_id}",
    tag = "Filters",
    security(("bearer" = [])),
    params(
        ("name" = String, Path, description = "Filter name or id"),
        ("user_id" = String, Path, description = "Chat user id"),
    ),
    responses(
        (status = 204, description = "Member added"),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Filter not found", body = ApiErrorBody),
        (status = 409, description = "Already a member", body = ApiErrorBody),
    ),
)]
pub async fn add_filter_member(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<MemberPath>,
) -> Result<StatusCode, Error> {
    caller
        .require(&state, FILTER_PERMISSION.admin_permission())
        .await?;

    state
        .store
        .add_filter_member(FilterRef::parse(&path.name), &path.user_id)
        .await?;
    tracing::info!(filter = %path.name, user = %path.user_id, "filter member added");

    reconcile_users(&state, std::slice::from_ref(&path.user_id)).await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/v1/filters/{name}/members/{user_id}",
    tag = "Filters",
    security(("bearer" = [])),
    params(
        ("name" = String, Path, description = "Filter name or id"),
        ("user_id" = String, Path, description = "Chat user id"),
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Filter not found", body = ApiErrorBody),
    ),
)]
pub async fn remove_filter_member(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<MemberPath>,
) -> Result<StatusCode, Error> {
    caller
        .require(&state, FILTER_PERMISSION.admin_permission())
        .await?;

    state
        .store
        .remove_filter_member(FilterRef::parse(&path.name), &path.user_id)
        .await?;
    tracing::info!(filter = %path.name, user = %path.user_id, "filter member removed");

    reconcile_users(&state, std::slice::from_ref(&path.user_id)).await;
    Ok(StatusCode::NO_CONTENT)
}
