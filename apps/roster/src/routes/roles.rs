//! Role and SIG endpoints. `{kind}` is `roles` or `sigs`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::reconcile_users;
use crate::auth::AdminCaller;
use crate::error::{ApiErrorBody, Error};
use crate::models::{Filter, FilterRef, NewRole, Role, RoleKind, RolePatch};
use crate::store::default_filter_name;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{kind}", get(list_roles).post(create_role))
        .route(
            "/{kind}/{short_name}",
            get(get_role).patch(update_role).delete(delete_role),
        )
        .route("/{kind}/{short_name}/members", get(list_role_members))
        .route("/{kind}/{short_name}/filters", get(list_role_filters))
        .route(
            "/{kind}/{short_name}/filters/{filter}",
            post(attach_filter).delete(detach_filter),
        )
        .route("/{kind}/{short_name}/join", post(join_sig))
        .route("/{kind}/{short_name}/leave", post(leave_sig))
}

#[derive(Debug, Deserialize)]
pub struct RolePath {
    pub kind: String,
    pub short_name: String,
}

impl RolePath {
    fn kind(&self) -> Result<RoleKind, Error> {
        self.kind.parse()
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleFilterPath {
    pub kind: String,
    pub short_name: String,
    pub filter: String,
}

// ---------------------------------------------------------------------------
// GET /api/v1/:kind
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/{kind}",
    tag = "Roles",
    security(("bearer" = [])),
    params(("kind" = String, Path, description = "`roles` or `sigs`")),
    responses(
        (status = 200, description = "Roles of the kind", body = [Role]),
        (status = 400, description = "Unknown kind", body = ApiErrorBody),
    ),
)]
pub async fn list_roles(
    _caller: AdminCaller,
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<Role>>, Error> {
    let kind: RoleKind = kind.parse()?;
    Ok(Json(state.store.list_roles(Some(kind)).await?))
}

// ---------------------------------------------------------------------------
// POST /api/v1/:kind
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    pub short_name: String,
    pub name: String,
    pub chat_type: Option<String>,
    #[serde(default)]
    pub joinable: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/{kind}",
    tag = "Roles",
    security(("bearer" = [])),
    params(("kind" = String, Path, description = "`roles` or `sigs`")),
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 409, description = "Role or filter name taken", body = ApiErrorBody),
    ),
)]
pub async fn create_role(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(body): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), Error> {
    let kind: RoleKind = kind.parse()?;
    caller.require(&state, kind.admin_permission()).await?;

    let mut role = NewRole::new(kind, body.short_name.trim(), body.name.trim())
        .joinable(body.joinable);
    if let Some(chat_type) = body.chat_type {
        role.chat_type = chat_type;
    }

    state.store.create_role(&role).await?;
    let created = state.store.get_role(&role.short_name, kind).await?;
    tracing::info!(kind = %kind, role = %created.short_name, by = %caller.user_id, "role created");

    state.request_role_reconcile();
    Ok((StatusCode::CREATED, Json(created)))
}

// ---------------------------------------------------------------------------
// GET /api/v1/:kind/:short_name
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/{kind}/{short_name}",
    tag = "Roles",
    security(("bearer" = [])),
    params(
        ("kind" = String, Path, description = "`roles` or `sigs`"),
        ("short_name" = String, Path, description = "Role short name"),
    ),
    responses(
        (status = 200, description = "The role", body = Role),
        (status = 404, description = "Role not found", body = ApiErrorBody),
    ),
)]
pub async fn get_role(
    _caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<RolePath>,
) -> Result<Json<Role>, Error> {
    Ok(Json(
        state.store.get_role(&path.short_name, path.kind()?).await?,
    ))
}

// ---------------------------------------------------------------------------
// PATCH /api/v1/:kind/:short_name
// ---------------------------------------------------------------------------

#[utoipa::path(
    patch,
    path = "/api/v1/{kind}/{short_name}",
    tag = "Roles",
    security(("bearer" = [])),
    params(
        ("kind" = String, Path, description = "`roles` or `sigs`"),
        ("short_name" = String, Path, description = "Role short name"),
    ),
    request_body = RolePatch,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 400, description = "Invalid attribute", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Role not found", body = ApiErrorBody),
    ),
)]
pub async fn update_role(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<RolePath>,
    Json(patch): Json<RolePatch>,
) -> Result<Json<Role>, Error> {
    let kind = path.kind()?;
    caller.require(&state, kind.admin_permission()).await?;

    let role = state
        .store
        .update_role_attributes(&path.short_name, kind, &patch)
        .await?;
    tracing::info!(kind = %kind, role = %role.short_name, by = %caller.user_id, "role updated");

    state.request_role_reconcile();
    Ok(Json(role))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/:kind/:short_name
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/{kind}/{short_name}",
    tag = "Roles",
    security(("bearer" = [])),
    params(
        ("kind" = String, Path, description = "`roles` or `sigs`"),
        ("short_name" = String, Path, description = "Role short name"),
    ),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Role not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_role(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<RolePath>,
) -> Result<StatusCode, Error> {
    let kind = path.kind()?;
    caller.require(&state, kind.admin_permission()).await?;

    state.store.delete_role(&path.short_name, kind).await?;
    tracing::info!(kind = %kind, role = %path.short_name, by = %caller.user_id, "role deleted");

    state.request_role_reconcile();
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// GET /api/v1/:kind/:short_name/members
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct MembersResponse {
    pub members: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/{kind}/{short_name}/members",
    tag = "Roles",
    security(("bearer" = [])),
    params(
        ("kind" = String, Path, description = "`roles` or `sigs`"),
        ("short_name" = String, Path, description = "Role short name"),
    ),
    responses(
        (status = 200, description = "Users entitled to the role", body = MembersResponse),
        (status = 404, description = "Role not found", body = ApiErrorBody),
    ),
)]
pub async fn list_role_members(
    _caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<RolePath>,
) -> Result<Json<MembersResponse>, Error> {
    let members = state
        .store
        .get_role_entitlement(&path.short_name, path.kind()?)
        .await?;
    Ok(Json(MembersResponse { members }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/:kind/:short_name/filters
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/{kind}/{short_name}/filters",
    tag = "Roles",
    security(("bearer" = [])),
    params(
        ("kind" = String, Path, description = "`roles` or `sigs`"),
        ("short_name" = String, Path, description = "Role short name"),
    ),
    responses(
        (status = 200, description = "Filters attached to the role", body = [Filter]),
        (status = 404, description = "Role not found", body = ApiErrorBody),
    ),
)]
pub async fn list_role_filters(
    _caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<RolePath>,
) -> Result<Json<Vec<Filter>>, Error> {
    Ok(Json(
        state
            .store
            .role_filters(&path.short_name, path.kind()?)
            .await?,
    ))
}

// ---------------------------------------------------------------------------
// POST|DELETE /api/v1/:kind/:short_name/filters/:filter
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/{kind}/{short_name}/filters/{filter}",
    tag = "Roles",
    security(("bearer" = [])),
    params(
        ("kind" = String, Path, description = "`roles` or `sigs`"),
        ("short_name" = String, Path, description = "Role short name"),
        ("filter" = String, Path, description = "Filter name or id"),
    ),
    responses(
        (status = 204, description = "Filter attached"),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Role or filter not found", body = ApiErrorBody),
        (status = 409, description = "Already attached", body = ApiErrorBody),
    ),
)]
pub async fn attach_filter(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<RoleFilterPath>,
) -> Result<StatusCode, Error> {
    let kind: RoleKind = path.kind.parse()?;
    caller.require(&state, kind.admin_permission()).await?;

    let before = state
        .store
        .get_role_entitlement(&path.short_name, kind)
        .await?;
    state
        .store
        .attach_filter(&path.short_name, kind, FilterRef::parse(&path.filter))
        .await?;
    tracing::info!(role = %path.short_name, filter = %path.filter, "filter attached");

    // Attaching can only narrow the entitlement.
    reconcile_users(&state, &before).await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/v1/{kind}/{short_name}/filters/{filter}",
    tag = "Roles",
    security(("bearer" = [])),
    params(
        ("kind" = String, Path, description = "`roles` or `sigs`"),
        ("short_name" = String, Path, description = "Role short name"),
        ("filter" = String, Path, description = "Filter name or id"),
    ),
    responses(
        (status = 204, description = "Filter detached"),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Role, filter or link not found", body = ApiErrorBody),
    ),
)]
pub async fn detach_filter(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<RoleFilterPath>,
) -> Result<StatusCode, Error> {
    let kind: RoleKind = path.kind.parse()?;
    caller.require(&state, kind.admin_permission()).await?;

    state
        .store
        .detach_filter(&path.short_name, kind, FilterRef::parse(&path.filter))
        .await?;
    tracing::info!(role = %path.short_name, filter = %path.filter, "filter detached");

    let after = state
        .store
        .get_role_entitlement(&path.short_name, kind)
        .await?;
    reconcile_users(&state, &after).await;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /api/v1/sigs/:short_name/join|leave
// ---------------------------------------------------------------------------

/// Resolve a self-service SIG, refusing anything that is not joinable.
async fn joinable_sig(state: &AppState, path: &RolePath) -> Result<Role, Error> {
    if path.kind()? != RoleKind::Sig {
        return Err(Error::invalid_input("only SIGs can be joined or left"));
    }
    let role = state.store.get_role(&path.short_name, RoleKind::Sig).await?;
    if !role.joinable {
        return Err(Error::forbidden(format!(
            "SIG `{}` is not joinable",
            role.short_name
        )));
    }
    Ok(role)
}

#[utoipa::path(
    post,
    path = "/api/v1/sigs/{short_name}/join",
    tag = "Roles",
    security(("bearer" = [])),
    params(("short_name" = String, Path, description = "SIG short name")),
    responses(
        (status = 204, description = "Joined"),
        (status = 403, description = "SIG is not joinable", body = ApiErrorBody),
        (status = 404, description = "SIG not found", body = ApiErrorBody),
        (status = 409, description = "Already a member", body = ApiErrorBody),
    ),
)]
pub async fn join_sig(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<RolePath>,
) -> Result<StatusCode, Error> {
    let role = joinable_sig(&state, &path).await?;
    let filter = default_filter_name(&role.short_name);

    state
        .store
        .add_filter_member(FilterRef::Name(&filter), &caller.user_id)
        .await?;
    tracing::info!(sig = %role.short_name, user = %caller.user_id, "joined SIG");

    reconcile_users(&state, std::slice::from_ref(&caller.user_id)).await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/sigs/{short_name}/leave",
    tag = "Roles",
    security(("bearer" = [])),
    params(("short_name" = String, Path, description = "SIG short name")),
    responses(
        (status = 204, description = "Left"),
        (status = 403, description = "SIG is not joinable", body = ApiErrorBody),
        (status = 404, description = "SIG not found", body = ApiErrorBody),
    ),
)]
pub async fn leave_sig(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(path): Path<RolePath>,
) -> Result<StatusCode, Error> {
    let role = joinable_sig(&state, &path).await?;
    let filter = default_filter_name(&role.short_name);

    state
        .store
        .remove_filter_member(FilterRef::Name(&filter), &caller.user_id)
        .await?;
    tracing::info!(sig = %role.short_name, user = %caller.user_id, "left SIG");

    reconcile_users(&state, std::slice::from_ref(&caller.user_id)).await;
    Ok(StatusCode::NO_CONTENT)
}
