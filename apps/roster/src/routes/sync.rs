//! Manual triggers for the reconciliation loops.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AdminCaller;
use crate::error::{ApiErrorBody, Error};
use crate::models::permission::SERVER_ADMINS;
use crate::models::RoleKind;
use crate::reconcile::reconcile_once;
use crate::sync::CharacterOutcome;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync/roles", post(sync_roles))
        .route("/sync/characters/{character_id}", post(sync_character))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    /// Actions applied or enqueued by the pass.
    pub applied: usize,
}

// ---------------------------------------------------------------------------
// POST /api/v1/sync/roles
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/sync/roles",
    tag = "Sync",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Role reconcile pass done", body = SyncResponse),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 503, description = "Platform or store unavailable", body = ApiErrorBody),
    ),
)]
pub async fn sync_roles(
    caller: AdminCaller,
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, Error> {
    caller
        .require(&state, RoleKind::Role.admin_permission())
        .await?;

    let applied = reconcile_once(state.roles.as_ref()).await?;
    Ok(Json(SyncResponse { applied }))
}

// ---------------------------------------------------------------------------
// POST /api/v1/sync/characters/:character_id
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct CharacterSyncResponse {
    /// `synced`, `deleted` or `in_flight`.
    pub outcome: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/sync/characters/{character_id}",
    tag = "Sync",
    security(("bearer" = [])),
    params(("character_id" = i64, Path, description = "Directory character id")),
    responses(
        (status = 200, description = "Character refreshed", body = CharacterSyncResponse),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 503, description = "Directory unavailable", body = ApiErrorBody),
    ),
)]
pub async fn sync_character(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
) -> Result<Json<CharacterSyncResponse>, Error> {
    caller.require(&state, SERVER_ADMINS).await?;

    let outcome = match state.sync.sync_character(character_id).await? {
        CharacterOutcome::Synced => "synced",
        CharacterOutcome::Deleted => "deleted",
        CharacterOutcome::InFlight => "in_flight",
    };
    Ok(Json(CharacterSyncResponse {
        outcome: outcome.to_string(),
    }))
}
