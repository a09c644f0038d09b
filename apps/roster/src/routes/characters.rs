//! Character registration and linking through one-time auth codes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AdminCaller;
use crate::error::{ApiErrorBody, Error};
use crate::models::permission::SERVER_ADMINS;
use crate::models::Character;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/characters", post(register_character))
        .route("/characters/{character_id}/auth-code", post(create_auth_code))
        .route("/auth-codes/{code}/redeem", post(redeem_auth_code))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CharacterResponse {
    pub id: i64,
    pub name: String,
    pub corporation_id: i64,
}

impl From<Character> for CharacterResponse {
    fn from(c: Character) -> Self {
        Self {
            id: c.id,
            name: c.name,
            corporation_id: c.corporation_id,
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/v1/characters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterCharacterRequest {
    pub character_id: i64,
    #[serde(default)]
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/characters",
    tag = "Characters",
    security(("bearer" = [])),
    request_body = RegisterCharacterRequest,
    responses(
        (status = 201, description = "Character tracked", body = CharacterResponse),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Unknown to the directory", body = ApiErrorBody),
    ),
)]
pub async fn register_character(
    caller: AdminCaller,
    State(state): State<AppState>,
    Json(body): Json<RegisterCharacterRequest>,
) -> Result<(StatusCode, Json<CharacterResponse>), Error> {
    caller.require(&state, SERVER_ADMINS).await?;

    let character = state
        .sync
        .register_character(body.character_id, &body.token)
        .await?;
    Ok((StatusCode::CREATED, Json(character.into())))
}

// ---------------------------------------------------------------------------
// POST /api/v1/characters/:character_id/auth-code
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthCodeResponse {
    pub code: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/characters/{character_id}/auth-code",
    tag = "Characters",
    security(("bearer" = [])),
    params(("character_id" = i64, Path, description = "Directory character id")),
    responses(
        (status = 201, description = "One-time code issued", body = AuthCodeResponse),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Character not tracked", body = ApiErrorBody),
    ),
)]
pub async fn create_auth_code(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
) -> Result<(StatusCode, Json<AuthCodeResponse>), Error> {
    caller.require(&state, SERVER_ADMINS).await?;

    let code = state.store.create_auth_code(character_id).await?;
    Ok((StatusCode::CREATED, Json(AuthCodeResponse { code })))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth-codes/:code/redeem
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/auth-codes/{code}/redeem",
    tag = "Characters",
    security(("bearer" = [])),
    params(("code" = String, Path, description = "One-time auth code")),
    responses(
        (status = 200, description = "Character linked to the caller", body = CharacterResponse),
        (status = 404, description = "Unknown or used code", body = ApiErrorBody),
    ),
)]
pub async fn redeem_auth_code(
    caller: AdminCaller,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<CharacterResponse>, Error> {
    let character = state
        .store
        .redeem_auth_code(code.trim(), &caller.user_id)
        .await?;
    tracing::info!(character_id = character.id, user = %caller.user_id, "character linked");

    if let Err(err) = state.sync.sync_character(character.id).await {
        tracing::warn!(character_id = character.id, ?err, "initial character sync failed");
    }
    Ok(Json(character.into()))
}
