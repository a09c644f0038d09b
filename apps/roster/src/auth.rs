//! Admin API caller extraction.
//!
//! The chat bot front-end authenticates with the shared `ADMIN_TOKEN` and
//! names the chat user it acts for in `X-Chat-User`.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{Error, Result};
use crate::models::permission::SERVER_ADMINS;
use crate::AppState;

pub const CHAT_USER_HEADER: &str = "x-chat-user";

/// The chat user on whose behalf a request is made.
#[derive(Debug, Clone)]
pub struct AdminCaller {
    pub user_id: String,
}

/// Rejection returned when the bearer token or the acting user is missing.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.message
            }
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for AdminCaller {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError {
                message: "Missing Authorization header",
            })?;

        let token = header.strip_prefix("Bearer ").ok_or(AuthError {
            message: "Invalid Authorization header format",
        })?;
        if token != state.config.admin_token {
            return Err(AuthError {
                message: "Invalid token",
            });
        }

        let user_id = parts
            .headers
            .get(CHAT_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AuthError {
                message: "Missing X-Chat-User header",
            })?;

        Ok(AdminCaller {
            user_id: user_id.to_string(),
        })
    }
}

impl AdminCaller {
    /// Fails `Forbidden` unless the caller holds `permission` or is a server admin.
    pub async fn require(&self, state: &AppState, permission: &str) -> Result<()> {
        if state.store.has_permission(&self.user_id, permission).await?
            || state.store.has_permission(&self.user_id, SERVER_ADMINS).await?
        {
            return Ok(());
        }
        Err(Error::forbidden(format!(
            "You need the `{permission}` permission for this"
        )))
    }
}
