pub mod characters;
pub mod filters;
pub mod health;
pub mod permissions;
pub mod roles;
pub mod sync;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().merge(health::router()).nest(
        "/api/v1",
        filters::router()
            .merge(sync::router())
            .merge(characters::router())
            .merge(permissions::router())
            .merge(roles::router()),
    )
}

/// Re-derive the platform roles of `users` after their entitlement may have
/// changed. Failures are logged; the next directory poll catches up.
pub(crate) async fn reconcile_users(state: &AppState, users: &[String]) {
    for user_id in users {
        match state.members.reconcile_user(user_id).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                tracing::debug!(user = %user_id, "user is not on the platform");
            }
            Err(err) => tracing::warn!(user = %user_id, ?err, "member reconcile failed"),
        }
    }
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Roles
        roles::list_roles,
        roles::create_role,
        roles::get_role,
        roles::update_role,
        roles::delete_role,
        roles::list_role_members,
        roles::list_role_filters,
        roles::attach_filter,
        roles::detach_filter,
        roles::join_sig,
        roles::leave_sig,
        // Filters
        filters::list_filters,
        filters::create_filter,
        filters::delete_filter,
        filters::list_filter_members,
        filters::add_filter_member,
        filters::remove_filter_member,
        // Characters
        characters::register_character,
        characters::create_auth_code,
        characters::redeem_auth_code,
        // Permissions
        permissions::grant_permission,
        permissions::revoke_permission,
        // Sync
        sync::sync_roles,
        sync::sync_character,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            // Models
            crate::models::Role,
            crate::models::RoleKind,
            crate::models::RolePatch,
            crate::models::Filter,
            // Route request/response types
            health::HealthResponse,
            roles::CreateRoleRequest,
            roles::MembersResponse,
            filters::CreateFilterRequest,
            characters::RegisterCharacterRequest,
            characters::CharacterResponse,
            characters::AuthCodeResponse,
            sync::SyncResponse,
            sync::CharacterSyncResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Roles", description = "Roles and SIGs"),
        (name = "Filters", description = "Filters and filter membership"),
        (name = "Characters", description = "Character registration and linking"),
        (name = "Permissions", description = "Admin permissions"),
        (name = "Sync", description = "Reconciliation triggers"),
    )
)]
pub struct ApiDoc;
