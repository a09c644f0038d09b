//! The chat platform whose guild roles are kept in line with the store.

pub mod discord;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::Role;

pub use discord::DiscordClient;
pub use memory::MemoryPlatform;

/// Attributes written when creating or editing a platform role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleAttrs {
    pub name: String,
    #[serde(default)]
    pub color: i32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub permissions: i64,
    #[serde(default)]
    pub mentionable: bool,
}

impl From<&Role> for RoleAttrs {
    fn from(role: &Role) -> Self {
        Self {
            name: role.name.clone(),
            color: role.color,
            hoist: role.hoist,
            position: role.position,
            permissions: role.permissions,
            mentionable: role.mentionable,
        }
    }
}

/// A role as it currently exists on the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformRole {
    pub id: String,
    pub name: String,
    pub color: i32,
    pub hoist: bool,
    pub position: i32,
    pub permissions: i64,
    pub mentionable: bool,
    /// Owned by an integration (bots, boosts); never ours to touch.
    pub managed: bool,
}

impl PlatformRole {
    /// Whether any attribute the reconciler owns differs from `role`.
    pub fn differs_from(&self, role: &Role) -> bool {
        self.mentionable != role.mentionable
            || self.hoist != role.hoist
            || self.color != role.color
            || self.permissions != role.permissions
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub user_id: String,
    pub roles: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("platform rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl PlatformError {
    /// Errors worth redelivering the action for.
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::RateLimited { .. } | PlatformError::Transport(_) => true,
            PlatformError::Rejected { status, .. } => *status >= 500,
            PlatformError::NotFound(_) | PlatformError::AlreadyExists(_) => false,
        }
    }
}

impl From<PlatformError> for crate::error::Error {
    fn from(err: PlatformError) -> Self {
        use crate::error::Error;

        match err {
            PlatformError::NotFound(m) => Error::not_found(m),
            PlatformError::AlreadyExists(m) => Error::already_exists(m),
            err if err.is_transient() => Error::transient(err.to_string()),
            err => Error::fatal(err.to_string()),
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn create_role(&self, guild_id: &str, attrs: &RoleAttrs) -> PlatformResult<PlatformRole>;
    async fn edit_role(
        &self,
        guild_id: &str,
        role_id: &str,
        attrs: &RoleAttrs,
    ) -> PlatformResult<PlatformRole>;
    async fn delete_role(&self, guild_id: &str, role_id: &str) -> PlatformResult<()>;
    async fn list_roles(&self, guild_id: &str) -> PlatformResult<Vec<PlatformRole>>;
    async fn add_member_role(&self, guild_id: &str, user_id: &str, role_id: &str)
        -> PlatformResult<()>;
    async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> PlatformResult<()>;
    async fn get_member(&self, guild_id: &str, user_id: &str) -> PlatformResult<Member>;
}

/// Outcome of [`PlatformHandle::ensure_role`]; both carry the platform id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsuredRole {
    Found(String),
    Created(String),
}

/// The guild client shared by every task.
///
/// Mutating calls hold one process-wide lock for the duration of the request,
/// so at most one platform write is in flight. Reads go straight through.
#[derive(Clone)]
pub struct PlatformHandle {
    client: Arc<dyn ChatPlatform>,
    guild_id: String,
    lock: Arc<Mutex<()>>,
}

impl PlatformHandle {
    pub fn new(client: Arc<dyn ChatPlatform>, guild_id: impl Into<String>) -> Self {
        Self {
            client,
            guild_id: guild_id.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    pub async fn list_roles(&self) -> PlatformResult<Vec<PlatformRole>> {
        self.client.list_roles(&self.guild_id).await
    }

    pub async fn get_member(&self, user_id: &str) -> PlatformResult<Member> {
        self.client.get_member(&self.guild_id, user_id).await
    }

    pub async fn create_role(&self, attrs: &RoleAttrs) -> PlatformResult<PlatformRole> {
        let _guard = self.lock.lock().await;
        self.client.create_role(&self.guild_id, attrs).await
    }

    /// Find the role named `attrs.name`, creating it when absent. The lookup
    /// and the create share one hold of the write lock; the platform itself
    /// accepts duplicate names.
    pub async fn ensure_role(&self, attrs: &RoleAttrs) -> PlatformResult<EnsuredRole> {
        let _guard = self.lock.lock().await;
        if let Some(id) = self.find_role_id(&attrs.name).await? {
            return Ok(EnsuredRole::Found(id));
        }
        match self.client.create_role(&self.guild_id, attrs).await {
            Ok(role) => Ok(EnsuredRole::Created(role.id)),
            Err(PlatformError::AlreadyExists(name)) => match self.find_role_id(&attrs.name).await? {
                Some(id) => Ok(EnsuredRole::Found(id)),
                None => Err(PlatformError::Transport(format!(
                    "role `{name}` reported as existing but not listed"
                ))),
            },
            Err(err) => Err(err),
        }
    }

    async fn find_role_id(&self, name: &str) -> PlatformResult<Option<String>> {
        Ok(self
            .client
            .list_roles(&self.guild_id)
            .await?
            .into_iter()
            .find(|r| r.name == name)
            .map(|r| r.id))
    }

    pub async fn edit_role(&self, role_id: &str, attrs: &RoleAttrs) -> PlatformResult<PlatformRole> {
        let _guard = self.lock.lock().await;
        self.client.edit_role(&self.guild_id, role_id, attrs).await
    }

    pub async fn delete_role(&self, role_id: &str) -> PlatformResult<()> {
        let _guard = self.lock.lock().await;
        self.client.delete_role(&self.guild_id, role_id).await
    }

    pub async fn add_member_role(&self, user_id: &str, role_id: &str) -> PlatformResult<()> {
        let _guard = self.lock.lock().await;
        self.client
            .add_member_role(&self.guild_id, user_id, role_id)
            .await
    }

    pub async fn remove_member_role(&self, user_id: &str, role_id: &str) -> PlatformResult<()> {
        let _guard = self.lock.lock().await;
        self.client
            .remove_member_role(&self.guild_id, user_id, role_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(PlatformError::Transport("reset".into()).is_transient());
        assert!(PlatformError::RateLimited { retry_after: None }.is_transient());
        assert!(PlatformError::Rejected {
            status: 502,
            message: String::new()
        }
        .is_transient());
        assert!(!PlatformError::Rejected {
            status: 403,
            message: String::new()
        }
        .is_transient());
        assert!(!PlatformError::NotFound("role".into()).is_transient());
    }

    #[test]
    fn platform_errors_map_onto_error_kinds() {
        let err: crate::error::Error = PlatformError::NotFound("x".into()).into();
        assert!(err.is_not_found());
        let err: crate::error::Error = PlatformError::Transport("x".into()).into();
        assert!(err.is_transient());
    }
}
