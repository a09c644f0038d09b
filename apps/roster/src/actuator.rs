//! Queue consumer that carries role and member actions out on the platform.
//!
//! Every action is safe to apply more than once: creating a role that is
//! already there and deleting one that is already gone both count as done.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::Role;
use crate::platform::{EnsuredRole, PlatformError, PlatformHandle};
use crate::queue::messages::{
    MemberAction, MemberActionKind, RoleAction, RoleActionKind, MEMBERS_TOPIC, ROLES_TOPIC,
};
use crate::queue::{Delivery, Queue};
use crate::store::Store;

/// How long a worker blocks waiting for a message.
const POLL_WAIT: Duration = Duration::from_secs(5);
/// Pause after a requeue or a queue error before asking for more work.
const BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    /// Worth another try later.
    Requeue(String),
    /// Can never succeed.
    Reject(String),
}

impl Settlement {
    fn from_platform(err: PlatformError) -> Self {
        if err.is_transient() {
            Settlement::Requeue(err.to_string())
        } else {
            Settlement::Reject(err.to_string())
        }
    }

    fn from_store(err: Error) -> Self {
        if err.is_transient() {
            Settlement::Requeue(err.message)
        } else {
            Settlement::Reject(err.message)
        }
    }
}

pub struct Actuator {
    store: Arc<dyn Store>,
    platform: PlatformHandle,
    queue: Arc<dyn Queue>,
    config: Arc<Config>,
}

impl Actuator {
    pub fn new(
        store: Arc<dyn Store>,
        platform: PlatformHandle,
        queue: Arc<dyn Queue>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            platform,
            queue,
            config,
        }
    }

    /// Consume `topic` until cancelled.
    pub async fn run(self: Arc<Self>, topic: &'static str, worker: usize, cancel: CancellationToken) {
        tracing::info!(topic, worker, "actuator worker started");

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.queue.next(topic, POLL_WAIT) => next,
            };

            let pause = match next {
                Ok(Some(delivery)) => match self.process(&delivery).await {
                    Ok(Settlement::Requeue(_)) => true,
                    Ok(_) => false,
                    Err(err) => {
                        tracing::warn!(topic, ?err, "settling message failed");
                        true
                    }
                },
                Ok(None) => false,
                Err(err) => {
                    tracing::warn!(topic, ?err, "receiving from queue failed");
                    true
                }
            };

            if pause {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(BACKOFF) => {}
                }
            }
        }

        tracing::info!(topic, worker, "actuator worker stopped");
    }

    /// Handle one delivery and settle it on the queue.
    pub async fn process(&self, delivery: &Delivery) -> Result<Settlement> {
        let settlement = self.handle(delivery).await;
        match &settlement {
            Settlement::Ack => self.queue.ack(delivery).await?,
            Settlement::Requeue(reason) => {
                tracing::info!(topic = %delivery.topic, %reason, "requeueing action");
                self.queue.requeue(delivery).await?
            }
            Settlement::Reject(reason) => self.queue.reject(delivery, reason).await?,
        }
        Ok(settlement)
    }

    /// Decide the fate of a delivery, performing the platform call it asks for.
    pub async fn handle(&self, delivery: &Delivery) -> Settlement {
        let payload = delivery.payload.trim();
        if payload.is_empty() {
            return Settlement::Ack;
        }

        match delivery.topic.as_str() {
            ROLES_TOPIC => match serde_json::from_str::<RoleAction>(payload) {
                Ok(action) => self.handle_role(action).await,
                Err(err) => Settlement::Reject(format!("unparsable role action: {err}")),
            },
            MEMBERS_TOPIC => match serde_json::from_str::<MemberAction>(payload) {
                Ok(action) => self.handle_member(action).await,
                Err(err) => Settlement::Reject(format!("unparsable member action: {err}")),
            },
            other => Settlement::Reject(format!("unknown topic `{other}`")),
        }
    }

    fn is_protected_id(&self, role_id: &str) -> bool {
        role_id == "0" || role_id == self.platform.guild_id()
    }

    async fn handle_role(&self, action: RoleAction) -> Settlement {
        let name = action.role.attrs.name.as_str();
        if self.config.is_ignored_role(name) {
            return Settlement::Reject(format!("role `{name}` is ignored"));
        }
        if action.role.id.as_deref().is_some_and(|id| self.is_protected_id(id)) {
            return Settlement::Reject(format!("role `{name}` cannot be managed"));
        }

        match action.action {
            RoleActionKind::Create => self.create_role(&action).await,
            RoleActionKind::Upsert => {
                let Some(id) = action.role.id.as_deref() else {
                    return Settlement::Reject("upsert without a platform id".to_string());
                };
                match self.platform.edit_role(id, &action.role.attrs).await {
                    Ok(_) => {
                        tracing::info!(role = %name, "platform role updated");
                        Settlement::Ack
                    }
                    Err(err) => Settlement::from_platform(err),
                }
            }
            RoleActionKind::Delete => {
                let Some(id) = action.role.id.as_deref() else {
                    return Settlement::Reject("delete without a platform id".to_string());
                };
                match self.platform.delete_role(id).await {
                    Ok(()) => tracing::info!(role = %name, "platform role deleted"),
                    Err(PlatformError::NotFound(_)) => {
                        tracing::debug!(role = %name, "platform role already gone")
                    }
                    Err(err) => return Settlement::from_platform(err),
                }
                self.forget_chat_id(id).await
            }
        }
    }

    async fn create_role(&self, action: &RoleAction) -> Settlement {
        let attrs = &action.role.attrs;

        let chat_id = match self.platform.ensure_role(attrs).await {
            Ok(EnsuredRole::Found(id)) => {
                tracing::debug!(role = %attrs.name, "platform role already present");
                id
            }
            Ok(EnsuredRole::Created(id)) => {
                tracing::info!(role = %attrs.name, chat_id = %id, "platform role created");
                id
            }
            Err(err) => return Settlement::from_platform(err),
        };

        let Some(store_id) = action.role.store_id.as_deref() else {
            return Settlement::Ack;
        };
        match self.store.set_role_chat_id(store_id, Some(&chat_id)).await {
            Ok(()) => Settlement::Ack,
            // The role was deleted meanwhile; the next reconcile pass removes
            // the platform role again.
            Err(err) if err.is_not_found() => Settlement::Ack,
            Err(err) => Settlement::from_store(err),
        }
    }

    /// Clear a deleted platform id from whichever stored role still points at it.
    async fn forget_chat_id(&self, chat_id: &str) -> Settlement {
        let role = match self.store.role_by_chat_id(chat_id).await {
            Ok(role) => role,
            Err(err) => return Settlement::from_store(err),
        };
        if let Some(role) = role {
            if let Err(err) = self.store.set_role_chat_id(&role.id, None).await {
                if !err.is_not_found() {
                    return Settlement::from_store(err);
                }
            }
        }
        Settlement::Ack
    }

    async fn handle_member(&self, action: MemberAction) -> Settlement {
        if self.is_protected_id(&action.role_id) {
            return Settlement::Reject(format!("role {} cannot be assigned", action.role_id));
        }
        if action.guild_id != self.platform.guild_id() {
            return Settlement::Reject(format!("unknown guild {}", action.guild_id));
        }

        let role = match self.store.role_by_chat_id(&action.role_id).await {
            Ok(Some(role)) => role,
            Ok(None) => {
                return Settlement::Reject(format!("role {} is not managed", action.role_id))
            }
            Err(err) => return Settlement::from_store(err),
        };
        if self.config.is_ignored_role(&role.name) {
            return Settlement::Reject(format!("role `{}` is ignored", role.name));
        }

        match action.action {
            MemberActionKind::Add | MemberActionKind::Upsert => {
                self.add_member_role(&action.member_id, &role).await
            }
            MemberActionKind::Delete => {
                match self
                    .platform
                    .remove_member_role(&action.member_id, &action.role_id)
                    .await
                {
                    Ok(()) | Err(PlatformError::NotFound(_)) => {
                        tracing::info!(user = %action.member_id, role = %role.short_name, "role revoked");
                        Settlement::Ack
                    }
                    Err(err) => Settlement::from_platform(err),
                }
            }
        }
    }

    async fn add_member_role(&self, member_id: &str, role: &Role) -> Settlement {
        if !role.sync {
            return Settlement::Reject(format!("role `{}` is not synced", role.short_name));
        }
        let Some(chat_id) = role.chat_id.as_deref() else {
            return Settlement::Reject(format!("role `{}` has no platform id", role.short_name));
        };

        match self.platform.add_member_role(member_id, chat_id).await {
            Ok(()) => {
                tracing::info!(user = %member_id, role = %role.short_name, "role granted");
                Settlement::Ack
            }
            Err(err) => Settlement::from_platform(err),
        }
    }
}
