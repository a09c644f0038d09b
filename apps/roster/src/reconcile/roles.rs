//! Keeps the guild's roles in line with the synced roles of the store.
//!
//! Desired and actual are joined by name. Platform ids are not stable: a role
//! recreated by hand gets a new id, which is written back to the store
//! instead of being treated as a delete plus create.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::{reconcile_once, Reconcile};
use crate::config::Config;
use crate::error::Result;
use crate::models::Role;
use crate::platform::{PlatformHandle, PlatformRole};
use crate::queue::messages::{RoleAction, ROLES_TOPIC};
use crate::queue::{publish_json, Queue};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub enum RolePlan {
    /// The platform holds the role under a different id than the store.
    CorrectChatId {
        role_id: String,
        name: String,
        chat_id: String,
    },
    Create(Role),
    Upsert { role: Role, platform_id: String },
    Delete { platform_id: String, name: String },
}

/// Three-way diff of synced store roles against platform roles, by name.
///
/// Id corrections come first so later actions see the healed id. An existing
/// role is only upserted when one of the owned attributes differs.
pub fn plan(desired: &[Role], actual: &[PlatformRole]) -> Vec<RolePlan> {
    let mut wanted: BTreeMap<&str, &Role> = BTreeMap::new();
    for role in desired {
        match wanted.entry(role.name.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(role);
            }
            Entry::Occupied(kept) => tracing::warn!(
                role = %role.name,
                kept = %kept.get().id,
                skipped = %role.id,
                "two synced roles share a name; only the first is reconciled"
            ),
        }
    }
    let mut present: BTreeMap<&str, &PlatformRole> = BTreeMap::new();
    for role in actual {
        match present.entry(role.name.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(role);
            }
            Entry::Occupied(kept) => tracing::warn!(
                role = %role.name,
                kept = %kept.get().id,
                skipped = %role.id,
                "guild holds two roles with one name; only the first is matched"
            ),
        }
    }

    let mut corrections = Vec::new();
    let mut changes = Vec::new();

    for (name, role) in &wanted {
        match present.get(name) {
            None => changes.push(RolePlan::Create((*role).clone())),
            Some(platform) => {
                if role.chat_id.as_deref() != Some(platform.id.as_str()) {
                    corrections.push(RolePlan::CorrectChatId {
                        role_id: role.id.clone(),
                        name: name.to_string(),
                        chat_id: platform.id.clone(),
                    });
                }
                if platform.differs_from(role) {
                    let mut role = (*role).clone();
                    role.chat_id = Some(platform.id.clone());
                    changes.push(RolePlan::Upsert {
                        role,
                        platform_id: platform.id.clone(),
                    });
                }
            }
        }
    }

    for (name, platform) in &present {
        if !wanted.contains_key(name) {
            changes.push(RolePlan::Delete {
                platform_id: platform.id.clone(),
                name: name.to_string(),
            });
        }
    }

    corrections.extend(changes);
    corrections
}

pub struct RoleReconciler {
    store: Arc<dyn Store>,
    platform: PlatformHandle,
    queue: Arc<dyn Queue>,
    config: Arc<Config>,
}

impl RoleReconciler {
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

    /// Reconcile on every tick of `interval` and whenever `trigger` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, trigger: Arc<Notify>, cancel: CancellationToken) {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
                _ = trigger.notified() => {
                    tracing::debug!("role reconcile requested");
                }
            }

            if let Err(err) = reconcile_once(self.as_ref()).await {
                tracing::warn!(?err, "role reconcile pass failed");
            }
        }

        tracing::info!("role reconciler stopped");
    }
}

#[async_trait]
impl Reconcile for RoleReconciler {
    type Desired = Vec<Role>;
    type Actual = Vec<PlatformRole>;
    type Action = RolePlan;

    fn name(&self) -> &'static str {
        "roles"
    }

    async fn desired(&self) -> Result<Vec<Role>> {
        Ok(self
            .store
            .list_roles(None)
            .await?
            .into_iter()
            .filter(|r| r.sync && !self.config.is_ignored_role(&r.name))
            .collect())
    }

    async fn actual(&self) -> Result<Vec<PlatformRole>> {
        let guild_id = self.platform.guild_id();
        Ok(self
            .platform
            .list_roles()
            .await?
            .into_iter()
            .filter(|r| r.id != guild_id && !r.managed && !self.config.is_ignored_role(&r.name))
            .collect())
    }

    fn diff(&self, desired: &Vec<Role>, actual: &Vec<PlatformRole>) -> Vec<RolePlan> {
        plan(desired, actual)
    }

    async fn apply(&self, actions: Vec<RolePlan>) -> Result<usize> {
        let mut applied = 0;
        for action in actions {
            match action {
                RolePlan::CorrectChatId {
                    role_id,
                    name,
                    chat_id,
                } => {
                    tracing::info!(role = %name, %chat_id, "correcting stored platform id");
                    self.store.set_role_chat_id(&role_id, Some(&chat_id)).await?;
                }
                RolePlan::Create(role) => {
                    publish_json(self.queue.as_ref(), ROLES_TOPIC, &RoleAction::create(&role))
                        .await?;
                }
                RolePlan::Upsert { role, platform_id } => {
                    publish_json(
                        self.queue.as_ref(),
                        ROLES_TOPIC,
                        &RoleAction::upsert(&role, &platform_id),
                    )
                    .await?;
                }
                RolePlan::Delete { platform_id, name } => {
                    publish_json(
                        self.queue.as_ref(),
                        ROLES_TOPIC,
                        &RoleAction::delete(&platform_id, &name),
                    )
                    .await?;
                }
            }
            applied += 1;
        }
        Ok(applied)
    }
}
