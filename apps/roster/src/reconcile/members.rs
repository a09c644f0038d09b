//! Per-user role assignment: filter-derived entitlement against the roles the
//! user actually holds on the platform.

use std::sync::Arc;

use async_trait::async_trait;
use roster_common::Set;

use super::{reconcile_once, Reconcile};
use crate::error::Result;
use crate::platform::PlatformHandle;
use crate::queue::messages::{MemberAction, MEMBERS_TOPIC};
use crate::queue::{publish_json, Queue};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberPlan {
    Grant { user_id: String, chat_id: String },
    Revoke { user_id: String, chat_id: String },
}

/// What the store says a user should hold.
#[derive(Debug, Default)]
pub struct Entitlement {
    /// Platform ids of the managed roles the user is entitled to.
    pub entitled: Set<String>,
    /// Platform ids of every managed role; only these may be revoked.
    pub managed: Set<String>,
}

/// Grants are entitled roles the user lacks; revokes are managed roles the
/// user holds without entitlement. Unmanaged roles are never touched.
pub fn plan(user_id: &str, desired: &Entitlement, held: &Set<String>) -> Vec<MemberPlan> {
    let grants = desired.entitled.difference(held);
    let revokes = held
        .intersection(&desired.managed)
        .difference(&desired.entitled);

    let mut actions: Vec<MemberPlan> = grants
        .to_sorted_vec()
        .into_iter()
        .map(|chat_id| MemberPlan::Grant {
            user_id: user_id.to_string(),
            chat_id,
        })
        .collect();
    actions.extend(
        revokes
            .to_sorted_vec()
            .into_iter()
            .map(|chat_id| MemberPlan::Revoke {
                user_id: user_id.to_string(),
                chat_id,
            }),
    );
    actions
}

pub struct MemberReconciler {
    store: Arc<dyn Store>,
    platform: PlatformHandle,
    queue: Arc<dyn Queue>,
}

impl MemberReconciler {
    pub fn new(store: Arc<dyn Store>, platform: PlatformHandle, queue: Arc<dyn Queue>) -> Self {
        Self {
            store,
            platform,
            queue,
        }
    }

    /// Reconcile one user's roles; returns the number of actions enqueued.
    pub async fn reconcile_user(&self, user_id: &str) -> Result<usize> {
        reconcile_once(&UserRoles {
            reconciler: self,
            user_id,
        })
        .await
    }
}

/// One user's slice of the member reconciliation.
pub struct UserRoles<'a> {
    reconciler: &'a MemberReconciler,
    user_id: &'a str,
}

#[async_trait]
impl Reconcile for UserRoles<'_> {
    type Desired = Entitlement;
    type Actual = Set<String>;
    type Action = MemberPlan;

    fn name(&self) -> &'static str {
        "members"
    }

    async fn desired(&self) -> Result<Entitlement> {
        let store = &self.reconciler.store;

        let managed: Set<String> = store
            .list_roles(None)
            .await?
            .into_iter()
            .filter(|r| r.sync)
            .filter_map(|r| r.chat_id)
            .collect();
        let entitled: Set<String> = store
            .user_entitlements(self.user_id)
            .await?
            .into_iter()
            .filter(|r| r.sync)
            .filter_map(|r| r.chat_id)
            .collect();

        Ok(Entitlement { entitled, managed })
    }

    async fn actual(&self) -> Result<Set<String>> {
        let member = self.reconciler.platform.get_member(self.user_id).await?;
        Ok(member.roles.into_iter().collect())
    }

    fn diff(&self, desired: &Entitlement, actual: &Set<String>) -> Vec<MemberPlan> {
        plan(self.user_id, desired, actual)
    }

    async fn apply(&self, actions: Vec<MemberPlan>) -> Result<usize> {
        let guild_id = self.reconciler.platform.guild_id();
        let queue = self.reconciler.queue.as_ref();
        let mut applied = 0;

        for action in actions {
            let message = match &action {
                MemberPlan::Grant { user_id, chat_id } => {
                    tracing::info!(user = %user_id, role = %chat_id, "granting role");
                    MemberAction::add(guild_id, user_id, chat_id)
                }
                MemberPlan::Revoke { user_id, chat_id } => {
                    tracing::info!(user = %user_id, role = %chat_id, "revoking role");
                    MemberAction::delete(guild_id, user_id, chat_id)
                }
            };
            publish_json(queue, MEMBERS_TOPIC, &message).await?;
            applied += 1;
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> Set<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn grants_missing_and_revokes_unentitled_managed_roles() {
        let desired = Entitlement {
            entitled: set(&["alli", "bbb"]),
            managed: set(&["aaa", "alli", "bbb"]),
        };
        let held = set(&["aaa", "booster"]);

        let actions = plan("u1", &desired, &held);

        assert_eq!(
            actions,
            vec![
                MemberPlan::Grant {
                    user_id: "u1".into(),
                    chat_id: "alli".into()
                },
                MemberPlan::Grant {
                    user_id: "u1".into(),
                    chat_id: "bbb".into()
                },
                MemberPlan::Revoke {
                    user_id: "u1".into(),
                    chat_id: "aaa".into()
                },
            ]
        );
    }

    #[test]
    fn converged_user_yields_nothing() {
        let desired = Entitlement {
            entitled: set(&["a"]),
            managed: set(&["a", "b"]),
        };
        assert!(plan("u1", &desired, &set(&["a", "other"])).is_empty());
    }
}
