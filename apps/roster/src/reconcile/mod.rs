//! Reconciliation loops: observe the desired state, observe the actual
//! state, diff the two and emit corrective actions.

pub mod members;
pub mod roles;

use async_trait::async_trait;

use crate::error::Result;

pub use members::{MemberPlan, MemberReconciler};
pub use roles::{RolePlan, RoleReconciler};

#[async_trait]
pub trait Reconcile: Send + Sync {
    type Desired: Send + Sync;
    type Actual: Send + Sync;
    type Action: Send + std::fmt::Debug;

    /// Short label used in logs.
    fn name(&self) -> &'static str;

    async fn desired(&self) -> Result<Self::Desired>;

    async fn actual(&self) -> Result<Self::Actual>;

    /// Pure: the actions that take `actual` to `desired`.
    fn diff(&self, desired: &Self::Desired, actual: &Self::Actual) -> Vec<Self::Action>;

    /// Carry out the actions; returns how many were applied.
    async fn apply(&self, actions: Vec<Self::Action>) -> Result<usize>;
}

/// One full pass. Both sides are observed fresh; nothing is cached.
pub async fn reconcile_once<R: Reconcile + ?Sized>(reconciler: &R) -> Result<usize> {
    let desired = reconciler.desired().await?;
    let actual = reconciler.actual().await?;
    let actions = reconciler.diff(&desired, &actual);
    if actions.is_empty() {
        tracing::debug!(reconciler = reconciler.name(), "already converged");
        return Ok(0);
    }

    tracing::debug!(reconciler = reconciler.name(), ?actions, "applying plan");
    let applied = reconciler.apply(actions).await?;
    tracing::info!(reconciler = reconciler.name(), applied, "reconcile pass done");
    Ok(applied)
}
