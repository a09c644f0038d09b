pub mod actuator;
pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod models;
pub mod platform;
pub mod queue;
pub mod reconcile;
pub mod routes;
pub mod store;
pub mod sync;

use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use actuator::Actuator;
use config::Config;
use directory::Directory;
use platform::{ChatPlatform, PlatformHandle};
use queue::Queue;
use reconcile::{MemberReconciler, RoleReconciler};
use store::Store;
use sync::DirectorySync;

/// Shared application state, handed to route handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub platform: PlatformHandle,
    pub queue: Arc<dyn Queue>,
    pub roles: Arc<RoleReconciler>,
    pub members: Arc<MemberReconciler>,
    pub sync: Arc<DirectorySync>,
    pub actuator: Arc<Actuator>,
    /// Wakes the role reconciler ahead of its next tick.
    pub reconcile_trigger: Arc<Notify>,
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        platform: Arc<dyn ChatPlatform>,
        directory: Arc<dyn Directory>,
        queue: Arc<dyn Queue>,
    ) -> Self {
        let config = Arc::new(config);
        let cancel = CancellationToken::new();
        let platform = PlatformHandle::new(platform, config.guild_id.clone());

        let roles = Arc::new(RoleReconciler::new(
            store.clone(),
            platform.clone(),
            queue.clone(),
            config.clone(),
        ));
        let members = Arc::new(MemberReconciler::new(
            store.clone(),
            platform.clone(),
            queue.clone(),
        ));
        let sync = Arc::new(DirectorySync::new(
            store.clone(),
            directory,
            members.clone(),
            cancel.clone(),
        ));
        let actuator = Arc::new(Actuator::new(
            store.clone(),
            platform.clone(),
            queue.clone(),
            config.clone(),
        ));

        Self {
            config,
            store,
            platform,
            queue,
            roles,
            members,
            sync,
            actuator,
            reconcile_trigger: Arc::new(Notify::new()),
            cancel,
        }
    }

    /// Ask the role reconciler for a pass after a role changed.
    pub fn request_role_reconcile(&self) {
        self.reconcile_trigger.notify_one();
    }
}
