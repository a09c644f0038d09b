#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use roster::actuator::Settlement;
use roster::config::Config;
use roster::directory::memory::MemoryDirectory;
use roster::models::{NewRole, RoleKind};
use roster::platform::memory::MemoryPlatform;
use roster::platform::RoleAttrs;
use roster::queue::messages::{MemberAction, RoleAction, MEMBERS_TOPIC, ROLES_TOPIC};
use roster::queue::{MemoryQueue, Queue};
use roster::store::{MemoryStore, PermissionStore, RoleStore};
use roster::AppState;

pub const GUILD_ID: &str = "100000000000000000";
pub const ADMIN_TOKEN: &str = "test-admin-token";

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        redis_url: String::new(),
        discord_token: String::new(),
        guild_id: GUILD_ID.to_string(),
        admin_token: ADMIN_TOKEN.to_string(),
        esi_url: String::new(),
        port: 0,
        sync_interval: Duration::from_secs(3600),
        reconcile_interval: Duration::from_secs(300),
        actuator_workers: 1,
        ignored_roles: vec!["Server Booster".to_string()],
        queue_prefix: "roster-test".to_string(),
        server_admins: Vec::new(),
    }
}

/// Application state over in-memory backends, with handles to each fake.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub platform: Arc<MemoryPlatform>,
    pub directory: Arc<MemoryDirectory>,
    pub queue: Arc<MemoryQueue>,
}

pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let platform = Arc::new(MemoryPlatform::new(GUILD_ID));
    let directory = Arc::new(MemoryDirectory::new());
    let queue = Arc::new(MemoryQueue::new());

    let state = AppState::new(
        test_config(),
        store.clone(),
        platform.clone(),
        directory.clone(),
        queue.clone(),
    );

    TestApp {
        state,
        store,
        platform,
        directory,
        queue,
    }
}

impl TestApp {
    pub fn router(&self) -> Router {
        roster::routes::router().with_state(self.state.clone())
    }

    /// A synced `role`-kind role that already exists on the platform.
    /// Returns the platform id.
    pub async fn unit_role(&self, ticker: &str, name: &str) -> String {
        let role_id = self
            .store
            .create_role(&NewRole::new(RoleKind::Role, ticker, name).synced(true))
            .await
            .expect("create role");

        let chat_id = self.platform.seed_role(
            &RoleAttrs {
                name: name.to_string(),
                ..RoleAttrs::default()
            },
            false,
        );
        self.store
            .set_role_chat_id(&role_id, Some(&chat_id))
            .await
            .expect("set chat id");
        chat_id
    }

    /// Grant `permission` to `user_id`, creating the permission if needed.
    pub async fn grant(&self, permission: &str, user_id: &str) {
        self.store
            .ensure_permission(permission, permission)
            .await
            .expect("ensure permission");
        self.store
            .grant_permission(permission, user_id)
            .await
            .expect("grant permission");
    }

    /// Run the actuator over `topic` until it is empty.
    pub async fn run_actuator(&self, topic: &str) -> Vec<Settlement> {
        let mut settlements = Vec::new();
        for _ in 0..100 {
            let Some(delivery) = self
                .queue
                .next(topic, Duration::ZERO)
                .await
                .expect("queue next")
            else {
                break;
            };
            settlements.push(
                self.state
                    .actuator
                    .process(&delivery)
                    .await
                    .expect("settle delivery"),
            );
        }
        settlements
    }

    pub fn role_actions(&self) -> Vec<RoleAction> {
        self.queue
            .pending(ROLES_TOPIC)
            .iter()
            .map(|p| serde_json::from_str(p).expect("role action"))
            .collect()
    }

    pub fn member_actions(&self) -> Vec<MemberAction> {
        self.queue
            .pending(MEMBERS_TOPIC)
            .iter()
            .map(|p| serde_json::from_str(p).expect("member action"))
            .collect()
    }
}
