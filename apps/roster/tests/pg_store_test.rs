//! `PgStore` against the `_test` database named by `DATABASE_URL`.
//!
//! Every test works on its own role and filter names, so tests can share one
//! database and run in parallel.

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::sync::OnceCell;

use roster::error::ErrorKind;
use roster::models::{FilterRef, NewRole, RoleKind};
use roster::store::{FilterStore, PgStore, RoleStore};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

static MIGRATED: OnceCell<String> = OnceCell::const_new();

/// Connect to the test database, applying pending migrations once per run.
///
/// Reads `DATABASE_URL` from the `.env` file at `CARGO_MANIFEST_DIR`.
async fn test_store() -> PgStore {
    let database_url = MIGRATED
        .get_or_init(|| async {
            let env_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
            let _ = dotenvy::from_path(env_path);

            let database_url =
                with_test_db_suffix(&std::env::var("DATABASE_URL").expect("DATABASE_URL"));
            let url = database_url.clone();
            tokio::task::spawn_blocking(move || {
                let mut conn = PgConnection::establish(&url).expect("connect to test database");
                conn.run_pending_migrations(MIGRATIONS)
                    .expect("run migrations");
            })
            .await
            .expect("migration task");
            database_url
        })
        .await;

    let pool = roster::db::pool::connect(database_url).expect("pool");
    PgStore::new(pool)
}

fn with_test_db_suffix(database_url: &str) -> String {
    let mut parts = database_url.splitn(2, '?');
    let base = parts.next().unwrap_or(database_url);
    let query = parts.next();

    let mut base_parts = base.rsplitn(2, '/');
    let db_name = base_parts.next().unwrap_or("");
    let prefix = base_parts.next().unwrap_or("");

    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    let mut updated = format!("{prefix}/{db_name}_test");
    if let Some(query) = query {
        updated.push('?');
        updated.push_str(query);
    }
    updated
}

/// A name no other test run uses.
fn unique(base: &str) -> String {
    let suffix: u32 = rand::random();
    format!("{base}_{suffix}")
}

// ---------------------------------------------------------------------------
// Entitlement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn entitlement_is_conjunctive() {
    let store = test_store().await;
    let role = unique("fc");
    let veterans = unique("veterans");
    let (u1, u2, u3) = (unique("u1"), unique("u2"), unique("u3"));

    store
        .create_role(&NewRole::new(RoleKind::Role, &role, "Fleet Commanders"))
        .await
        .unwrap();
    store.create_filter(&veterans, "Members for a year").await.unwrap();
    store
        .attach_filter(&role, RoleKind::Role, FilterRef::Name(&veterans))
        .await
        .unwrap();

    for user in [&u1, &u2] {
        store.add_filter_member(FilterRef::Name(&role), user).await.unwrap();
    }
    for user in [&u2, &u3] {
        store
            .add_filter_member(FilterRef::Name(&veterans), user)
            .await
            .unwrap();
    }

    let entitled = store
        .get_role_entitlement(&role, RoleKind::Role)
        .await
        .unwrap();
    assert_eq!(entitled, vec![u2.clone()]);

    assert!(store.user_entitlements(&u1).await.unwrap().is_empty());
    assert!(store.user_entitlements(&u3).await.unwrap().is_empty());
    let roles = store.user_entitlements(&u2).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].short_name, role);
}

#[tokio::test]
async fn role_without_filters_entitles_nobody() {
    let store = test_store().await;
    let role = unique("mining");
    let user = unique("u1");

    store
        .create_role(&NewRole::new(RoleKind::Sig, &role, "Miners"))
        .await
        .unwrap();
    store
        .add_filter_member(FilterRef::Name(&role), &user)
        .await
        .unwrap();
    assert_eq!(
        store.get_role_entitlement(&role, RoleKind::Sig).await.unwrap(),
        vec![user.clone()]
    );

    store
        .detach_filter(&role, RoleKind::Sig, FilterRef::Name(&role))
        .await
        .unwrap();

    assert!(store
        .get_role_entitlement(&role, RoleKind::Sig)
        .await
        .unwrap()
        .is_empty());
    assert!(store.user_entitlements(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn role_is_created_with_its_sync_flag() {
    let store = test_store().await;
    let unit = unique("aaa");
    let plain = unique("hr");

    store
        .create_role(&NewRole::new(RoleKind::Role, &unit, "Unit").synced(true))
        .await
        .unwrap();
    store
        .create_role(&NewRole::new(RoleKind::Role, &plain, "Human Resources"))
        .await
        .unwrap();

    assert!(store.get_role(&unit, RoleKind::Role).await.unwrap().sync);
    assert!(!store.get_role(&plain, RoleKind::Role).await.unwrap().sync);
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[tokio::test]
async fn adding_a_member_twice_is_already_member() {
    let store = test_store().await;
    let filter = unique("scouts");
    let user = unique("u1");

    store.create_filter(&filter, "").await.unwrap();
    store
        .add_filter_member(FilterRef::Name(&filter), &user)
        .await
        .unwrap();

    let err = store
        .add_filter_member(FilterRef::Name(&filter), &user)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyMember);
    assert_eq!(
        store
            .list_filter_members(FilterRef::Name(&filter))
            .await
            .unwrap(),
        vec![user]
    );
}

#[tokio::test]
async fn duplicate_filter_name_is_already_exists() {
    let store = test_store().await;
    let filter = unique("scouts");

    store.create_filter(&filter, "").await.unwrap();
    let err = store.create_filter(&filter, "again").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);
}

// ---------------------------------------------------------------------------
// Cascades
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleting_a_role_cascades_to_its_filters() {
    let store = test_store().await;
    let role = unique("hr");
    let extra = unique("extra");
    let user = unique("u1");

    store
        .create_role(&NewRole::new(RoleKind::Role, &role, "Human Resources"))
        .await
        .unwrap();
    store.create_filter(&extra, "").await.unwrap();
    store
        .attach_filter(&role, RoleKind::Role, FilterRef::Name(&extra))
        .await
        .unwrap();
    store
        .add_filter_member(FilterRef::Name(&role), &user)
        .await
        .unwrap();
    store
        .add_filter_member(FilterRef::Name(&extra), &user)
        .await
        .unwrap();

    store.delete_role(&role, RoleKind::Role).await.unwrap();

    assert!(store
        .get_role(&role, RoleKind::Role)
        .await
        .unwrap_err()
        .is_not_found());
    for filter in [&role, &extra] {
        assert!(store
            .get_filter(FilterRef::Name(filter))
            .await
            .unwrap_err()
            .is_not_found());
    }
    assert!(store.user_entitlements(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_filter_detaches_it_and_widens_the_role() {
    let store = test_store().await;
    let role = unique("hr");
    let sig = unique("miners");
    let extra = unique("extra");
    let user = unique("u1");

    store
        .create_role(&NewRole::new(RoleKind::Role, &role, "Human Resources"))
        .await
        .unwrap();
    store
        .create_role(&NewRole::new(RoleKind::Sig, &sig, "Miners"))
        .await
        .unwrap();
    store.create_filter(&extra, "").await.unwrap();
    store
        .attach_filter(&role, RoleKind::Role, FilterRef::Name(&extra))
        .await
        .unwrap();
    store
        .attach_filter(&sig, RoleKind::Sig, FilterRef::Name(&extra))
        .await
        .unwrap();
    store
        .add_filter_member(FilterRef::Name(&role), &user)
        .await
        .unwrap();
    assert!(store
        .get_role_entitlement(&role, RoleKind::Role)
        .await
        .unwrap()
        .is_empty());

    let mut attached: Vec<String> = store
        .filter_roles(FilterRef::Name(&extra))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.short_name)
        .collect();
    attached.sort();
    let mut expected = vec![role.clone(), sig.clone()];
    expected.sort();
    assert_eq!(attached, expected);

    store.delete_filter(FilterRef::Name(&extra)).await.unwrap();

    let filters = store.role_filters(&role, RoleKind::Role).await.unwrap();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].name, role);
    assert_eq!(
        store
            .get_role_entitlement(&role, RoleKind::Role)
            .await
            .unwrap(),
        vec![user]
    );
}
