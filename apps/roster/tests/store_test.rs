mod common;

use roster::error::ErrorKind;
use roster::models::{Character, FilterRef, NewRole, RoleKind};
use roster::store::{DirectoryStore, FilterStore, RoleStore};

// ---------------------------------------------------------------------------
// Entitlement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn entitlement_is_conjunctive() {
    let app = common::test_app();
    let store = &app.store;

    store
        .create_role(&NewRole::new(RoleKind::Role, "FC", "Fleet Commanders"))
        .await
        .unwrap();
    store.create_filter("veterans", "Members for a year").await.unwrap();
    store
        .attach_filter("FC", RoleKind::Role, FilterRef::Name("veterans"))
        .await
        .unwrap();

    store.add_filter_member(FilterRef::Name("FC"), "u1").await.unwrap();
    store.add_filter_member(FilterRef::Name("FC"), "u2").await.unwrap();
    store
        .add_filter_member(FilterRef::Name("veterans"), "u2")
        .await
        .unwrap();
    store
        .add_filter_member(FilterRef::Name("veterans"), "u3")
        .await
        .unwrap();

    let entitled = store
        .get_role_entitlement("FC", RoleKind::Role)
        .await
        .unwrap();
    assert_eq!(entitled, vec!["u2".to_string()]);

    let u1 = store.user_entitlements("u1").await.unwrap();
    assert!(u1.is_empty());
    let u2 = store.user_entitlements("u2").await.unwrap();
    assert_eq!(u2.len(), 1);
    assert_eq!(u2[0].short_name, "FC");
}

#[tokio::test]
async fn role_without_filters_entitles_nobody() {
    let app = common::test_app();
    let store = &app.store;

    store
        .create_role(&NewRole::new(RoleKind::Sig, "mining", "Miners"))
        .await
        .unwrap();
    store
        .add_filter_member(FilterRef::Name("mining"), "u1")
        .await
        .unwrap();
    store
        .detach_filter("mining", RoleKind::Sig, FilterRef::Name("mining"))
        .await
        .unwrap();

    assert!(store
        .get_role_entitlement("mining", RoleKind::Sig)
        .await
        .unwrap()
        .is_empty());
    assert!(store.user_entitlements("u1").await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[tokio::test]
async fn adding_a_member_twice_is_already_member() {
    let app = common::test_app();
    let store = &app.store;
    store.create_filter("pilots", "").await.unwrap();

    store
        .add_filter_member(FilterRef::Name("pilots"), "u1")
        .await
        .unwrap();
    let err = store
        .add_filter_member(FilterRef::Name("pilots"), "u1")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyMember);
    assert!(err.is_noop());

    let members = store
        .list_filter_members(FilterRef::Name("pilots"))
        .await
        .unwrap();
    assert_eq!(members, vec!["u1".to_string()]);
}

#[tokio::test]
async fn removing_a_non_member_is_a_noop() {
    let app = common::test_app();
    let store = &app.store;
    store.create_filter("pilots", "").await.unwrap();

    store
        .remove_filter_member(FilterRef::Name("pilots"), "nobody")
        .await
        .unwrap();

    let err = store
        .remove_filter_member(FilterRef::Name("missing"), "nobody")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn duplicate_filter_and_role_names_are_rejected() {
    let app = common::test_app();
    let store = &app.store;

    store.create_filter("taken", "").await.unwrap();
    let err = store.create_filter("taken", "").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);

    // The default filter of a new role would collide with `taken`.
    let err = store
        .create_role(&NewRole::new(RoleKind::Sig, "taken", "Taken"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);
}

// ---------------------------------------------------------------------------
// Cascades
// ---------------------------------------------------------------------------

#[tokio::test]
async fn role_is_created_with_its_sync_flag() {
    let app = common::test_app();
    let store = &app.store;

    store
        .create_role(&NewRole::new(RoleKind::Role, "AAA", "Alpha").synced(true))
        .await
        .unwrap();
    store
        .create_role(&NewRole::new(RoleKind::Role, "HR", "Human Resources"))
        .await
        .unwrap();

    assert!(store.get_role("AAA", RoleKind::Role).await.unwrap().sync);
    assert!(!store.get_role("HR", RoleKind::Role).await.unwrap().sync);
}

#[tokio::test]
async fn deleting_a_role_cascades_to_its_filter() {
    let app = common::test_app();
    let store = &app.store;

    store
        .create_role(&NewRole::new(RoleKind::Role, "HR", "Human Resources"))
        .await
        .unwrap();
    store.add_filter_member(FilterRef::Name("HR"), "u1").await.unwrap();

    store.delete_role("HR", RoleKind::Role).await.unwrap();

    let err = store
        .get_role_entitlement("HR", RoleKind::Role)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(store
        .get_filter(FilterRef::Name("HR"))
        .await
        .unwrap_err()
        .is_not_found());
    assert!(store.user_entitlements("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_filter_detaches_it() {
    let app = common::test_app();
    let store = &app.store;

    store
        .create_role(&NewRole::new(RoleKind::Role, "HR", "Human Resources"))
        .await
        .unwrap();
    store.create_filter("extra", "").await.unwrap();
    store
        .attach_filter("HR", RoleKind::Role, FilterRef::Name("extra"))
        .await
        .unwrap();

    store
        .create_role(&NewRole::new(RoleKind::Sig, "miners", "Miners"))
        .await
        .unwrap();
    store
        .attach_filter("miners", RoleKind::Sig, FilterRef::Name("extra"))
        .await
        .unwrap();
    let attached: Vec<String> = store
        .filter_roles(FilterRef::Name("extra"))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.short_name)
        .collect();
    assert_eq!(attached, vec!["HR".to_string(), "miners".to_string()]);

    store.delete_filter(FilterRef::Name("extra")).await.unwrap();

    let filters = store.role_filters("HR", RoleKind::Role).await.unwrap();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].name, "HR");
}

#[tokio::test]
async fn deleting_a_character_drops_its_link_and_codes() {
    let app = common::test_app();
    let store = &app.store;

    store
        .upsert_character(&Character {
            id: 100,
            name: "Pilot".to_string(),
            corporation_id: 10,
            token: String::new(),
        })
        .await
        .unwrap();
    let code = store.create_auth_code(100).await.unwrap();
    let linked = store.redeem_auth_code(&code, "u1").await.unwrap();
    assert_eq!(linked.id, 100);
    assert_eq!(
        store.user_for_character(100).await.unwrap().as_deref(),
        Some("u1")
    );

    // Codes are single use.
    assert!(store
        .redeem_auth_code(&code, "u2")
        .await
        .unwrap_err()
        .is_not_found());

    let unused = store.create_auth_code(100).await.unwrap();
    store.delete_character(100).await.unwrap();

    assert!(store.user_for_character(100).await.unwrap().is_none());
    assert!(store
        .redeem_auth_code(&unused, "u1")
        .await
        .unwrap_err()
        .is_not_found());
}
