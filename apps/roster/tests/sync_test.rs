mod common;

use roster::models::{Alliance, Character, Corporation, FilterRef, RoleKind};
use roster::queue::messages::MemberActionKind;
use roster::store::{DirectoryStore, FilterStore, RoleStore};
use roster::sync::CharacterOutcome;

async fn alliance(app: &common::TestApp, id: i64, name: &str, ticker: &str) -> String {
    app.store
        .upsert_alliance(&Alliance {
            id,
            name: name.to_string(),
            ticker: ticker.to_string(),
        })
        .await
        .unwrap();
    app.directory.set_alliance(id, name, ticker);
    app.unit_role(ticker, name).await
}

async fn corporation(
    app: &common::TestApp,
    id: i64,
    name: &str,
    ticker: &str,
    alliance_id: Option<i64>,
) -> String {
    app.store
        .upsert_corporation(&Corporation {
            id,
            name: name.to_string(),
            ticker: ticker.to_string(),
            alliance_id,
        })
        .await
        .unwrap();
    app.directory.set_corporation(id, name, ticker, alliance_id);
    app.unit_role(ticker, name).await
}

async fn linked_character(app: &common::TestApp, id: i64, corporation_id: i64, user_id: &str) {
    app.store
        .upsert_character(&Character {
            id,
            name: format!("Pilot {id}"),
            corporation_id,
            token: String::new(),
        })
        .await
        .unwrap();
    app.store.link_character(user_id, id).await.unwrap();
}

async fn members(app: &common::TestApp, filter: &str) -> Vec<String> {
    app.store
        .list_filter_members(FilterRef::Name(filter))
        .await
        .unwrap()
}

async fn entitled_to(app: &common::TestApp, user_id: &str) -> Vec<String> {
    app.store
        .user_entitlements(user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.short_name)
        .collect()
}

// ---------------------------------------------------------------------------
// Characters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn corporation_move_migrates_four_filters() {
    let app = common::test_app();
    alliance(&app, 1, "Pea Alliance", "PPP").await;
    alliance(&app, 2, "Queue Alliance", "QQQ").await;
    corporation(&app, 10, "Ex Corp", "XXX", Some(1)).await;
    corporation(&app, 20, "Why Corp", "YYY", Some(2)).await;
    app.store.create_filter("other", "").await.unwrap();

    linked_character(&app, 100, 10, "u1").await;
    for filter in ["XXX", "PPP", "other"] {
        app.store
            .add_filter_member(FilterRef::Name(filter), "u1")
            .await
            .unwrap();
    }
    app.directory.set_character(100, "Pilot 100", 20);

    let outcome = app.state.sync.sync_character(100).await.unwrap();
    assert_eq!(outcome, CharacterOutcome::Synced);

    assert!(members(&app, "XXX").await.is_empty());
    assert!(members(&app, "PPP").await.is_empty());
    assert_eq!(members(&app, "YYY").await, vec!["u1".to_string()]);
    assert_eq!(members(&app, "QQQ").await, vec!["u1".to_string()]);
    assert_eq!(members(&app, "other").await, vec!["u1".to_string()]);

    let stored = app.store.get_character(100).await.unwrap().unwrap();
    assert_eq!(stored.corporation_id, 20);
}

#[tokio::test]
async fn poll_moves_entitlement_and_queues_exact_role_changes() {
    let app = common::test_app();
    let alli = alliance(&app, 5, "Alliance", "ALLI").await;
    let aaa = corporation(&app, 10, "Alpha", "AAA", None).await;
    let bbb = corporation(&app, 20, "Bravo", "BBB", Some(5)).await;

    linked_character(&app, 100, 10, "u1").await;
    app.store
        .add_filter_member(FilterRef::Name("AAA"), "u1")
        .await
        .unwrap();
    app.platform.seed_member("u1", &[&aaa]);
    assert_eq!(entitled_to(&app, "u1").await, vec!["AAA".to_string()]);

    app.directory.set_character(100, "Pilot 100", 20);
    let report = app.state.sync.poll_once().await;
    assert!(report.is_success(), "{report:?}");

    assert_eq!(
        entitled_to(&app, "u1").await,
        vec!["ALLI".to_string(), "BBB".to_string()]
    );

    let actions = app.member_actions();
    assert_eq!(actions.len(), 3, "{actions:?}");
    let count = |kind: MemberActionKind, role: &str| {
        actions
            .iter()
            .filter(|a| a.action == kind && a.role_id == role && a.member_id == "u1")
            .count()
    };
    assert_eq!(count(MemberActionKind::Add, &alli), 1);
    assert_eq!(count(MemberActionKind::Add, &bbb), 1);
    assert_eq!(count(MemberActionKind::Delete, &aaa), 1);
}

#[tokio::test]
async fn character_without_corporation_is_transient() {
    let app = common::test_app();
    corporation(&app, 10, "Alpha", "AAA", None).await;
    linked_character(&app, 100, 10, "u1").await;
    app.directory.set_character(100, "Pilot 100", 0);

    let err = app.state.sync.sync_character(100).await.unwrap_err();
    assert!(err.is_transient());

    let stored = app.store.get_character(100).await.unwrap().unwrap();
    assert_eq!(stored.corporation_id, 10);
}

#[tokio::test]
async fn vanished_character_is_deleted() {
    let app = common::test_app();
    corporation(&app, 10, "Alpha", "AAA", None).await;
    linked_character(&app, 100, 10, "u1").await;

    let outcome = app.state.sync.sync_character(100).await.unwrap();
    assert_eq!(outcome, CharacterOutcome::Deleted);
    assert!(app.store.get_character(100).await.unwrap().is_none());
    assert!(app.store.user_for_character(100).await.unwrap().is_none());
}

#[tokio::test]
async fn unreachable_directory_leaves_character_alone() {
    let app = common::test_app();
    corporation(&app, 10, "Alpha", "AAA", None).await;
    linked_character(&app, 100, 10, "u1").await;
    app.directory.set_character(100, "Renamed", 10);
    app.directory.set_unavailable(100, true);

    let err = app.state.sync.sync_character(100).await.unwrap_err();
    assert!(err.is_transient());
    let stored = app.store.get_character(100).await.unwrap().unwrap();
    assert_eq!(stored.name, "Pilot 100");

    // The claim is released after a failure.
    app.directory.set_unavailable(100, false);
    assert_eq!(
        app.state.sync.sync_character(100).await.unwrap(),
        CharacterOutcome::Synced
    );
    let stored = app.store.get_character(100).await.unwrap().unwrap();
    assert_eq!(stored.name, "Renamed");
}

#[tokio::test]
async fn registering_with_unreachable_corporation_stores_a_stub() {
    let app = common::test_app();
    app.directory.set_character(100, "Pilot", 30);
    app.directory.set_unavailable(30, true);

    let character = app.state.sync.register_character(100, "token").await.unwrap();
    assert_eq!(character.corporation_id, 30);

    let corporation = app.store.get_corporation(30).await.unwrap().unwrap();
    assert!(corporation.is_stub());

    let err = app
        .state
        .sync
        .register_character(101, "token")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

// ---------------------------------------------------------------------------
// Alliances and corporations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dissolved_alliance_loses_its_role() {
    let app = common::test_app();
    alliance(&app, 1, "Pea Alliance", "PPP").await;
    app.directory.remove_alliance(1);

    assert!(app.state.sync.sync_alliance(1).await.unwrap().is_none());
    assert!(app.store.get_alliance(1).await.unwrap().is_none());
    assert!(app
        .store
        .get_role("PPP", RoleKind::Role)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn new_corporation_gets_a_synced_unit_role() {
    let app = common::test_app();
    app.directory.set_corporation(10, "Alpha", "AAA", Some(5));
    app.directory.set_alliance(5, "Alliance", "ALLI");

    let corporation = app.state.sync.sync_corporation(10).await.unwrap().unwrap();
    assert_eq!(corporation.alliance_id, Some(5));

    let role = app.store.get_role("AAA", RoleKind::Role).await.unwrap();
    assert!(role.sync);
    assert_eq!(role.name, "Alpha");
    assert!(app.store.get_alliance(5).await.unwrap().is_some());
    assert!(app.store.get_role("ALLI", RoleKind::Role).await.is_ok());
}

#[tokio::test]
async fn ticker_change_renames_role_and_keeps_members() {
    let app = common::test_app();
    corporation(&app, 10, "Alpha", "AAA", None).await;
    app.store
        .add_filter_member(FilterRef::Name("AAA"), "u1")
        .await
        .unwrap();
    app.directory.set_corporation(10, "Alpha Prime", "AAP", None);

    app.state.sync.sync_corporation(10).await.unwrap();

    let role = app.store.get_role("AAP", RoleKind::Role).await.unwrap();
    assert_eq!(role.name, "Alpha Prime");
    assert_eq!(members(&app, "AAP").await, vec!["u1".to_string()]);
    assert!(app
        .store
        .get_role("AAA", RoleKind::Role)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn corporation_alliance_change_moves_its_members() {
    let app = common::test_app();
    alliance(&app, 1, "Pea Alliance", "PPP").await;
    alliance(&app, 2, "Queue Alliance", "QQQ").await;
    corporation(&app, 10, "Ex Corp", "XXX", Some(1)).await;
    for filter in ["XXX", "PPP"] {
        app.store
            .add_filter_member(FilterRef::Name(filter), "u1")
            .await
            .unwrap();
    }
    app.directory.set_corporation(10, "Ex Corp", "XXX", Some(2));

    app.state.sync.sync_corporation(10).await.unwrap();

    assert!(members(&app, "PPP").await.is_empty());
    assert_eq!(members(&app, "QQQ").await, vec!["u1".to_string()]);
    assert_eq!(members(&app, "XXX").await, vec!["u1".to_string()]);
}

#[tokio::test]
async fn one_failing_entity_does_not_abort_the_pass() {
    let app = common::test_app();
    alliance(&app, 1, "Pea Alliance", "PPP").await;
    alliance(&app, 2, "Queue Alliance", "QQQ").await;
    app.directory.set_unavailable(1, true);
    app.directory.set_alliance(2, "Queue Alliance Renamed", "QQQ");

    let report = app.state.sync.poll_once().await;
    assert_eq!(report.alliances.failed, 1);
    assert_eq!(report.alliances.processed, 1);
    assert!(!report.is_success());

    let role = app.store.get_role("QQQ", RoleKind::Role).await.unwrap();
    assert_eq!(role.name, "Queue Alliance Renamed");
}
