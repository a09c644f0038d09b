mod common;

use roster::actuator::Settlement;
use roster::models::{FilterRef, NewRole, RoleKind, RolePatch};
use roster::platform::RoleAttrs;
use roster::queue::messages::{MemberActionKind, RoleActionKind, MEMBERS_TOPIC, ROLES_TOPIC};
use roster::reconcile::reconcile_once;
use roster::store::{FilterStore, RoleStore};

async fn synced_sig(app: &common::TestApp, short_name: &str) {
    app.store
        .create_role(&NewRole::new(RoleKind::Sig, short_name, short_name))
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Role reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn creates_missing_and_deletes_unwanted_roles() {
    let app = common::test_app();

    synced_sig(&app, "A").await;
    synced_sig(&app, "B").await;
    let a_id = app.platform.seed_role(
        &RoleAttrs {
            name: "A".to_string(),
            ..RoleAttrs::default()
        },
        false,
    );
    app.platform.seed_role(
        &RoleAttrs {
            name: "C".to_string(),
            ..RoleAttrs::default()
        },
        false,
    );

    reconcile_once(app.state.roles.as_ref()).await.unwrap();

    let actions = app.role_actions();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].action, RoleActionKind::Create);
    assert_eq!(actions[0].role.attrs.name, "B");
    assert_eq!(actions[1].action, RoleActionKind::Delete);
    assert_eq!(actions[1].role.attrs.name, "C");

    // A was matched by name and its platform id recorded.
    let a = app.store.get_role("A", RoleKind::Sig).await.unwrap();
    assert_eq!(a.chat_id.as_deref(), Some(a_id.as_str()));

    let settlements = app.run_actuator(ROLES_TOPIC).await;
    assert_eq!(settlements, vec![Settlement::Ack, Settlement::Ack]);

    let names: Vec<String> = app.platform.roles().into_iter().map(|r| r.name).collect();
    assert!(names.contains(&"A".to_string()));
    assert!(names.contains(&"B".to_string()));
    assert!(!names.contains(&"C".to_string()));

    let b = app.store.get_role("B", RoleKind::Sig).await.unwrap();
    assert_eq!(
        b.chat_id,
        app.platform.role_named("B").map(|r| r.id),
        "created role id is written back"
    );

    // A second pass finds nothing to do.
    assert_eq!(reconcile_once(app.state.roles.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn leaves_unsynced_ignored_and_managed_roles_alone() {
    let app = common::test_app();

    app.store
        .create_role(&NewRole::new(RoleKind::Role, "HR", "Human Resources"))
        .await
        .unwrap();
    app.platform.seed_role(
        &RoleAttrs {
            name: "Server Booster".to_string(),
            ..RoleAttrs::default()
        },
        false,
    );
    app.platform.seed_role(
        &RoleAttrs {
            name: "Some Bot".to_string(),
            ..RoleAttrs::default()
        },
        true,
    );

    assert_eq!(reconcile_once(app.state.roles.as_ref()).await.unwrap(), 0);
    assert!(app.role_actions().is_empty());
}

#[tokio::test]
async fn attribute_drift_is_upserted() {
    let app = common::test_app();
    synced_sig(&app, "A").await;
    app.platform.seed_role(
        &RoleAttrs {
            name: "A".to_string(),
            ..RoleAttrs::default()
        },
        false,
    );
    reconcile_once(app.state.roles.as_ref()).await.unwrap();

    let patch = RolePatch {
        color: Some(0xFF0000),
        ..RolePatch::default()
    };
    app.store
        .update_role_attributes("A", RoleKind::Sig, &patch)
        .await
        .unwrap();

    assert_eq!(reconcile_once(app.state.roles.as_ref()).await.unwrap(), 1);
    let actions = app.role_actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, RoleActionKind::Upsert);
    assert_eq!(actions[0].role.attrs.color, 0xFF0000);

    app.run_actuator(ROLES_TOPIC).await;
    assert_eq!(app.platform.role_named("A").unwrap().color, 0xFF0000);
}

// ---------------------------------------------------------------------------
// Member reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn member_roles_follow_entitlement() {
    let app = common::test_app();
    let fc = app.unit_role("FC", "Fleet Commanders").await;
    let hr = app.unit_role("HR", "Human Resources").await;
    let unmanaged = app.platform.seed_role(
        &RoleAttrs {
            name: "Hand Made".to_string(),
            ..RoleAttrs::default()
        },
        false,
    );

    app.platform.seed_member("u1", &[&hr, &unmanaged]);
    app.store
        .add_filter_member(FilterRef::Name("FC"), "u1")
        .await
        .unwrap();

    assert_eq!(app.state.members.reconcile_user("u1").await.unwrap(), 2);

    let actions = app.member_actions();
    let grants: Vec<&str> = actions
        .iter()
        .filter(|a| a.action == MemberActionKind::Add)
        .map(|a| a.role_id.as_str())
        .collect();
    let revokes: Vec<&str> = actions
        .iter()
        .filter(|a| a.action == MemberActionKind::Delete)
        .map(|a| a.role_id.as_str())
        .collect();
    assert_eq!(grants, vec![fc.as_str()]);
    assert_eq!(revokes, vec![hr.as_str()]);

    app.run_actuator(MEMBERS_TOPIC).await;
    let mut held = app.platform.member_roles("u1");
    held.sort();
    let mut expected = vec![fc, unmanaged];
    expected.sort();
    assert_eq!(held, expected);
}

#[tokio::test]
async fn unknown_member_is_not_found() {
    let app = common::test_app();
    let err = app.state.members.reconcile_user("ghost").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(app.member_actions().is_empty());
}
