//! Selection, breadcrumb trails and the load hook.

use canopy::Error;
use canopy::config;
use canopy::navigator::{LoadOutcome, LoadRequest, Navigator, NavigatorState};
use canopy::node::{Node, NodeType};
use canopy::permission::{Action, Capabilities, PermissionGate, PermissionSet};
use canopy::session::{Session, SessionContext};
use canopy::store::MemoryStore;
use canopy::tree::walk_up;

use super::sample_tree;

fn navigator<'a>(
    store: &'a MemoryStore,
    config: &'a config::Navigator,
    permissions: PermissionSet,
    session: Session,
) -> Navigator<'a, MemoryStore, PermissionSet> {
    Navigator::new(
        store,
        PermissionGate::new(permissions.clone()),
        permissions,
        SessionContext::new(session, &config.table, &config.session_key),
        config,
    )
}

fn editor() -> PermissionSet {
    PermissionSet::user(Capabilities::EDIT | Capabilities::DELETE, [1])
}

fn positioned_at(config: &config::Navigator, token: &str) -> Session {
    let mut session = Session::default();
    session.set(&config.session_key, token).unwrap();
    session
}

#[tokio::test]
async fn walks_are_bounded_by_depth() {
    let store = sample_tree();
    let depths = [(1, 0), (2, 1), (3, 1), (4, 2), (5, 1), (7, 0)];
    for (id, depth) in depths {
        let walk = walk_up(&store, id, |_| false).await.unwrap();
        let mut ids = walk.ids();
        assert!(ids.len() <= depth + 1, "walk from {id} took {} steps", ids.len());
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), walk.nodes.len(), "walk from {id} revisited a node");
    }
}

#[tokio::test]
async fn mounted_user_sees_trail_to_content_node() {
    let store = sample_tree();
    let config = config::Navigator::default();
    let mut nav = navigator(&store, &config, editor(), Session::default());

    assert_eq!(nav.select("2").unwrap(), NavigatorState::Positioned(2));
    let trail = nav.breadcrumb().await.unwrap().unwrap();
    assert_eq!(trail.labels(), vec!["All nodes", "A", "B"]);
    assert_eq!(trail.node, 2);
}

#[tokio::test]
async fn trail_starts_at_the_users_mount() {
    let store = sample_tree();
    let config = config::Navigator::default();
    let perms = PermissionSet::user(Capabilities::EDIT, [3]);
    let mut nav = navigator(&store, &config, perms, Session::default());

    nav.select("4").unwrap();
    let trail = nav.breadcrumb().await.unwrap().unwrap();
    assert_eq!(trail.labels(), vec!["All nodes", "C", "D"]);

    let mut nav = navigator(&store, &config, PermissionSet::admin(), Session::default());
    nav.select("4").unwrap();
    let trail = nav.breadcrumb().await.unwrap().unwrap();
    assert_eq!(trail.labels(), vec!["All nodes", "A", "C", "D"]);
}

#[tokio::test]
async fn reselecting_moves_the_position() {
    let mut store = sample_tree();
    let config = config::Navigator::default();
    let session = positioned_at(&config, "2");

    let mut nav = navigator(&store, &config, editor(), session);
    assert_eq!(nav.state(), NavigatorState::Positioned(2));
    nav.select("5").unwrap();
    assert_eq!(nav.state(), NavigatorState::Positioned(5));
    let session = nav.into_session().into_session();

    // The node disappears before the next request.
    store.remove(5);
    let mut nav = navigator(&store, &config, editor(), session);
    assert!(nav.breadcrumb().await.unwrap().is_none());
    assert_eq!(nav.state(), NavigatorState::Unset);
}

#[tokio::test]
async fn selecting_a_missing_node_resets() {
    let store = sample_tree();
    let config = config::Navigator::default();
    let mut nav = navigator(&store, &config, editor(), positioned_at(&config, "5"));

    nav.select("999").unwrap();
    assert!(nav.breadcrumb().await.unwrap().is_none());
    assert_eq!(nav.state(), NavigatorState::Unset);
    assert_eq!(nav.session().position_token().as_deref(), Some("0"));
}

#[tokio::test]
async fn selecting_zero_or_less_clears_the_position() {
    let store = sample_tree();
    let config = config::Navigator::default();
    let mut nav = navigator(&store, &config, editor(), positioned_at(&config, "2"));

    assert_eq!(nav.select("0").unwrap(), NavigatorState::Unset);
    nav.select("2").unwrap();
    assert_eq!(nav.select("-4").unwrap(), NavigatorState::Unset);
    assert!(nav.breadcrumb().await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_selections_are_rejected() {
    let store = sample_tree();
    let config = config::Navigator::default();
    let mut nav = navigator(&store, &config, editor(), positioned_at(&config, "2"));

    assert!(matches!(nav.select("..\\2"), Err(Error::InsecurePath(_))));
    assert!(matches!(nav.select("two"), Err(Error::BadRequest(_))));
    assert_eq!(nav.state(), NavigatorState::Positioned(2));
}

#[tokio::test]
async fn insecure_stored_token_fails_the_trail() {
    let store = sample_tree();
    let config = config::Navigator::default();
    let mut nav = navigator(&store, &config, editor(), positioned_at(&config, "../2"));

    assert!(matches!(
        nav.breadcrumb().await,
        Err(Error::InsecurePath(_))
    ));
}

#[tokio::test]
async fn unmounted_position_is_forgotten_for_the_next_request() {
    let store = sample_tree();
    let config = config::Navigator::default();
    let mut nav = navigator(&store, &config, editor(), positioned_at(&config, "7"));

    assert!(matches!(nav.breadcrumb().await, Err(Error::NotMounted(7))));
    let session = nav.into_session().into_session();

    let mut nav = navigator(&store, &config, editor(), session);
    assert!(nav.breadcrumb().await.unwrap().is_none());
}

#[tokio::test]
async fn load_denies_actions_outside_the_mount() {
    let store = sample_tree();
    let config = config::Navigator::default();
    let mut nav = navigator(&store, &config, editor(), Session::default());

    let err = nav
        .load(&LoadRequest {
            uri: "/nodes?act=edit&id=7",
            action: Some(Action::Edit),
            id: Some(7),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.is_access_denied());

    let outcome = nav
        .load(&LoadRequest {
            uri: "/nodes?act=edit&id=4",
            action: Some(Action::Edit),
            id: Some(4),
            ..Default::default()
        })
        .await
        .unwrap();
    let LoadOutcome::Ready { breadcrumb, policy } = outcome else {
        panic!("expected a ready outcome");
    };
    assert!(breadcrumb.is_none());
    assert_eq!(policy.roots, Some(vec![1]));
    assert!(policy.closed);
    assert!(!policy.not_editable);
    assert!(!policy.not_deletable);
}

#[tokio::test]
async fn load_flags_content_edits_for_content_managers() {
    let mut store = sample_tree();
    store.insert(Node::new(8, 5, NodeType::Content, "F"));
    let config = config::Navigator::default();
    let perms = PermissionSet::user(Capabilities::EDIT | Capabilities::CONTENT, [1]);
    let mut nav = navigator(&store, &config, perms, Session::default());

    let LoadOutcome::Ready { policy, .. } = nav
        .load(&LoadRequest {
            uri: "/nodes?act=edit&id=8",
            action: Some(Action::Edit),
            id: Some(8),
            ..Default::default()
        })
        .await
        .unwrap()
    else {
        panic!("expected a ready outcome");
    };
    assert!(policy.switch_to_edit);
}
