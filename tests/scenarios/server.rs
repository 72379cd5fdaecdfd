//! The JSON API over a real server.
//!
//! These tests start a server on a random port backed by an on-disk
//! database, send raw HTTP/1.1 over TCP and assert on what comes back.

use std::net::SocketAddr;
use std::sync::Arc;

use canopy::api::NodeModule;
use canopy::auth;
use canopy::config::{Auth, Config, Database, Navigator, PickerField, Server as ServerConfig};
use canopy::db::{self, SqlStore};
use canopy::node::{Node, NodeType};
use canopy::permission::{Capabilities, PermissionSet};
use canopy::server;
use canopy::session::MemorySessions;
use canopy::{Router, module};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    server: server::Server,
    auth: Auth,
    _dir: TempDir,
}

impl Harness {
    fn token(&self, user: &str) -> String {
        auth::issue_token(&self.auth, user).unwrap().0
    }
}

struct Reply {
    status: u16,
    head: String,
    body: String,
}

impl Reply {
    fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("invalid JSON body ({e}): {}", self.body))
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

async fn start_test_server() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nodes.db");
    let url = path.to_str().unwrap().to_string();

    let db = db::connect(&url).await.unwrap();
    let store = SqlStore::open(&db, "tl_node").unwrap();
    store.migrate().await.unwrap();
    for node in [
        Node::new(1, 0, NodeType::Folder, "A").with_languages(["de", "en"]),
        Node::new(2, 1, NodeType::Content, "B"),
        Node::new(3, 1, NodeType::Folder, "C"),
        Node::new(4, 3, NodeType::Content, "D"),
        Node::new(7, 0, NodeType::Folder, "Other"),
    ] {
        store.save_node(&node).await.unwrap();
    }
    store.save_user("admin", &PermissionSet::admin()).await.unwrap();
    store
        .save_user(
            "editor",
            &PermissionSet::user(
                Capabilities::CREATE | Capabilities::EDIT | Capabilities::DELETE,
                [1],
            ),
        )
        .await
        .unwrap();

    let auth = Auth {
        jwt_secret: "test-secret-that-is-at-least-32b!".to_string(),
        token_expiry_days: 1,
    };
    let config = Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: Database { url },
        auth: auth.clone(),
        navigator: Navigator {
            picker_fields: vec![PickerField {
                table: "tl_node".into(),
                field: "related".into(),
            }],
            ..Default::default()
        },
    };

    let mut router = Router::new();
    module::register(&mut router, &[&NodeModule]);

    let server = server::start(
        config,
        Some(Arc::new(db)),
        router.into_handle(),
        MemorySessions::shared(),
    )
    .await
    .expect("failed to start test server");

    Harness {
        server,
        auth,
        _dir: dir,
    }
}

/// Send one request with `Connection: close` and read the full response.
async fn send(
    addr: SocketAddr,
    method: &str,
    target: &str,
    token: Option<&str>,
    body: Option<&str>,
) -> Reply {
    let body = body.unwrap_or("");
    let auth = token
        .map(|t| format!("Authorization: Bearer {t}\r\n"))
        .unwrap_or_default();
    let payload = format!(
        "{method} {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n{auth}\
         Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );

    let mut stream = TcpStream::connect(addr).await.expect("failed to connect");
    stream
        .write_all(payload.as_bytes())
        .await
        .expect("failed to write");

    let mut buf = Vec::new();
    let _ = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        stream.read_to_end(&mut buf),
    )
    .await;

    let raw = String::from_utf8_lossy(&buf).into_owned();
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw.as_str(), ""));
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("no status line in response:\n{raw}"));
    Reply {
        status,
        head: head.to_string(),
        body: body.to_string(),
    }
}

async fn get(addr: SocketAddr, target: &str, token: &str) -> Reply {
    send(addr, "GET", target, Some(token), None).await
}

fn labels(reply: &Reply) -> Vec<String> {
    reply.json()["breadcrumb"]["crumbs"]
        .as_array()
        .expect("breadcrumb crumbs")
        .iter()
        .map(|c| c["label"].as_str().unwrap_or_default().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requests_need_a_known_user() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();

    let anonymous = send(addr, "GET", "/nodes", None, None).await;
    let stranger = get(addr, "/nodes", &harness.token("ghost")).await;

    harness.server.shutdown().await.unwrap();

    assert_eq!(anonymous.status, 401);
    assert_eq!(stranger.status, 401);
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn selection_redirects_then_renders_the_trail() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let token = harness.token("editor");

    let selected = get(addr, "/nodes?do=node&nn=2", &token).await;
    let loaded = get(addr, "/nodes", &token).await;

    harness.server.shutdown().await.unwrap();

    assert_eq!(selected.status, 307);
    assert_eq!(selected.header("location"), Some("/nodes?do=node"));
    assert_eq!(loaded.status, 200, "{}", loaded.body);
    assert_eq!(labels(&loaded), vec!["All nodes", "A", "B"]);
    assert_eq!(loaded.json()["outcome"], "ready");
    assert_eq!(loaded.json()["policy"]["roots"], serde_json::json!([2]));
}

#[tokio::test]
async fn admin_trail_spans_the_whole_tree() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let token = harness.token("admin");

    get(addr, "/nodes?nn=4", &token).await;
    let loaded = get(addr, "/nodes", &token).await;

    harness.server.shutdown().await.unwrap();

    assert_eq!(labels(&loaded), vec!["All nodes", "A", "C", "D"]);
}

#[tokio::test]
async fn sessions_are_per_token() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let first = harness.token("editor");
    let second = harness.token("editor");

    get(addr, "/nodes?nn=3", &first).await;
    let other = get(addr, "/nodes", &second).await;

    harness.server.shutdown().await.unwrap();

    assert_eq!(other.status, 200);
    assert!(other.json()["breadcrumb"].is_null());
}

#[tokio::test]
async fn unmounted_selection_is_rejected_once_then_forgotten() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let token = harness.token("editor");

    get(addr, "/nodes?nn=7", &token).await;
    let denied = get(addr, "/nodes", &token).await;
    let after = get(addr, "/nodes", &token).await;

    harness.server.shutdown().await.unwrap();

    assert_eq!(denied.status, 403);
    assert_eq!(denied.json()["error"], "Node ID 7 is not mounted.");
    assert_eq!(after.status, 200);
    assert!(after.json()["breadcrumb"].is_null());
}

#[tokio::test]
async fn empty_selection_leaves_the_node() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let token = harness.token("editor");

    get(addr, "/nodes?nn=2", &token).await;
    let cleared = get(addr, "/nodes?do=node&nn=", &token).await;
    let loaded = get(addr, "/nodes", &token).await;

    harness.server.shutdown().await.unwrap();

    assert_eq!(cleared.status, 307);
    assert_eq!(cleared.header("location"), Some("/nodes?do=node"));
    assert_eq!(loaded.status, 200, "{}", loaded.body);
    assert!(loaded.json()["breadcrumb"].is_null());
}

#[tokio::test]
async fn insecure_and_malformed_selections_are_bad_requests() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let token = harness.token("editor");

    let traversal = get(addr, "/nodes?nn=..%2F1", &token).await;
    let word = get(addr, "/nodes?nn=abc", &token).await;
    let action = get(addr, "/nodes?act=explode&id=1", &token).await;

    harness.server.shutdown().await.unwrap();

    assert_eq!(traversal.status, 400);
    assert_eq!(word.status, 400);
    assert_eq!(action.status, 400);
}

#[tokio::test]
async fn actions_outside_the_mount_are_denied() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let token = harness.token("editor");

    let inside = get(addr, "/nodes?act=edit&id=4", &token).await;
    let outside = get(addr, "/nodes?act=delete&id=7", &token).await;

    harness.server.shutdown().await.unwrap();

    assert_eq!(inside.status, 200, "{}", inside.body);
    assert_eq!(outside.status, 403);
    assert_eq!(
        outside.json()["error"],
        "Not enough permissions to delete node ID 7."
    );
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn buttons_follow_node_type_and_clipboard() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let token = harness.token("editor");

    let content = get(addr, "/nodes/2/buttons", &token).await;
    let root = get(addr, "/nodes/1/buttons", &token).await;
    let cut = get(addr, "/nodes/3/buttons?mode=cut&clipboard=3", &token).await;
    let hidden = get(addr, "/nodes/7/buttons", &token).await;
    let missing = get(addr, "/nodes/99/buttons", &token).await;
    let bad_mode = get(addr, "/nodes/3/buttons?mode=shred", &token).await;

    harness.server.shutdown().await.unwrap();

    let content = content.json();
    assert_eq!(content["paste_into"], false);
    assert_eq!(content["paste_after"], true);
    assert_eq!(content["delete"], true);

    let root = root.json();
    assert_eq!(root["delete"], false);
    assert_eq!(root["paste_after"], false);
    assert_eq!(root["copy_children"], true);

    let cut = cut.json();
    assert_eq!(cut["paste_after"], false);
    assert_eq!(cut["paste_into"], false);

    assert_eq!(hidden.status, 403);
    assert_eq!(missing.status, 404);
    assert_eq!(bad_mode.status, 400);
}

#[tokio::test]
async fn labels_carry_icon_and_languages() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let token = harness.token("editor");

    let folder = get(addr, "/nodes/1/label", &token).await;
    let content = get(addr, "/nodes/2/label", &token).await;

    harness.server.shutdown().await.unwrap();

    let folder = folder.json();
    assert_eq!(folder["icon"], "folderC.svg");
    assert_eq!(folder["languages"], serde_json::json!(["de", "en"]));
    assert_eq!(content.json()["icon"], "articles.svg");
    assert_eq!(content.json()["name"], "B");
}

// ---------------------------------------------------------------------------
// Selection and picker
// ---------------------------------------------------------------------------

#[tokio::test]
async fn working_set_is_filtered_to_the_mount() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let token = harness.token("editor");

    let reply = send(
        addr,
        "PUT",
        "/nodes/selection",
        Some(&token),
        Some(r#"{"ids":[1,2,3,7]}"#),
    )
    .await;

    harness.server.shutdown().await.unwrap();

    assert_eq!(reply.status, 200, "{}", reply.body);
    assert_eq!(reply.json()["ids"], serde_json::json!([1, 2, 3]));
}

#[tokio::test]
async fn picker_resolves_visible_nodes_only() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let token = harness.token("editor");

    let reply = send(
        addr,
        "POST",
        "/nodes/picker",
        Some(&token),
        Some(r#"{"table":"tl_node","name":"related","id":"3","value":"2\t7\t4"}"#),
    )
    .await;
    let unknown_field = send(
        addr,
        "POST",
        "/nodes/picker",
        Some(&token),
        Some(r#"{"table":"tl_node","name":"other","value":""}"#),
    )
    .await;
    let missing_record = send(
        addr,
        "POST",
        "/nodes/picker",
        Some(&token),
        Some(r#"{"table":"tl_node","name":"related","id":"42","value":""}"#),
    )
    .await;

    harness.server.shutdown().await.unwrap();

    assert_eq!(reply.status, 200, "{}", reply.body);
    let state = reply.json();
    assert_eq!(state["record"], 3);
    let ids: Vec<i64> = state["selected"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 4]);

    assert_eq!(unknown_field.status, 400);
    assert_eq!(missing_record.status, 400);
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let harness = start_test_server().await;
    let addr = harness.server.addr();
    let token = harness.token("editor");

    let missing = get(addr, "/elsewhere", &token).await;
    let wrong_method = send(addr, "DELETE", "/nodes", Some(&token), None).await;

    harness.server.shutdown().await.unwrap();

    assert_eq!(missing.status, 404);
    assert_eq!(wrong_method.status, 405);
    assert_eq!(missing.header("x-content-type-options"), Some("nosniff"));
}
