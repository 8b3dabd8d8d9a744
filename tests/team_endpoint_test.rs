use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;
use treeledger::api::{self, AppState};
use treeledger::config::RootAccount;
use treeledger::db::init_db;
use treeledger::orchestration::Registrar;
use treeledger::{Config, Dispatcher, MockNotifier, Repository, TimeMs};

const ROOT_EMAIL: &str = "root@treeledger.test";
const ROOT_PASSWORD: &str = "rootpass";
const STARTER_PLAN: i64 = 1;

async fn setup_test_app() -> (axum::Router, TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let notifications = Dispatcher::spawn(Arc::new(MockNotifier::new()));
    let config = Config::for_database(db_path);

    let root = Registrar::new(repo.clone(), notifications.clone(), &config)
        .bootstrap_root(
            &RootAccount {
                name: "Root".to_string(),
                email: ROOT_EMAIL.to_string(),
                password: ROOT_PASSWORD.to_string(),
            },
            TimeMs::now(),
        )
        .await
        .unwrap()
        .unwrap();

    let state = AppState::new(repo, config, notifications);
    (api::create_router(state), temp_dir, root.referral_code)
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

/// Logged-in member: `(token, member id)`.
struct Session {
    token: String,
    id: i64,
}

fn session(body: &Value) -> Session {
    Session {
        token: body["data"]["token"].as_str().unwrap().to_string(),
        id: body["data"]["member"]["id"].as_i64().unwrap(),
    }
}

async fn login_root(app: &axum::Router) -> Session {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": ROOT_EMAIL, "password": ROOT_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    session(&body)
}

async fn register(app: &axum::Router, name: &str, sponsor: &str, side: &str) -> Session {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "name": name,
            "email": format!("{}@example.com", name.to_lowercase()),
            "password": "secret1",
            "sponsorCode": sponsor,
            "side": side,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    session(&body)
}

async fn activate(app: &axum::Router, admin: &Session, member: &Session) {
    let (_, body) = send(
        app,
        "POST",
        "/api/topup/request",
        Some(member.token.as_str()),
        Some(json!({ "planId": STARTER_PLAN })),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();
    let (status, _) = send(
        app,
        "PUT",
        &format!("/api/admin/topups/{}/approve", id),
        Some(admin.token.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

/// Root with L and R as direct children and S spilled under L.
async fn three_members(app: &axum::Router, root_code: &str) -> (Session, Session, Session, Session) {
    let root = login_root(app).await;
    let left = register(app, "L", root_code, "left").await;
    let right = register(app, "R", root_code, "right").await;
    let spilled = register(app, "S", root_code, "left").await;
    (root, left, right, spilled)
}

#[tokio::test]
async fn test_tree_respects_depth_cut() {
    let (app, _temp, root_code) = setup_test_app().await;
    let (root, left, right, spilled) = three_members(&app, &root_code).await;

    let (status, body) = send(&app, "GET", "/api/user/team/tree?depth=1", Some(root.token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    let tree = &body["data"];
    assert_eq!(tree["id"], root.id);
    let children = tree["children"].as_array().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["id"], left.id);
    assert_eq!(children[0]["side"], "left");
    assert_eq!(children[0]["hasChildren"], true);
    assert!(children[0]["children"].as_array().unwrap().is_empty());
    assert_eq!(children[1]["id"], right.id);
    assert_eq!(children[1]["hasChildren"], false);

    let (_, body) = send(&app, "GET", "/api/user/team/tree", Some(root.token.as_str()), None).await;
    let grandchildren = body["data"]["children"][0]["children"].as_array().unwrap();
    assert_eq!(grandchildren.len(), 1);
    assert_eq!(grandchildren[0]["id"], spilled.id);

    let (status, body) = send(&app, "GET", "/api/user/team/tree?depth=0", Some(root.token.as_str()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");
}

#[tokio::test]
async fn test_children_limited_to_own_subtree() {
    let (app, _temp, root_code) = setup_test_app().await;
    let (root, left, right, spilled) = three_members(&app, &root_code).await;

    let uri = format!("/api/team/node/{}/children", left.id);
    let (status, body) = send(&app, "GET", &uri, Some(root.token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], spilled.id);

    let (status, body) = send(&app, "GET", &uri, Some(left.token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(&app, "GET", &uri, Some(right.token.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFoundError");
}

#[tokio::test]
async fn test_stats_count_legs_and_pv() {
    let (app, _temp, root_code) = setup_test_app().await;
    let (root, left, right, spilled) = three_members(&app, &root_code).await;

    activate(&app, &root, &root).await;
    activate(&app, &root, &spilled).await;
    activate(&app, &root, &right).await;

    let (status, body) = send(&app, "GET", "/api/user/team/stats", Some(root.token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    let stats = &body["data"];
    assert_eq!(stats["leftCount"], 2);
    assert_eq!(stats["rightCount"], 1);
    assert_eq!(stats["leftActive"], 1);
    assert_eq!(stats["rightActive"], 1);
    assert_eq!(stats["leftPvTotal"], 10);
    assert_eq!(stats["rightPvTotal"], 10);
    assert_eq!(stats["matchedPvTotal"], 10);
    assert_eq!(stats["leftCarry"], 0);
    assert_eq!(stats["rightCarry"], 0);
    assert_eq!(stats["matchingIncome"], "250");

    // L is inactive: its carry waits for its own activation.
    let (_, body) = send(&app, "GET", "/api/user/team/stats", Some(left.token.as_str()), None).await;
    assert_eq!(body["data"]["leftCarry"], 10);
    assert_eq!(body["data"]["matchingIncome"], "0");

    let (status, body) = send(&app, "GET", "/api/user/earnings", Some(root.token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["payouts"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["payouts"][0]["amount"], "250");

    let (_, body) = send(&app, "GET", "/api/wallet/transactions", Some(root.token.as_str()), None).await;
    let txs = body["data"].as_array().unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0]["amount"], "250");
}

#[tokio::test]
async fn test_admin_sweep_reports_nothing_when_matched() {
    let (app, _temp, root_code) = setup_test_app().await;
    let (root, _left, _right, _spilled) = three_members(&app, &root_code).await;

    let (status, body) = send(&app, "POST", "/api/admin/matching/sweep", Some(root.token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["scanned"], 0);
    assert_eq!(body["data"]["matched"], 0);
}
