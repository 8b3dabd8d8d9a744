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
        .expect("empty tree gets a root");

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

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _temp, _) = setup_test_app().await;

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/health")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let body_str = String::from_utf8(body.to_vec()).unwrap();
    assert!(body_str.contains("ok"));
}

#[tokio::test]
async fn test_ready_endpoint() {
    let (app, _temp, _) = setup_test_app().await;

    let (status, _) = send(&app, "GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _temp, _) = setup_test_app().await;

    let (status, body) = send(&app, "GET", "/api/user/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "Unauthorized");

    let (status, _) = send(&app, "GET", "/api/wallet/balance", Some("not-a-session"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_plans_are_public_and_seeded() {
    let (app, _temp, _) = setup_test_app().await;

    let (status, body) = send(&app, "GET", "/api/plans", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let plans = body["data"].as_array().unwrap();
    assert_eq!(plans.len(), 3);
    assert_eq!(plans[0]["name"], "Starter");
    assert_eq!(plans[0]["pv"], 10);
}

#[tokio::test]
async fn test_register_login_profile() {
    let (app, _temp, root_code) = setup_test_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Asha",
            "email": "Asha@Example.com",
            "password": "secret1",
            "referralCode": root_code.to_lowercase(),
            "position": "left",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["data"]["token"].as_str().is_some());
    assert_eq!(body["data"]["member"]["email"], "asha@example.com");
    assert_eq!(body["data"]["member"]["side"], "left");
    assert_eq!(body["data"]["member"]["isActive"], false);

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "asha@example.com", "password": "secret1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/api/user/profile", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Asha");
    assert_eq!(body["data"]["role"], "user");
    assert_eq!(body["data"]["depth"], 1);
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let (app, _temp, _) = setup_test_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": ROOT_EMAIL, "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_admin_routes_forbidden_for_members() {
    let (app, _temp, root_code) = setup_test_app().await;

    let (_, body) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Ravi",
            "email": "ravi@example.com",
            "password": "secret1",
            "sponsorCode": root_code,
            "side": "right",
        })),
    )
    .await;
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/api/admin/withdrawals", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "Forbidden");

    let (_, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": ROOT_EMAIL, "password": ROOT_PASSWORD })),
    )
    .await;
    let admin = body["data"]["token"].as_str().unwrap().to_string();
    let (status, body) = send(&app, "GET", "/api/admin/withdrawals", Some(admin.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_concurrent_plan_creation_conflicts() {
    let (app, _temp, _) = setup_test_app().await;

    let (_, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": ROOT_EMAIL, "password": ROOT_PASSWORD })),
    )
    .await;
    let admin = body["data"]["token"].as_str().unwrap().to_string();
    let plan = json!({ "name": "Platinum", "price": "10000", "pv": 100, "matchingRate": "25" });

    let (first, second) = tokio::join!(
        send(&app, "POST", "/api/admin/plans", Some(admin.as_str()), Some(plan.clone())),
        send(&app, "POST", "/api/admin/plans", Some(admin.as_str()), Some(plan.clone())),
    );
    let mut statuses = vec![first.0.as_u16(), second.0.as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![200, 409]);
    let conflict = if first.0 == StatusCode::CONFLICT { &first.1 } else { &second.1 };
    assert_eq!(conflict["kind"], "ConflictError");

    let (_, body) = send(&app, "GET", "/api/plans", None, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 4);
}
