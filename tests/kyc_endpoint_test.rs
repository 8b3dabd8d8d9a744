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

fn documents() -> Value {
    json!({
        "panNumber": " abcde1234f ",
        "aadhaarNumber": "123412341234",
        "accountHolder": "Asha Rao",
        "accountNumber": "000111222",
        "ifscCode": "sbin0000001",
        "bankName": "State Bank",
    })
}

#[tokio::test]
async fn test_submit_review_and_resubmit() {
    let (app, _temp, root_code) = setup_test_app().await;
    let admin = login_root(&app).await;
    let member = register(&app, "Asha", &root_code, "left").await;

    let (status, body) = send(&app, "GET", "/api/kyc/status", Some(member.token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "not_submitted");

    let (status, body) = send(&app, "POST", "/api/kyc/submit", Some(member.token.as_str()), Some(documents())).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["panNumber"], "ABCDE1234F");
    assert_eq!(body["data"]["bankDetails"]["ifsc"], "SBIN0000001");

    // Pending records cannot be overwritten.
    let (status, body) = send(&app, "POST", "/api/kyc/submit", Some(member.token.as_str()), Some(documents())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "StateError");

    let (status, body) = send(&app, "GET", "/api/admin/kyc?status=pending", Some(admin.token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["memberId"], member.id);

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/admin/kyc/{}/reject", member.id),
        Some(admin.token.as_str()),
        Some(json!({ "remarks": "blurry PAN scan" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "rejected");
    assert_eq!(body["data"]["remarks"], "blurry PAN scan");

    let (status, body) = send(&app, "POST", "/api/kyc/submit", Some(member.token.as_str()), Some(documents())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"]["remarks"].is_null());

    let uri = format!("/api/admin/kyc/{}/approve", member.id);
    let (status, body) = send(&app, "PUT", &uri, Some(admin.token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["reviewerId"], admin.id);

    let (status, _) = send(&app, "PUT", &uri, Some(admin.token.as_str()), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_submit_requires_every_field() {
    let (app, _temp, root_code) = setup_test_app().await;
    let member = register(&app, "Ravi", &root_code, "right").await;

    let mut docs = documents();
    docs["bankName"] = json!("   ");
    let (status, body) = send(&app, "POST", "/api/kyc/submit", Some(member.token.as_str()), Some(docs)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");

    let (_, body) = send(&app, "GET", "/api/kyc/status", Some(member.token.as_str()), None).await;
    assert_eq!(body["data"]["status"], "not_submitted");
}

#[tokio::test]
async fn test_admin_list_filters() {
    let (app, _temp, root_code) = setup_test_app().await;
    let admin = login_root(&app).await;
    register(&app, "Idle", &root_code, "left").await;

    let (status, body) = send(&app, "GET", "/api/admin/kyc", Some(admin.token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    let (status, _) = send(&app, "GET", "/api/admin/kyc?status=archived", Some(admin.token.as_str()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PUT",
        "/api/admin/kyc/9999/approve",
        Some(admin.token.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
