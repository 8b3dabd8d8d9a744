pub mod auth;
pub mod dto;
pub mod earnings;
pub mod extract;
pub mod health;
pub mod kyc;
pub mod team;
pub mod topups;
pub mod withdrawals;

use crate::config::Config;
use crate::db::Repository;
use crate::error::AppError;
use crate::notify::Dispatcher;
use crate::orchestration::{
    Authenticator, KycDesk, MatchingEngine, Registrar, TopUpDesk, WithdrawalDesk,
};
use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub auth: Authenticator,
    pub registrar: Registrar,
    pub matching: MatchingEngine,
    pub topups: TopUpDesk,
    pub withdrawals: WithdrawalDesk,
    pub kyc: KycDesk,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config, notifications: Dispatcher) -> Self {
        let matching = MatchingEngine::new(
            repo.clone(),
            notifications.clone(),
            config.matching_sweep_concurrency,
        );
        Self {
            auth: Authenticator::new(repo.clone(), config.session_ttl_ms),
            registrar: Registrar::new(repo.clone(), notifications.clone(), &config),
            topups: TopUpDesk::new(repo.clone(), notifications.clone(), matching.clone()),
            withdrawals: WithdrawalDesk::new(repo.clone(), notifications.clone(), config.min_withdrawal),
            kyc: KycDesk::new(repo.clone(), notifications),
            matching,
            repo,
            config,
        }
    }
}

/// `{ "success": true, "data": ..., "message": ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        })
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/user/profile", get(auth::profile))
        .route("/api/user/team/tree", get(team::get_tree))
        .route("/api/user/team/stats", get(team::get_stats))
        .route("/api/team/node/:id/children", get(team::get_children))
        .route("/api/user/earnings", get(earnings::get_earnings))
        .route("/api/wallet/balance", get(earnings::get_balance))
        .route("/api/wallet/transactions", get(earnings::get_transactions))
        .route("/api/plans", get(topups::list_plans))
        .route("/api/topup/request", post(topups::request_topup))
        .route("/api/topup/history", get(topups::topup_history))
        .route("/api/withdrawal/request", post(withdrawals::request_withdrawal))
        .route("/api/withdrawal/history", get(withdrawals::withdrawal_history))
        .route("/api/kyc/submit", post(kyc::submit))
        .route("/api/kyc/status", get(kyc::status))
        .route("/api/admin/withdrawals", get(withdrawals::admin_list))
        .route("/api/admin/withdrawals/export", get(withdrawals::admin_export))
        .route("/api/admin/withdrawals/:id/approve", put(withdrawals::admin_approve))
        .route("/api/admin/withdrawals/:id/reject", put(withdrawals::admin_reject))
        .route("/api/admin/topups", get(topups::admin_list))
        .route("/api/admin/topups/:id/approve", put(topups::admin_approve))
        .route("/api/admin/topups/:id/reject", put(topups::admin_reject))
        .route("/api/admin/plans", post(topups::admin_create_plan))
        .route("/api/admin/matching/sweep", post(earnings::admin_sweep))
        .route("/api/admin/kyc", get(kyc::admin_list))
        .route("/api/admin/kyc/:member_id/approve", put(kyc::admin_approve))
        .route("/api/admin/kyc/:member_id/reject", put(kyc::admin_reject))
        .layer(cors)
        .with_state(state)
}
