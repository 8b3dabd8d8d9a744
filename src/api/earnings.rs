use axum::extract::{Query, State};
use serde::Serialize;

use crate::api::dto::{PageQuery, PayoutDto, TransactionDto, WalletDto};
use crate::api::extract::{AdminUser, AuthUser};
use crate::api::{ApiResponse, ApiResult, AppState};
use crate::domain::TimeMs;
use crate::error::ServiceError;
use crate::orchestration::SweepReport;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsResponse {
    pub matched_pv_total: i64,
    pub matching_income: String,
    pub payouts: Vec<PayoutDto>,
}

pub async fn get_earnings(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<EarningsResponse> {
    let (limit, offset) = page.bounds();
    let payouts = state.repo.query_payouts(member.id, limit, offset).await?;
    let (matched_pv_total, income) = state.repo.matching_totals(member.id).await?;

    Ok(ApiResponse::ok(EarningsResponse {
        matched_pv_total,
        matching_income: income.to_canonical_string(),
        payouts: payouts.iter().map(PayoutDto::from).collect(),
    }))
}

pub async fn get_balance(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
) -> ApiResult<WalletDto> {
    let wallet = state
        .repo
        .get_wallet(member.id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Wallet of member {}", member.id)))?;
    Ok(ApiResponse::ok(WalletDto::from(&wallet)))
}

pub async fn get_transactions(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<TransactionDto>> {
    let (limit, offset) = page.bounds();
    let txs = state
        .repo
        .query_wallet_transactions(member.id, limit, offset)
        .await?;
    Ok(ApiResponse::ok(txs.iter().map(TransactionDto::from).collect()))
}

/// Run matching over every node holding PV on both legs.
pub async fn admin_sweep(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> ApiResult<SweepReport> {
    tracing::info!(admin_id = %admin.id, "Matching sweep requested");
    let report = state.matching.sweep(TimeMs::now()).await?;
    Ok(ApiResponse::ok(report))
}
