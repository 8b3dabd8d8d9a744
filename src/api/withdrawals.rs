use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::api::dto::{PageQuery, ReasonBody, StatusQuery, WithdrawalDto};
use crate::api::extract::{AdminUser, AuthUser};
use crate::api::topups::parse_review_status;
use crate::api::{ApiResponse, ApiResult, AppState};
use crate::domain::{Decimal, TimeMs, WithdrawalRequest};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct WithdrawalBody {
    pub amount: Decimal,
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
    Json(body): Json<WithdrawalBody>,
) -> ApiResult<WithdrawalDto> {
    let withdrawal = state
        .withdrawals
        .request(member.id, body.amount, TimeMs::now())
        .await?;
    Ok(ApiResponse::with_message(
        WithdrawalDto::from(&withdrawal),
        "Withdrawal request submitted",
    ))
}

pub async fn withdrawal_history(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<WithdrawalDto>> {
    let (limit, offset) = page.bounds();
    let withdrawals = state
        .repo
        .query_withdrawals(member.id, limit, offset)
        .await?;
    Ok(ApiResponse::ok(
        withdrawals.iter().map(WithdrawalDto::from).collect(),
    ))
}

pub async fn admin_list(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<StatusQuery>,
) -> ApiResult<Vec<WithdrawalDto>> {
    let status = parse_review_status(params.status.as_deref())?;
    let withdrawals = state.repo.query_withdrawals_by_status(status).await?;
    Ok(ApiResponse::ok(
        withdrawals.iter().map(WithdrawalDto::from).collect(),
    ))
}

pub async fn admin_approve(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> ApiResult<WithdrawalDto> {
    let withdrawal = state
        .withdrawals
        .approve(id, admin.id, TimeMs::now())
        .await?;
    Ok(ApiResponse::ok(WithdrawalDto::from(&withdrawal)))
}

pub async fn admin_reject(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult<WithdrawalDto> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let withdrawal = state
        .withdrawals
        .reject(id, admin.id, body.text(), TimeMs::now())
        .await?;
    Ok(ApiResponse::ok(WithdrawalDto::from(&withdrawal)))
}

/// Render withdrawals as CSV, one row per request.
fn withdrawals_csv(withdrawals: &[WithdrawalRequest]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "id",
            "member_id",
            "amount",
            "status",
            "account_holder",
            "account_number",
            "ifsc",
            "bank_name",
            "requested_at",
            "processed_at",
            "reason",
        ])
        .map_err(|e| AppError::Internal(format!("CSV write failed: {}", e)))?;

    for w in withdrawals {
        writer
            .write_record([
                w.id.to_string(),
                w.member_id.to_string(),
                w.amount.to_canonical_string(),
                w.status.as_str().to_string(),
                w.bank.account_holder.clone(),
                w.bank.account_number.clone(),
                w.bank.ifsc.clone(),
                w.bank.bank_name.clone(),
                w.requested_at.as_ms().to_string(),
                w.processed_at
                    .map(|t| t.as_ms().to_string())
                    .unwrap_or_default(),
                w.reason.clone().unwrap_or_default(),
            ])
            .map_err(|e| AppError::Internal(format!("CSV write failed: {}", e)))?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV flush failed: {}", e)))
}

pub async fn admin_export(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<StatusQuery>,
) -> Result<impl IntoResponse, AppError> {
    let status = parse_review_status(params.status.as_deref())?;
    let withdrawals = state.repo.query_withdrawals_by_status(status).await?;
    let body = withdrawals_csv(&withdrawals)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"withdrawals.csv\"",
            ),
        ],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BankDetails, MemberId, ReviewStatus};

    #[test]
    fn test_csv_quotes_fields_with_commas() {
        let withdrawal = WithdrawalRequest {
            id: 1,
            member_id: MemberId::new(2),
            amount: Decimal::from_str_canonical("1500.50").unwrap(),
            bank: BankDetails {
                account_holder: "Rao, Asha".to_string(),
                account_number: "0001".to_string(),
                ifsc: "SBIN0000001".to_string(),
                bank_name: "State Bank".to_string(),
            },
            status: ReviewStatus::Pending,
            reason: None,
            approver_id: None,
            requested_at: TimeMs::new(10),
            processed_at: None,
        };
        let csv = String::from_utf8(withdrawals_csv(&[withdrawal]).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("id,member_id,amount,status"));
        assert_eq!(
            lines.next().unwrap(),
            "1,2,1500.5,pending,\"Rao, Asha\",0001,SBIN0000001,State Bank,10,,"
        );
    }
}
