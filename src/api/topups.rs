use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::dto::{PayoutDto, PlanDto, ReasonBody, StatusQuery, TopUpDto};
use crate::api::extract::{AdminUser, AuthUser};
use crate::api::{ApiResponse, ApiResult, AppState};
use crate::domain::{Decimal, ReviewStatus, TimeMs};
use crate::error::{AppError, ServiceError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpBody {
    pub plan_id: i64,
    #[serde(alias = "transactionId", alias = "utr")]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlanBody {
    pub name: String,
    pub price: Decimal,
    pub pv: i64,
    pub matching_rate: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub topup: TopUpDto,
    pub plan: PlanDto,
    pub ancestors_credited: usize,
    pub payouts: Vec<PayoutDto>,
}

/// Parse an optional `?status=` filter; `all` or absent means no filter.
pub(crate) fn parse_review_status(raw: Option<&str>) -> Result<Option<ReviewStatus>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => ReviewStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("unknown status '{}'", s))),
    }
}

pub async fn list_plans(State(state): State<AppState>) -> ApiResult<Vec<PlanDto>> {
    let plans = state.repo.list_plans().await?;
    Ok(ApiResponse::ok(plans.iter().map(PlanDto::from).collect()))
}

pub async fn request_topup(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
    Json(body): Json<TopUpBody>,
) -> ApiResult<TopUpDto> {
    let topup = state
        .topups
        .request(
            member.id,
            body.plan_id,
            body.payment_reference.as_deref(),
            TimeMs::now(),
        )
        .await?;
    Ok(ApiResponse::with_message(
        TopUpDto::from(&topup),
        "Top-up request submitted for review",
    ))
}

pub async fn topup_history(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
) -> ApiResult<Vec<TopUpDto>> {
    let topups = state.repo.query_topups(member.id).await?;
    Ok(ApiResponse::ok(topups.iter().map(TopUpDto::from).collect()))
}

pub async fn admin_list(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<StatusQuery>,
) -> ApiResult<Vec<TopUpDto>> {
    let status = parse_review_status(params.status.as_deref())?;
    let topups = state.repo.query_topups_by_status(status).await?;
    Ok(ApiResponse::ok(topups.iter().map(TopUpDto::from).collect()))
}

pub async fn admin_approve(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> ApiResult<ApprovalResponse> {
    let approval = state.topups.approve(id, admin.id, TimeMs::now()).await?;
    Ok(ApiResponse::with_message(
        ApprovalResponse {
            topup: TopUpDto::from(&approval.topup),
            plan: PlanDto::from(&approval.plan),
            ancestors_credited: approval.activation.credited.len(),
            payouts: approval
                .activation
                .payouts
                .iter()
                .map(PayoutDto::from)
                .collect(),
        },
        "Top-up approved and plan activated",
    ))
}

pub async fn admin_reject(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult<TopUpDto> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let topup = state
        .topups
        .reject(id, admin.id, body.text(), TimeMs::now())
        .await?;
    Ok(ApiResponse::ok(TopUpDto::from(&topup)))
}

pub async fn admin_create_plan(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(body): Json<NewPlanBody>,
) -> ApiResult<PlanDto> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ServiceError::Validation("plan name must not be empty".to_string()).into());
    }
    if !body.price.is_positive() || !body.price.fits_money_scale() {
        return Err(ServiceError::Validation(
            "plan price must be positive with at most two decimal places".to_string(),
        )
        .into());
    }
    if body.pv <= 0 {
        return Err(ServiceError::Validation("plan pv must be positive".to_string()).into());
    }
    if body.matching_rate.is_negative() {
        return Err(
            ServiceError::Validation("matching rate must not be negative".to_string()).into(),
        );
    }
    if state
        .repo
        .list_plans()
        .await?
        .iter()
        .any(|p| p.name.eq_ignore_ascii_case(name))
    {
        return Err(ServiceError::Conflict(format!("plan '{}' already exists", name)).into());
    }

    let plan = state
        .repo
        .insert_plan(name, body.price, body.pv, body.matching_rate)
        .await?
        .ok_or_else(|| ServiceError::Conflict(format!("plan '{}' already exists", name)))?;
    tracing::info!(admin_id = %admin.id, plan_id = plan.id, name = %plan.name, "Plan created");
    Ok(ApiResponse::ok(PlanDto::from(&plan)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_review_status() {
        assert_eq!(parse_review_status(None).unwrap(), None);
        assert_eq!(parse_review_status(Some("ALL")).unwrap(), None);
        assert_eq!(
            parse_review_status(Some("pending")).unwrap(),
            Some(ReviewStatus::Pending)
        );
        assert!(parse_review_status(Some("paid")).is_err());
    }
}
