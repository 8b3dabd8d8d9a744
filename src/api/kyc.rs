use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::dto::{KycDto, ReasonBody, StatusQuery};
use crate::api::extract::{AdminUser, AuthUser};
use crate::api::{ApiResponse, ApiResult, AppState};
use crate::domain::{BankDetails, KycDocuments, KycStatus, MemberId, TimeMs};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycBody {
    pub pan_number: String,
    pub aadhaar_number: String,
    pub account_holder: String,
    pub account_number: String,
    #[serde(alias = "ifscCode")]
    pub ifsc: String,
    pub bank_name: String,
}

impl From<KycBody> for KycDocuments {
    fn from(body: KycBody) -> Self {
        KycDocuments {
            pan_number: body.pan_number,
            aadhaar_number: body.aadhaar_number,
            bank: BankDetails {
                account_holder: body.account_holder,
                account_number: body.account_number,
                ifsc: body.ifsc,
                bank_name: body.bank_name,
            },
        }
    }
}

fn parse_kyc_status(raw: Option<&str>) -> Result<Option<KycStatus>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => KycStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("unknown KYC status '{}'", s))),
    }
}

pub async fn submit(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
    Json(body): Json<KycBody>,
) -> ApiResult<KycDto> {
    let record = state
        .kyc
        .submit(member.id, &body.into(), TimeMs::now())
        .await?;
    Ok(ApiResponse::with_message(
        KycDto::from(&record),
        "KYC submitted for review",
    ))
}

pub async fn status(
    State(state): State<AppState>,
    AuthUser(member): AuthUser,
) -> ApiResult<KycDto> {
    let record = state.kyc.status(member.id).await?;
    Ok(ApiResponse::ok(KycDto::from(&record)))
}

pub async fn admin_list(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<StatusQuery>,
) -> ApiResult<Vec<KycDto>> {
    let status = parse_kyc_status(params.status.as_deref())?;
    let records = state.repo.query_kyc_by_status(status).await?;
    Ok(ApiResponse::ok(records.iter().map(KycDto::from).collect()))
}

pub async fn admin_approve(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(member_id): Path<i64>,
) -> ApiResult<KycDto> {
    let record = state
        .kyc
        .review(MemberId::new(member_id), admin.id, true, None, TimeMs::now())
        .await?;
    Ok(ApiResponse::ok(KycDto::from(&record)))
}

pub async fn admin_reject(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(member_id): Path<i64>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult<KycDto> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let record = state
        .kyc
        .review(
            MemberId::new(member_id),
            admin.id,
            false,
            body.text(),
            TimeMs::now(),
        )
        .await?;
    Ok(ApiResponse::ok(KycDto::from(&record)))
}
