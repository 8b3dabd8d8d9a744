use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::dto::MemberDto;
use crate::api::extract::AuthUser;
use crate::api::{ApiResponse, ApiResult, AppState};
use crate::domain::{LegSide, TimeMs};
use crate::error::AppError;
use crate::orchestration::{AuthError, RegisterInput, Session};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    #[serde(alias = "referralCode", alias = "sponsorId")]
    pub sponsor_code: String,
    #[serde(alias = "position")]
    pub side: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: i64,
    pub member: MemberDto,
}

impl SessionResponse {
    fn new(session: Session, member: MemberDto) -> Self {
        SessionResponse {
            token: session.token,
            expires_at: session.expires_at.as_ms(),
            member,
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::Unauthorized(err.to_string()),
            AuthError::Db(e) => e.into(),
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<SessionResponse> {
    let side = LegSide::from_str(&body.side).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let now = TimeMs::now();

    let member = state
        .registrar
        .register(
            RegisterInput {
                name: body.name,
                email: body.email,
                phone: body.phone,
                password: body.password,
                sponsor_code: body.sponsor_code,
                side,
            },
            now,
        )
        .await?;
    let session = state.auth.issue_session(member.id, now).await?;

    Ok(ApiResponse::with_message(
        SessionResponse::new(session, MemberDto::from(&member)),
        format!("Registered with referral code {}", member.referral_code),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<SessionResponse> {
    let (member, session) = state
        .auth
        .login(&body.email, &body.password, TimeMs::now())
        .await?;
    Ok(ApiResponse::ok(SessionResponse::new(
        session,
        MemberDto::from(&member),
    )))
}

pub async fn profile(AuthUser(member): AuthUser) -> ApiResult<MemberDto> {
    Ok(ApiResponse::ok(MemberDto::from(&member)))
}
