//! Bearer-token extractors. The token is resolved per request; nothing is cached.

use crate::api::AppState;
use crate::domain::{Member, Role, TimeMs};
use crate::error::AppError;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

/// The member behind the request's `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Member);

/// An authenticated member with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Member);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;
        let member = state
            .auth
            .resolve(token, TimeMs::now())
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid or expired token".to_string()))?;
        Ok(AuthUser(member))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(member) = AuthUser::from_request_parts(parts, state).await?;
        if member.role != Role::Admin {
            return Err(AppError::Forbidden("admin role required".to_string()));
        }
        Ok(AdminUser(member))
    }
}
