//! Password hashing and bearer sessions.

use crate::db::Repository;
use crate::domain::{Member, MemberId, TimeMs};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Fresh random salt, hex encoded.
pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

/// `sha256(salt || password)` as lowercase hex.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    hash_password(password, salt) == expected_hash
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub member_id: MemberId,
    pub expires_at: TimeMs,
}

#[derive(Clone)]
pub struct Authenticator {
    repo: Arc<Repository>,
    session_ttl_ms: i64,
}

impl Authenticator {
    pub fn new(repo: Arc<Repository>, session_ttl_ms: i64) -> Self {
        Self {
            repo,
            session_ttl_ms,
        }
    }

    /// Issue a new bearer token for `member`.
    pub async fn issue_session(&self, member: MemberId, now: TimeMs) -> Result<Session, sqlx::Error> {
        let token = Uuid::new_v4().to_string();
        let expires_at = now.saturating_add_ms(self.session_ttl_ms);
        self.repo
            .insert_session(&token, member, now, expires_at)
            .await?;
        Ok(Session {
            token,
            member_id: member,
            expires_at,
        })
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        now: TimeMs,
    ) -> Result<(Member, Session), AuthError> {
        let email = email.trim().to_lowercase();
        let Some((member, hash, salt)) = self.repo.get_credentials(&email).await? else {
            debug!(email = %email, "Login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &salt, &hash) {
            debug!(member_id = %member.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.issue_session(member.id, now).await?;
        info!(member_id = %member.id, "Member logged in");
        Ok((member, session))
    }

    /// Member behind an unexpired `token`.
    pub async fn resolve(&self, token: &str, now: TimeMs) -> Result<Option<Member>, sqlx::Error> {
        self.repo.get_session_member(token, now).await
    }
}
