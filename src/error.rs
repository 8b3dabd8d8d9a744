use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Policy checks that reject an otherwise well-formed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    BelowMinimum,
    KycNotActive,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::BelowMinimum => "BelowMinimum",
            Policy::KycNotActive => "KycNotActive",
        }
    }
}

/// Error taxonomy shared by the engine services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid state: {0}")]
    State(String),
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: String, available: String },
    #[error("Policy violation ({policy_name}): {message}", policy_name = .policy.as_str())]
    PolicyViolation { policy: Policy, message: String },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl ServiceError {
    /// Kind name surfaced to clients so they can render an actionable message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "ValidationError",
            ServiceError::NotFound(_) => "NotFoundError",
            ServiceError::Conflict(_) => "ConflictError",
            ServiceError::State(_) => "StateError",
            ServiceError::InsufficientBalance { .. } => "InsufficientBalance",
            ServiceError::PolicyViolation { .. } => "PolicyViolation",
            ServiceError::Db(_) => "InternalError",
        }
    }

    pub fn already_processed(what: &str) -> Self {
        ServiceError::State(format!("AlreadyProcessed: {} is no longer pending", what))
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "ConfigError", msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError",
                    "Internal server error".to_string(),
                )
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "Unauthorized", msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "Forbidden", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "ValidationError", msg),
            AppError::Service(err) => {
                let status = match &err {
                    ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
                    ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                    ServiceError::Conflict(_) | ServiceError::State(_) => StatusCode::CONFLICT,
                    ServiceError::InsufficientBalance { .. }
                    | ServiceError::PolicyViolation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    ServiceError::Db(e) => {
                        tracing::error!(error = %e, "Database error");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                let message = match &err {
                    ServiceError::Db(_) => "Internal server error".to_string(),
                    other => other.to_string(),
                };
                (status, err.kind(), message)
            }
        };

        let body = Json(json!({
            "success": false,
            "kind": kind,
            "message": message,
        }));

        (status, body).into_response()
    }
}
