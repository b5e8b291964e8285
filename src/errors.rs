use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is inactive")]
    AccountInactive,
    #[error("session token expired")]
    TokenExpired,
    #[error("invalid session token: {0}")]
    TokenInvalid(String),
    #[error("forbidden: missing permission {resource}:{action}")]
    Forbidden { resource: String, action: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("too many attempts, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("permission evaluation failed")]
    PermissionEvaluation(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal server error")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Forbidden {
            resource: resource.into(),
            action: action.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self::RateLimited { retry_after }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn permission_evaluation(message: impl Into<String>) -> Self {
        Self::PermissionEvaluation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::AccountInactive => StatusCode::FORBIDDEN,
            AppError::TokenExpired => StatusCode::UNAUTHORIZED,
            AppError::TokenInvalid(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::PermissionEvaluation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code sent as `error` in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::AccountInactive => "account_inactive",
            AppError::TokenExpired => "token_expired",
            AppError::TokenInvalid(_) => "token_invalid",
            AppError::Forbidden { .. } => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Configuration(_) => "configuration",
            AppError::PermissionEvaluation(_) => "permission_evaluation_failed",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Body of every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "forbidden")]
    pub error: &'static str,
    pub message: String,
    /// `resource:action` that was missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<String>,
    /// Seconds until the rate-limit window resets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // details of server-side failures stay in the logs
        match &self {
            AppError::Configuration(detail) | AppError::PermissionEvaluation(detail) | AppError::Internal(detail) => {
                tracing::error!(code = self.code(), detail = %detail, "request failed");
            }
            AppError::Database(err) => {
                tracing::error!(code = self.code(), error = %err, "request failed");
            }
            _ => {}
        }

        let (required, retry_after) = match &self {
            AppError::Forbidden { resource, action } => (Some(format!("{resource}:{action}")), None),
            AppError::RateLimited { retry_after } => (None, Some(*retry_after)),
            _ => (None, None),
        };

        let payload = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            required,
            retry_after,
        };

        let mut response = (self.status(), Json(payload)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

/// Unreadable request bodies are answered in the same JSON shape as every other error.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}
