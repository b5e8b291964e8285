use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::{AppError, AppResult, ErrorResponse};
use crate::identity::{Identity, OptionalIdentity};
use crate::models::user::{LoginRequest, LoginResponse, UserSummary};
use crate::ratelimit::RateLimitKey;
use crate::session::{self, Credentials};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Missing or unreadable credentials", body = ErrorResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account inactive"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    limiter_key: Option<Extension<RateLimitKey>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(payload) = payload?;
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("email and password are required"));
    }

    let credentials = Credentials {
        identifier: payload.email,
        secret: payload.password,
    };
    let key = limiter_key.map(|Extension(key)| key);
    let authenticated = session::authenticate(&state, &credentials, key.as_ref()).await?;

    Ok(Json(LoginResponse {
        token: authenticated.token,
        token_type: "Bearer".to_string(),
        expires_in: authenticated.expires_in,
        user: authenticated.identity.summary(),
    }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current identity and effective permissions", body = UserSummary),
        (status = 401, description = "Authentication required or token expired/invalid")
    ),
    security(("bearerAuth" = []))
)]
pub async fn me(OptionalIdentity(identity): OptionalIdentity) -> AppResult<Json<UserSummary>> {
    identity
        .map(|identity| Json(identity.summary()))
        .ok_or_else(|| AppError::unauthorized("authentication required"))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn logout(identity: Identity) -> AppResult<Json<MessageResponse>> {
    // tokens are stateless; they lapse at expiry
    tracing::info!(user_id = identity.user_id, session_id = %identity.session_id, "logout");
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}
