use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::EffectivePermissions;
use crate::errors::AppError;
use crate::jwt::bearer_token;
use crate::models::user::{DbUser, UserSummary};
use crate::session::{self, AuthError};

/// The caller of the current request, with permissions computed for this
/// request only.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub access_level: i64,
    pub must_change_password: bool,
    pub permissions: EffectivePermissions,
    /// `jti` of the session token
    pub session_id: Uuid,
}

impl Identity {
    pub fn from_user(user: DbUser, permissions: EffectivePermissions, session_id: Uuid) -> Self {
        Self {
            user_id: user.id,
            name: user.name,
            email: user.email,
            role: user.role_name.unwrap_or_default(),
            access_level: user.access_level.unwrap_or(0),
            must_change_password: user.must_change_password,
            permissions,
            session_id,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.user_id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            permissions: self.permissions.clone(),
            access_level: self.access_level,
            must_change_password: self.must_change_password,
        }
    }

    /// Resolves the bearer token in `headers`. `Ok(None)` when no token was sent.
    pub async fn from_headers(state: &AppState, headers: &HeaderMap) -> Result<Option<Self>, AppError> {
        match bearer_token(headers) {
            Some(token) => Ok(Some(session::resolve(state, token).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // already resolved by the authorization gate
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(identity.clone());
        }

        Identity::from_headers(state, &parts.headers)
            .await?
            .ok_or_else(|| AppError::unauthorized("authentication required"))
    }
}

/// Identity for routes that also serve anonymous callers.
///
/// A missing or structurally malformed token yields `None`; expired and forged
/// tokens are still rejected.
#[derive(Debug, Clone)]
pub struct OptionalIdentity(pub Option<Identity>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(Self(Some(identity.clone())));
        }

        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(Self(None));
        };

        match session::resolve(state, token).await {
            Ok(identity) => Ok(Self(Some(identity))),
            Err(AuthError::TokenMalformed(reason)) => {
                tracing::debug!(reason = %reason, "ignoring malformed bearer token");
                Ok(Self(None))
            }
            Err(err) => Err(err.into()),
        }
    }
}
