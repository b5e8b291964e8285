//! Identity & session issuing: password login and bearer token resolution.

use crate::app::AppState;
use crate::authz::{effective_permissions, EffectivePermissions, Grant, GrantError};
use crate::db::accounts;
use crate::errors::AppError;
use crate::events::{self, AuthEvent};
use crate::identity::Identity;
use crate::jwt::TokenError;
use crate::models::user::DbUser;
use crate::ratelimit::RateLimitKey;
use crate::utils::{hash_secret, normalize_identifier, verify_secret, SecretCheck};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("account not found")]
    AccountNotFound,
    #[error("account is inactive")]
    AccountInactive,
    #[error("secret does not match")]
    SecretMismatch,
    #[error("session token expired")]
    TokenExpired,
    #[error("malformed session token: {0}")]
    TokenMalformed(String),
    #[error("invalid session token: {0}")]
    TokenInvalid(String),
    #[error("subject {0} no longer exists")]
    SubjectNotFound(i64),
    #[error("permission evaluation failed: {0}")]
    PermissionEvaluation(String),
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    /// Short reason recorded in the audit trail.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::AccountNotFound => "account_not_found",
            AuthError::AccountInactive => "account_inactive",
            AuthError::SecretMismatch => "secret_mismatch",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenMalformed(_) => "token_malformed",
            AuthError::TokenInvalid(_) => "token_invalid",
            AuthError::SubjectNotFound(_) => "subject_not_found",
            AuthError::PermissionEvaluation(_) => "permission_evaluation_failed",
            AuthError::Store(_) => "store",
            AuthError::Internal(_) => "internal",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Malformed(msg) => AuthError::TokenMalformed(msg),
            TokenError::Invalid(msg) => AuthError::TokenInvalid(msg),
            TokenError::Signing(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            // unknown accounts and bad secrets look the same to the caller
            AuthError::AccountNotFound | AuthError::SecretMismatch => AppError::InvalidCredentials,
            AuthError::AccountInactive => AppError::AccountInactive,
            AuthError::TokenExpired => AppError::TokenExpired,
            AuthError::TokenMalformed(msg) | AuthError::TokenInvalid(msg) => AppError::TokenInvalid(msg),
            AuthError::SubjectNotFound(id) => AppError::not_found(format!("user {id} not found")),
            AuthError::PermissionEvaluation(msg) => AppError::permission_evaluation(msg),
            AuthError::Store(err) => AppError::Database(err),
            AuthError::Internal(msg) => AppError::internal(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct Authenticated {
    pub token: String,
    pub expires_in: i64,
    pub identity: Identity,
}

/// Checks credentials and issues a session token.
///
/// A successful login clears the caller's rate-limit counter when `limiter_key`
/// is given. Legacy plain-text credentials are accepted and re-hashed in the
/// background.
pub async fn authenticate(
    state: &AppState,
    credentials: &Credentials,
    limiter_key: Option<&RateLimitKey>,
) -> Result<Authenticated, AuthError> {
    let identifier = normalize_identifier(&credentials.identifier);

    let result = authenticate_inner(state, &identifier, &credentials.secret).await;
    match &result {
        Ok(authenticated) => {
            if let Some(key) = limiter_key {
                state.limiter.reset(key.as_str()).await;
            }
            tracing::info!(user_id = authenticated.identity.user_id, role = %authenticated.identity.role, "login succeeded");
            events::publish(
                &state.events,
                AuthEvent::LoginSucceeded {
                    user_id: authenticated.identity.user_id,
                },
            );
        }
        Err(err) => {
            tracing::info!(identifier = %identifier, reason = err.reason(), "login rejected");
            events::publish(
                &state.events,
                AuthEvent::LoginFailed {
                    identifier: identifier.clone(),
                    reason: err.reason(),
                },
            );
        }
    }
    result
}

async fn authenticate_inner(state: &AppState, identifier: &str, secret: &str) -> Result<Authenticated, AuthError> {
    let user = accounts::find_user_by_identifier(&state.pool, identifier)
        .await?
        .ok_or(AuthError::AccountNotFound)?;

    let check = verify_secret(secret, &user.password_hash);
    if !check.is_valid() {
        return Err(AuthError::SecretMismatch);
    }
    if !user.active {
        return Err(AuthError::AccountInactive);
    }
    if check == SecretCheck::ValidLegacy {
        spawn_credential_upgrade(state, user.id, user.password_hash.clone(), secret.to_string());
    }

    let permissions = compute_permissions(state, &user)?;
    let role = user.role_name.clone().unwrap_or_default();
    let issued = state.jwt.encode(user.id, &role)?;
    let identity = Identity::from_user(user, permissions, issued.claims.jti);

    Ok(Authenticated {
        token: issued.token,
        expires_in: state.jwt.expires_in(),
        identity,
    })
}

/// Verifies `token` and rebuilds the identity from the store.
///
/// Permissions are never taken from the token; role and overrides are re-read
/// on every call.
pub async fn resolve(state: &AppState, token: &str) -> Result<Identity, AuthError> {
    let claims = state.jwt.decode(token)?;

    let user = accounts::find_user_by_id(&state.pool, claims.sub)
        .await?
        .ok_or(AuthError::SubjectNotFound(claims.sub))?;
    if !user.active {
        return Err(AuthError::AccountInactive);
    }

    let permissions = compute_permissions(state, &user)?;
    Ok(Identity::from_user(user, permissions, claims.jti))
}

/// Stored grants of one user, parsed.
#[derive(Debug, Clone, Default)]
pub struct StoredGrants {
    pub role: Grant,
    pub extras: Grant,
    pub denials: Grant,
}

pub fn stored_grants(user: &DbUser) -> Result<StoredGrants, AuthError> {
    let parse = |column: &str, raw: Option<&str>| {
        Grant::from_json(raw).map_err(|err: GrantError| {
            AuthError::PermissionEvaluation(format!("user {} {column}: {err}", user.id))
        })
    };

    Ok(StoredGrants {
        role: parse("role grant", user.role_permissions.as_deref())?,
        extras: parse("extra_permissions", user.extra_permissions.as_deref())?,
        denials: parse("denied_permissions", user.denied_permissions.as_deref())?,
    })
}

fn compute_permissions(state: &AppState, user: &DbUser) -> Result<EffectivePermissions, AuthError> {
    let grants = stored_grants(user).inspect_err(|err| {
        tracing::error!(user_id = user.id, error = %err, "could not evaluate stored grants");
    })?;
    Ok(effective_permissions(
        state.catalog,
        &grants.role,
        &grants.extras,
        &grants.denials,
        state.denials,
    ))
}

fn spawn_credential_upgrade(state: &AppState, user_id: i64, legacy_value: String, secret: String) {
    let pool = state.pool.clone();
    let bus = state.events.clone();

    tokio::spawn(async move {
        let hashed = match tokio::task::spawn_blocking(move || hash_secret(&secret)).await {
            Ok(Ok(hash)) => hash,
            Ok(Err(err)) => {
                tracing::warn!(user_id, error = %err, "legacy credential upgrade failed");
                return;
            }
            Err(err) => {
                tracing::warn!(user_id, error = %err, "legacy credential upgrade task aborted");
                return;
            }
        };

        match accounts::upgrade_password_hash(&pool, user_id, &legacy_value, &hashed).await {
            Ok(true) => {
                tracing::info!(user_id, "legacy credential upgraded to argon2");
                events::publish(&bus, AuthEvent::CredentialUpgraded { user_id });
            }
            Ok(false) => tracing::debug!(user_id, "credential changed before upgrade, skipped"),
            Err(err) => tracing::warn!(user_id, error = %err, "legacy credential upgrade failed"),
        }
    });
}
