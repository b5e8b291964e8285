use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::app::AppState;
use crate::errors::AppError;
use crate::identity::Identity;

use super::effective::EffectivePermissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

/// Pure permission check. Absent resource or absent action both deny.
pub fn check(effective: &EffectivePermissions, resource: &str, action: &str) -> Decision {
    if effective.allows(resource, action) {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// Route requirement consumed by [`authorize`].
#[derive(Clone)]
pub struct Guard {
    state: AppState,
    resource: &'static str,
    action: &'static str,
}

impl Guard {
    pub fn new(state: &AppState, resource: &'static str, action: &'static str) -> Self {
        Self {
            state: state.clone(),
            resource,
            action,
        }
    }
}

/// Middleware for `axum::middleware::from_fn_with_state(Guard::new(..), authorize)`.
///
/// Rejects anonymous requests with 401 and identities lacking the guard's
/// permission with 403. The resolved [`Identity`] is stored in the request
/// extensions for the handler.
pub async fn authorize(
    State(guard): State<Guard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = Identity::from_headers(&guard.state, request.headers())
        .await?
        .ok_or_else(|| AppError::unauthorized("authentication required"))?;

    if !check(&identity.permissions, guard.resource, guard.action).is_allowed() {
        tracing::warn!(
            user_id = identity.user_id,
            role = %identity.role,
            resource = guard.resource,
            action = guard.action,
            "permission denied"
        );
        return Err(AppError::forbidden(guard.resource, guard.action));
    }

    tracing::debug!(
        user_id = identity.user_id,
        resource = guard.resource,
        action = guard.action,
        "permission granted"
    );

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
