//! Role and user-override administration.
//!
//! Every route sits behind the authorization gate. Grant changes are recorded
//! in the audit trail.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::{
    actions, authorize, effective_permissions_detailed, expand, resources, DenialPolicy, Grant, Guard,
    PermissionCatalog,
};
use crate::db::accounts;
use crate::errors::{AppError, AppResult};
use crate::events::{self, AuthEvent};
use crate::identity::Identity;
use crate::models::rbac::*;
use crate::models::user::DbUser;
use crate::session::stored_grants;

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes(state: &AppState) -> Router<AppState> {
    let guard = |resource, action| from_fn_with_state(Guard::new(state, resource, action), authorize);

    Router::new()
        .route("/catalog", get(get_catalog))
        .route(
            "/roles",
            get(list_roles).route_layer(guard(resources::ROLES, actions::READ)),
        )
        .route(
            "/roles/:role_id",
            get(get_role).route_layer(guard(resources::ROLES, actions::READ)),
        )
        .route(
            "/roles/:role_id/permissions",
            put(update_role_grant).route_layer(guard(resources::ROLES, actions::UPDATE)),
        )
        .route(
            "/users/:user_id/permissions",
            get(get_user_overrides).route_layer(guard(resources::USUARIOS, actions::READ)),
        )
        .route(
            "/users/:user_id/permissions",
            put(update_user_overrides).route_layer(guard(resources::USUARIOS, actions::UPDATE)),
        )
}

// =============================================================================
// CATALOG
// =============================================================================

/// Resource -> actions vocabulary used by permission editors
#[utoipa::path(
    get,
    path = "/rbac/catalog",
    tag = "RBAC",
    responses(
        (status = 200, description = "Permission catalog: resource -> actions"),
        (status = 401, description = "Authentication required")
    ),
    security(("bearerAuth" = []))
)]
async fn get_catalog(State(state): State<AppState>, _identity: Identity) -> Json<&'static PermissionCatalog> {
    Json(state.catalog)
}

// =============================================================================
// ROLES
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses(
        (status = 200, description = "Roles with stored and expanded grants", body = Vec<Role>),
        (status = 403, description = "Missing roles:read")
    ),
    security(("bearerAuth" = []))
)]
async fn list_roles(State(state): State<AppState>) -> AppResult<Json<Vec<Role>>> {
    let rows = accounts::list_roles(&state.pool).await?;
    let roles = rows
        .into_iter()
        .map(|row| role_view(state.catalog, row))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(roles))
}

#[utoipa::path(
    get,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = i64, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role", body = Role),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
async fn get_role(State(state): State<AppState>, Path(role_id): Path<i64>) -> AppResult<Json<Role>> {
    let row = accounts::find_role(&state.pool, role_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("role {role_id} not found")))?;
    Ok(Json(role_view(state.catalog, row)?))
}

/// Replace a role's grant. Entries unknown to the catalog are stored but reported as dropped.
#[utoipa::path(
    put,
    path = "/rbac/roles/{role_id}/permissions",
    tag = "RBAC",
    params(("role_id" = i64, Path, description = "Role id")),
    request_body = UpdateRoleGrantRequest,
    responses(
        (status = 200, description = "Updated role", body = Role),
        (status = 403, description = "Missing roles:update"),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
async fn update_role_grant(
    State(state): State<AppState>,
    identity: Identity,
    Path(role_id): Path<i64>,
    payload: Result<Json<UpdateRoleGrantRequest>, JsonRejection>,
) -> AppResult<Json<Role>> {
    let Json(payload) = payload?;
    let updated = accounts::update_role_grant(&state.pool, role_id, &payload.permissions.to_json()).await?;
    if !updated {
        return Err(AppError::not_found(format!("role {role_id} not found")));
    }

    tracing::info!(actor_id = identity.user_id, role_id, "role grant replaced");
    events::publish(
        &state.events,
        AuthEvent::RoleGrantChanged {
            actor_id: identity.user_id,
            role_id,
            grant: payload.permissions,
        },
    );

    let row = accounts::find_role(&state.pool, role_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("role {role_id} not found")))?;
    Ok(Json(role_view(state.catalog, row)?))
}

fn role_view(catalog: &PermissionCatalog, row: DbRole) -> AppResult<Role> {
    let grant = Grant::from_json(row.permissions.as_deref())
        .map_err(|err| AppError::permission_evaluation(format!("role {}: {err}", row.id)))?;
    let expansion = expand(catalog, &grant);

    Ok(Role {
        id: row.id,
        name: row.name,
        description: row.description,
        access_level: row.access_level,
        grant,
        permissions: expansion.permissions,
        dropped: expansion.dropped,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

// =============================================================================
// USER OVERRIDES
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/permissions",
    tag = "RBAC",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Overrides and computed effective permissions", body = UserOverrides),
        (status = 403, description = "Missing usuarios:read"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
async fn get_user_overrides(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<UserOverrides>> {
    let user = fetch_user(&state, user_id).await?;
    Ok(Json(overrides_view(&state, &user)?))
}

#[utoipa::path(
    put,
    path = "/rbac/users/{user_id}/permissions",
    tag = "RBAC",
    params(("user_id" = i64, Path, description = "User id")),
    request_body = UpdateUserOverridesRequest,
    responses(
        (status = 200, description = "Updated overrides", body = UserOverrides),
        (status = 403, description = "Missing usuarios:update"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
async fn update_user_overrides(
    State(state): State<AppState>,
    identity: Identity,
    Path(user_id): Path<i64>,
    payload: Result<Json<UpdateUserOverridesRequest>, JsonRejection>,
) -> AppResult<Json<UserOverrides>> {
    let Json(payload) = payload?;
    let user = fetch_user(&state, user_id).await?;
    let current = stored_grants(&user).map_err(AppError::from)?;

    let extras = payload.extras.unwrap_or(current.extras);
    let denials = payload.denials.unwrap_or(current.denials);

    accounts::update_user_overrides(&state.pool, user_id, &extras.to_json(), &denials.to_json()).await?;

    tracing::info!(actor_id = identity.user_id, user_id, "user overrides replaced");
    events::publish(
        &state.events,
        AuthEvent::UserOverridesChanged {
            actor_id: identity.user_id,
            user_id,
            extras,
            denials,
        },
    );

    let user = fetch_user(&state, user_id).await?;
    Ok(Json(overrides_view(&state, &user)?))
}

async fn fetch_user(state: &AppState, user_id: i64) -> AppResult<DbUser> {
    accounts::find_user_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {user_id} not found")))
}

fn overrides_view(state: &AppState, user: &DbUser) -> AppResult<UserOverrides> {
    let grants = stored_grants(user)?;
    let outcome = effective_permissions_detailed(
        state.catalog,
        &grants.role,
        &grants.extras,
        &grants.denials,
        state.denials,
    );

    Ok(UserOverrides {
        user_id: user.id,
        role: user.role_name.clone().unwrap_or_default(),
        extras: grants.extras,
        denials: grants.denials,
        denials_enforced: state.denials == DenialPolicy::Enforce,
        effective: outcome.permissions,
        dropped: outcome.dropped,
    })
}
