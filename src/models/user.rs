use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::authz::EffectivePermissions;

/// A user row joined with its role.
#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
    pub must_change_password: bool,
    pub role_id: Option<i64>,
    pub role_name: Option<String>,
    pub access_level: Option<i64>,
    pub role_permissions: Option<String>,
    pub extra_permissions: Option<String>,
    pub denied_permissions: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "direccion@escuela.org")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

/// Identity summary returned by login and `/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[schema(example = "Administrador")]
    pub role: String,
    /// Effective permissions: resource -> actions
    #[schema(value_type = Object)]
    pub permissions: EffectivePermissions,
    pub access_level: i64,
    pub must_change_password: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Token lifetime in seconds
    #[schema(example = 86400)]
    pub expires_in: i64,
    pub user: UserSummary,
}
