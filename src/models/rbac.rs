use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::authz::{Dropped, EffectivePermissions, Grant};

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub access_level: i64,
    pub permissions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Role {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub access_level: i64,
    /// Grant as stored, wildcards included
    #[schema(value_type = Object)]
    pub grant: Grant,
    /// Grant expanded against the catalog
    #[schema(value_type = Object)]
    pub permissions: EffectivePermissions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<Object>)]
    pub dropped: Vec<Dropped>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleGrantRequest {
    #[schema(value_type = Object, example = json!({"alumnos": ["read", "update"], "eventos": "*"}))]
    pub permissions: Grant,
}

// =============================================================================
// USER OVERRIDES
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct UserOverrides {
    pub user_id: i64,
    pub role: String,
    /// Grants added on top of the role
    #[schema(value_type = Object)]
    pub extras: Grant,
    /// Explicit denials; only subtracted when denial enforcement is on
    #[schema(value_type = Object)]
    pub denials: Grant,
    pub denials_enforced: bool,
    #[schema(value_type = Object)]
    pub effective: EffectivePermissions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<Object>)]
    pub dropped: Vec<Dropped>,
}

/// Omitted fields keep their stored value.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserOverridesRequest {
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub extras: Option<Grant>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub denials: Option<Grant>,
}
