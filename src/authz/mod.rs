//! Authorization core
//!
//! Permissions are modelled as resource -> action sets checked against a static
//! catalog:
//! - raw grants (role grants, user extras, user denials) may use `*` wildcards
//! - expansion resolves wildcards and drops anything the catalog does not know
//! - the effective set is the union of the expanded role grant and extras,
//!   recomputed on every request
//! - the gate allows a request only if the effective set holds the pair

mod catalog;
mod effective;
mod expand;
mod gate;
mod grant;
mod merge;

pub use catalog::{CatalogBuilder, CatalogError, PermissionCatalog};
pub use effective::EffectivePermissions;
pub use expand::{expand, Dropped, Expansion};
pub use gate::{authorize, check, Decision, Guard};
pub use grant::{ActionGrant, Grant, GrantError, WILDCARD};
pub use merge::{
    apply_denials, effective_permissions, effective_permissions_detailed, merge, merge_detailed, DenialPolicy,
    MergeOutcome,
};

/// Authorization settings read at startup
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthzConfig {
    pub denials: DenialPolicy,
}

impl AuthzConfig {
    pub fn from_env() -> Self {
        let enforce = matches!(
            std::env::var("AUTHZ_ENFORCE_DENIALS")
                .unwrap_or_default()
                .to_lowercase()
                .as_str(),
            "1" | "true" | "yes"
        );
        Self {
            denials: DenialPolicy::from_flag(enforce),
        }
    }
}

/// Catalog resource names
pub mod resources {
    pub const ALUMNOS: &str = "alumnos";
    pub const INSTRUMENTOS: &str = "instrumentos";
    pub const REPRESENTANTES: &str = "representantes";
    pub const EVENTOS: &str = "eventos";
    pub const PROGRAMAS: &str = "programas";
    pub const REPORTES: &str = "reportes";
    pub const USUARIOS: &str = "usuarios";
    pub const ROLES: &str = "roles";
}

/// Catalog action names
pub mod actions {
    pub const READ: &str = "read";
    pub const CREATE: &str = "create";
    pub const UPDATE: &str = "update";
    pub const DELETE: &str = "delete";
    pub const EXPORT: &str = "export";
    pub const ASSIGN: &str = "assign";
    pub const FINALIZE: &str = "finalize";
    pub const CANCEL: &str = "cancel";
}
