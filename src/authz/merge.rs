use super::catalog::PermissionCatalog;
use super::effective::EffectivePermissions;
use super::expand::{expand, Dropped};
use super::grant::Grant;

/// How per-user denials take part in the effective permission set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DenialPolicy {
    /// Denials are stored but the merge stays strictly additive.
    #[default]
    Ignore,
    /// Denials are subtracted after role and extras are merged.
    Enforce,
}

impl DenialPolicy {
    pub fn from_flag(enforce: bool) -> Self {
        if enforce {
            DenialPolicy::Enforce
        } else {
            DenialPolicy::Ignore
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub permissions: EffectivePermissions,
    pub dropped: Vec<Dropped>,
}

/// Union of the expanded role grant and the expanded user extras.
pub fn merge(catalog: &PermissionCatalog, role: &Grant, extras: &Grant) -> EffectivePermissions {
    merge_detailed(catalog, role, extras).permissions
}

pub fn merge_detailed(catalog: &PermissionCatalog, role: &Grant, extras: &Grant) -> MergeOutcome {
    let role = expand(catalog, role);
    let extras = expand(catalog, extras);

    let mut dropped = role.dropped;
    dropped.extend(extras.dropped);

    MergeOutcome {
        permissions: role.permissions.union(&extras.permissions),
        dropped,
    }
}

/// Removes the expanded `denials` from `effective`. Denials win over any grant.
pub fn apply_denials(
    catalog: &PermissionCatalog,
    effective: &EffectivePermissions,
    denials: &Grant,
) -> EffectivePermissions {
    effective.difference(&expand(catalog, denials).permissions)
}

/// Full effective set for one identity under `policy`.
pub fn effective_permissions(
    catalog: &PermissionCatalog,
    role: &Grant,
    extras: &Grant,
    denials: &Grant,
    policy: DenialPolicy,
) -> EffectivePermissions {
    effective_permissions_detailed(catalog, role, extras, denials, policy).permissions
}

/// As [`effective_permissions`], keeping the grant entries the catalog dropped.
pub fn effective_permissions_detailed(
    catalog: &PermissionCatalog,
    role: &Grant,
    extras: &Grant,
    denials: &Grant,
    policy: DenialPolicy,
) -> MergeOutcome {
    let merged = merge_detailed(catalog, role, extras);
    match policy {
        DenialPolicy::Ignore => merged,
        DenialPolicy::Enforce => MergeOutcome {
            permissions: apply_denials(catalog, &merged.permissions, denials),
            dropped: merged.dropped,
        },
    }
}
