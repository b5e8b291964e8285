use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Concrete, catalog-checked permissions of one identity: resource -> actions.
///
/// Resources never map to an empty set; an absent resource means no access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectivePermissions {
    resources: BTreeMap<String, BTreeSet<String>>,
}

impl EffectivePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: &str, action: &str) {
        self.resources
            .entry(resource.to_string())
            .or_default()
            .insert(action.to_string());
    }

    pub fn allows(&self, resource: &str, action: &str) -> bool {
        self.resources
            .get(resource)
            .is_some_and(|actions| actions.contains(action))
    }

    pub fn actions(&self, resource: &str) -> Option<&BTreeSet<String>> {
        self.resources.get(resource)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.resources.iter().map(|(r, a)| (r.as_str(), a))
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Set union per resource.
    pub fn union(&self, other: &EffectivePermissions) -> EffectivePermissions {
        let mut merged = self.clone();
        for (resource, actions) in &other.resources {
            merged
                .resources
                .entry(resource.clone())
                .or_default()
                .extend(actions.iter().cloned());
        }
        merged.prune();
        merged
    }

    /// Removes every action present in `other`, dropping resources left empty.
    pub fn difference(&self, other: &EffectivePermissions) -> EffectivePermissions {
        let mut remaining = self.clone();
        for (resource, denied) in &other.resources {
            if let Some(actions) = remaining.resources.get_mut(resource) {
                actions.retain(|a| !denied.contains(a));
            }
        }
        remaining.prune();
        remaining
    }

    fn prune(&mut self) {
        self.resources.retain(|_, actions| !actions.is_empty());
    }
}

impl<R, A> FromIterator<(R, A)> for EffectivePermissions
where
    R: AsRef<str>,
    A: AsRef<str>,
{
    fn from_iter<T: IntoIterator<Item = (R, A)>>(iter: T) -> Self {
        let mut permissions = EffectivePermissions::new();
        for (resource, action) in iter {
            permissions.insert(resource.as_ref(), action.as_ref());
        }
        permissions
    }
}
