use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Serialize;

use super::{actions, resources};

/// Registry of every resource the system protects and the actions it accepts.
///
/// Built once per process and never mutated afterwards. Lookups on unknown
/// resources return an empty slice, which makes grants against them expand to
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionCatalog {
    entries: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate action '{action}' for resource '{resource}'")]
    DuplicateAction { resource: String, action: String },
    #[error("resource '{0}' registered twice")]
    DuplicateResource(String),
    #[error("catalog has no resources")]
    Empty,
}

impl PermissionCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// The process-wide catalog used by the server.
    pub fn global() -> &'static PermissionCatalog {
        static CATALOG: OnceLock<PermissionCatalog> = OnceLock::new();
        CATALOG.get_or_init(Self::school_default)
    }

    fn school_default() -> Self {
        use actions::*;

        let entries = [
            (resources::ALUMNOS, &[READ, CREATE, UPDATE, DELETE, EXPORT][..]),
            (resources::INSTRUMENTOS, &[READ, CREATE, UPDATE, DELETE, ASSIGN][..]),
            (resources::REPRESENTANTES, &[READ, CREATE, UPDATE, DELETE][..]),
            (resources::EVENTOS, &[READ, CREATE, UPDATE, DELETE, FINALIZE, CANCEL][..]),
            (resources::PROGRAMAS, &[READ, CREATE, UPDATE, DELETE][..]),
            (resources::REPORTES, &[READ, EXPORT][..]),
            (resources::USUARIOS, &[READ, CREATE, UPDATE, DELETE][..]),
            (resources::ROLES, &[READ, CREATE, UPDATE, DELETE][..]),
        ];

        Self {
            entries: entries
                .into_iter()
                .map(|(resource, acts)| {
                    (resource.to_string(), acts.iter().map(|a| a.to_string()).collect())
                })
                .collect(),
        }
    }

    /// Actions registered for `resource`, in catalog order.
    pub fn list_actions(&self, resource: &str) -> &[String] {
        self.entries.get(resource).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, resource: &str, action: &str) -> bool {
        self.list_actions(resource).iter().any(|a| a == action)
    }

    pub fn has_resource(&self, resource: &str) -> bool {
        self.entries.contains_key(resource)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(r, a)| (r.as_str(), a.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entries: Vec<(String, Vec<String>)>,
}

impl CatalogBuilder {
    pub fn resource<I, S>(mut self, name: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .push((name.into(), actions.into_iter().map(Into::into).collect()));
        self
    }

    pub fn build(self) -> Result<PermissionCatalog, CatalogError> {
        let mut entries = BTreeMap::new();
        for (resource, acts) in self.entries {
            let mut unique: Vec<String> = Vec::with_capacity(acts.len());
            for action in acts {
                if unique.contains(&action) {
                    return Err(CatalogError::DuplicateAction { resource, action });
                }
                unique.push(action);
            }
            if entries.insert(resource.clone(), unique).is_some() {
                return Err(CatalogError::DuplicateResource(resource));
            }
        }
        let catalog = PermissionCatalog { entries };
        if catalog.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(catalog)
    }
}
