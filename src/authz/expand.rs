use serde::Serialize;

use super::catalog::PermissionCatalog;
use super::effective::EffectivePermissions;
use super::grant::{ActionGrant, Grant};

/// A grant entry the catalog does not know about.
///
/// `action` is `None` when the whole resource is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dropped {
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl std::fmt::Display for Dropped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.action {
            Some(action) => write!(f, "{}:{}", self.resource, action),
            None => write!(f, "{}", self.resource),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Expansion {
    pub permissions: EffectivePermissions,
    pub dropped: Vec<Dropped>,
}

/// Resolves wildcards in `grant` against `catalog`.
///
/// Unknown resources and actions never reach the output; they are reported in
/// [`Expansion::dropped`] instead.
pub fn expand(catalog: &PermissionCatalog, grant: &Grant) -> Expansion {
    let mut expansion = Expansion::default();

    match grant {
        Grant::AllResources => {
            for (resource, actions) in catalog.resources() {
                for action in actions {
                    expansion.permissions.insert(resource, action);
                }
            }
        }
        Grant::PerResource(entries) => {
            for (resource, actions) in entries {
                if !catalog.has_resource(resource) {
                    expansion.dropped.push(Dropped {
                        resource: resource.clone(),
                        action: None,
                    });
                    continue;
                }

                match actions {
                    ActionGrant::All => {
                        for action in catalog.list_actions(resource) {
                            expansion.permissions.insert(resource, action);
                        }
                    }
                    ActionGrant::Only(requested) => {
                        for action in requested {
                            if catalog.contains(resource, action) {
                                expansion.permissions.insert(resource, action);
                            } else {
                                expansion.dropped.push(Dropped {
                                    resource: resource.clone(),
                                    action: Some(action.clone()),
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    if !expansion.dropped.is_empty() {
        tracing::debug!(dropped = ?expansion.dropped, "grant entries not in catalog were dropped");
    }

    expansion
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PermissionCatalog {
        PermissionCatalog::builder()
            .resource("alumnos", ["read", "create", "update", "delete", "export"])
            .resource("eventos", ["read", "create", "update", "delete", "finalize", "cancel"])
            .build()
            .unwrap()
    }

    fn sample_grants() -> Vec<Grant> {
        vec![
            Grant::AllResources,
            Grant::empty(),
            Grant::empty().with_all_actions("eventos"),
            Grant::empty().with_actions("alumnos", ["read", "fly", "export"]),
            Grant::empty().with_all_actions("facturas").with_actions("eventos", ["cancel"]),
            Grant::empty().with_actions("alumnos", Vec::<String>::new()),
        ]
    }

    #[test]
    fn output_never_leaves_the_catalog() {
        let catalog = catalog();
        for grant in sample_grants() {
            let expansion = expand(&catalog, &grant);
            for (resource, actions) in expansion.permissions.resources() {
                for action in actions {
                    assert!(catalog.contains(resource, action), "{resource}:{action} escaped the catalog");
                }
            }
        }
    }

    #[test]
    fn top_level_wildcard_expands_to_full_catalog() {
        let catalog = catalog();
        let expansion = expand(&catalog, &Grant::AllResources);

        for (resource, actions) in catalog.resources() {
            let granted = expansion.permissions.actions(resource).unwrap();
            assert_eq!(granted.len(), actions.len());
        }
        assert!(expansion.dropped.is_empty());
    }

    #[test]
    fn resource_wildcard_takes_catalog_actions() {
        let expansion = expand(&catalog(), &Grant::empty().with_all_actions("eventos"));
        let actions: Vec<&str> = expansion
            .permissions
            .actions("eventos")
            .unwrap()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(actions, ["cancel", "create", "delete", "finalize", "read", "update"]);
    }

    #[test]
    fn reports_unknown_actions_and_resources() {
        let grant = Grant::empty()
            .with_actions("alumnos", ["read", "fly"])
            .with_all_actions("facturas");
        let expansion = expand(&catalog(), &grant);

        assert!(expansion.permissions.allows("alumnos", "read"));
        assert!(!expansion.permissions.allows("alumnos", "fly"));
        assert!(expansion.permissions.actions("facturas").is_none());
        assert_eq!(
            expansion.dropped,
            vec![
                Dropped { resource: "alumnos".into(), action: Some("fly".into()) },
                Dropped { resource: "facturas".into(), action: None },
            ]
        );
    }

    #[test]
    fn empty_action_list_grants_nothing() {
        let expansion = expand(&catalog(), &Grant::empty().with_actions("alumnos", Vec::<String>::new()));
        assert!(expansion.permissions.is_empty());
    }
}
