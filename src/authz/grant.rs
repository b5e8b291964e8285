use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Token standing for "every action" (resource level) or "every resource" (top level).
pub const WILDCARD: &str = "*";

/// A raw grant as stored on a role or a user override, before catalog expansion.
///
/// Stored as JSON. `"*"` and `{"*": "*"}` both mean every resource with every
/// action; otherwise each key is a resource mapped to `"*"` or an action list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGrant", into = "RawGrant")]
pub enum Grant {
    AllResources,
    PerResource(BTreeMap<String, ActionGrant>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionGrant {
    All,
    Only(BTreeSet<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    #[error("unsupported grant token '{0}'")]
    UnknownToken(String),
    #[error("malformed grant JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Default for Grant {
    fn default() -> Self {
        Grant::PerResource(BTreeMap::new())
    }
}

impl Grant {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a stored grant column. `NULL`, blank strings and `null` are an empty grant.
    pub fn from_json(raw: Option<&str>) -> Result<Self, GrantError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::empty()),
            Some(text) => {
                // decode the raw shape first so token errors keep their variant
                let raw: Option<RawGrant> = serde_json::from_str(text)?;
                raw.map(Grant::try_from).transpose().map(Option::unwrap_or_default)
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Builder-style helper: grant an explicit list of actions on `resource`.
    pub fn with_actions<I, S>(self, resource: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(resource, ActionGrant::Only(actions.into_iter().map(Into::into).collect()))
    }

    /// Builder-style helper: grant every action on `resource`.
    pub fn with_all_actions(self, resource: impl Into<String>) -> Self {
        self.with(resource, ActionGrant::All)
    }

    fn with(self, resource: impl Into<String>, actions: ActionGrant) -> Self {
        match self {
            Grant::AllResources => Grant::AllResources,
            Grant::PerResource(mut map) => {
                map.insert(resource.into(), actions);
                Grant::PerResource(map)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Grant::PerResource(map) if map.is_empty())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawGrant {
    Token(String),
    Map(BTreeMap<String, RawActions>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawActions {
    Token(String),
    List(Vec<String>),
}

impl TryFrom<RawGrant> for Grant {
    type Error = GrantError;

    fn try_from(raw: RawGrant) -> Result<Self, Self::Error> {
        match raw {
            RawGrant::Token(token) if token == WILDCARD => Ok(Grant::AllResources),
            RawGrant::Token(token) => Err(GrantError::UnknownToken(token)),
            RawGrant::Map(map) => {
                if matches!(map.get(WILDCARD), Some(RawActions::Token(t)) if t == WILDCARD) {
                    return Ok(Grant::AllResources);
                }

                let mut resources = BTreeMap::new();
                for (resource, actions) in map {
                    let actions = match actions {
                        RawActions::Token(token) if token == WILDCARD => ActionGrant::All,
                        RawActions::Token(token) => return Err(GrantError::UnknownToken(token)),
                        RawActions::List(list) => ActionGrant::Only(list.into_iter().collect()),
                    };
                    resources.insert(resource, actions);
                }
                Ok(Grant::PerResource(resources))
            }
        }
    }
}

impl From<Grant> for RawGrant {
    fn from(grant: Grant) -> Self {
        match grant {
            Grant::AllResources => {
                RawGrant::Map(BTreeMap::from([(WILDCARD.to_string(), RawActions::Token(WILDCARD.to_string()))]))
            }
            Grant::PerResource(map) => RawGrant::Map(
                map.into_iter()
                    .map(|(resource, actions)| {
                        let raw = match actions {
                            ActionGrant::All => RawActions::Token(WILDCARD.to_string()),
                            ActionGrant::Only(set) => RawActions::List(set.into_iter().collect()),
                        };
                        (resource, raw)
                    })
                    .collect(),
            ),
        }
    }
}
