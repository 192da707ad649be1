//! Role sets and role requirements.
//!
//! A requirement is an OR of AND-groups:
//!
//! | Declared as | Meaning |
//! |---|---|
//! | `["admin", "editor"]` | admin OR editor |
//! | `[["admin", "super_user"]]` | admin AND super_user |
//! | `[["a", "b"], ["c"]]` | (a AND b) OR c |

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Roles held by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet(HashSet<String>);

impl RoleSet {
    /// An empty role set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the user holds `role`.
    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    /// Number of roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the user holds no roles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the roles in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Roles a route demands, as an OR of AND-groups.
///
/// # Example
///
/// ```
/// use dyne_auth::{RoleRequirement, RoleSet};
///
/// let either = RoleRequirement::any_of(["admin", "editor"]);
/// assert!(either.is_satisfied_by(&RoleSet::from_iter(["editor"])));
///
/// let both = RoleRequirement::groups([["admin", "super_user"]]);
/// assert!(!both.is_satisfied_by(&RoleSet::from_iter(["admin"])));
/// assert!(both.is_satisfied_by(&RoleSet::from_iter(["admin", "super_user"])));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RequirementRepr", into = "RequirementRepr")]
pub struct RoleRequirement {
    groups: Vec<Vec<String>>,
}

impl RoleRequirement {
    /// Any one of `roles` suffices.
    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: roles.into_iter().map(|r| vec![r.into()]).collect(),
        }
    }

    /// Every role of at least one group is required.
    pub fn groups<I, G, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups
                .into_iter()
                .map(|g| g.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// The AND-groups.
    #[must_use]
    pub fn as_groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    /// Returns true if no roles are demanded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Checks the requirement against a user's roles.
    ///
    /// An empty requirement is always satisfied; an empty group never is.
    #[must_use]
    pub fn is_satisfied_by(&self, roles: &RoleSet) -> bool {
        self.is_empty()
            || self
                .groups
                .iter()
                .any(|group| !group.is_empty() && group.iter().all(|r| roles.contains(r)))
    }
}

impl From<&str> for RoleRequirement {
    fn from(role: &str) -> Self {
        Self::any_of([role])
    }
}

/// Wire shape: a flat list when every group has one role, nested otherwise.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RequirementRepr {
    Flat(Vec<String>),
    Nested(Vec<Vec<String>>),
}

impl From<RequirementRepr> for RoleRequirement {
    fn from(repr: RequirementRepr) -> Self {
        match repr {
            RequirementRepr::Flat(roles) => Self::any_of(roles),
            RequirementRepr::Nested(groups) => Self { groups },
        }
    }
}

impl From<RoleRequirement> for RequirementRepr {
    fn from(req: RoleRequirement) -> Self {
        if req.groups.iter().all(|g| g.len() == 1) {
            Self::Flat(req.groups.into_iter().flatten().collect())
        } else {
            Self::Nested(req.groups)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> RoleSet {
        names.iter().copied().collect()
    }

    #[test]
    fn test_flat_list_is_or() {
        let req = RoleRequirement::any_of(["admin", "editor"]);
        assert!(req.is_satisfied_by(&roles(&["admin"])));
        assert!(req.is_satisfied_by(&roles(&["editor"])));
        assert!(!req.is_satisfied_by(&roles(&["viewer"])));
    }

    #[test]
    fn test_nested_list_is_or_of_ands() {
        let req = RoleRequirement::groups([vec!["admin", "super_user"], vec!["root"]]);
        assert!(!req.is_satisfied_by(&roles(&["admin"])));
        assert!(req.is_satisfied_by(&roles(&["admin", "super_user"])));
        assert!(req.is_satisfied_by(&roles(&["root"])));
    }

    #[test]
    fn test_empty_requirement_and_empty_group() {
        assert!(RoleRequirement::any_of(Vec::<String>::new()).is_satisfied_by(&RoleSet::new()));
        let req = RoleRequirement::groups([Vec::<String>::new()]);
        assert!(!req.is_satisfied_by(&roles(&["admin"])));
    }

    #[test]
    fn test_serde_shapes() {
        let flat: RoleRequirement = serde_json::from_str(r#"["admin","editor"]"#).unwrap();
        assert_eq!(flat, RoleRequirement::any_of(["admin", "editor"]));
        let nested: RoleRequirement = serde_json::from_str(r#"[["admin","super_user"]]"#).unwrap();
        assert_eq!(nested.as_groups().len(), 1);
        assert_eq!(
            serde_json::to_string(&nested).unwrap(),
            r#"[["admin","super_user"]]"#
        );
        assert_eq!(serde_json::to_string(&flat).unwrap(), r#"["admin","editor"]"#);
    }
}
