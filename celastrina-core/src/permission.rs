use std::collections::{HashMap, HashSet};

use crate::error::CelastrinaError;
use crate::subject::Subject;

/// Set-comparison variant used by [`Permission`].
///
/// `is_match(assertion, values)` compares the permission's required role set
/// (`assertion`) against the subject's held role set (`values`):
///
/// - `Any`: at least one required role is held.
/// - `All`: every required role is held.
/// - `None`: no required role is held.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueMatch {
    Any,
    All,
    None,
}

impl ValueMatch {
    pub fn is_match(&self, assertion: &HashSet<String>, values: &HashSet<String>) -> bool {
        match self {
            ValueMatch::Any => assertion.iter().any(|r| values.contains(r)),
            ValueMatch::All => assertion.is_subset(values),
            ValueMatch::None => assertion.is_disjoint(values),
        }
    }

    /// Parse a wire name (`MatchAny` / `MatchAll` / `MatchNone`).
    pub fn parse(name: &str) -> Result<Self, CelastrinaError> {
        match name {
            "MatchAny" => Ok(ValueMatch::Any),
            "MatchAll" => Ok(ValueMatch::All),
            "MatchNone" => Ok(ValueMatch::None),
            other => Err(CelastrinaError::validation(
                format!("unknown match type '{other}'"),
                "match",
            )),
        }
    }
}

/// A decision rule for one protected action.
#[derive(Clone, Debug)]
pub struct Permission {
    action: String,
    roles: HashSet<String>,
    value_match: ValueMatch,
}

impl Permission {
    /// Create a permission. The action is trimmed and lowercased; an empty
    /// action fails validation.
    pub fn new<I, S>(
        action: impl AsRef<str>,
        roles: I,
        value_match: ValueMatch,
    ) -> Result<Self, CelastrinaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let action = action.as_ref().trim().to_lowercase();
        if action.is_empty() {
            return Err(CelastrinaError::validation(
                "permission action must not be empty",
                "action",
            ));
        }
        Ok(Self {
            action,
            roles: roles.into_iter().map(Into::into).collect(),
            value_match,
        })
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn roles(&self) -> &HashSet<String> {
        &self.roles
    }

    pub fn value_match(&self) -> ValueMatch {
        self.value_match
    }

    /// Whether the subject satisfies this permission.
    pub fn authorize(&self, subject: &Subject) -> bool {
        self.value_match.is_match(&self.roles, subject.roles())
    }
}

/// Registry of permissions keyed by lowercased action.
#[derive(Debug, Default)]
pub struct PermissionManager {
    permissions: HashMap<String, Permission>,
}

impl PermissionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a permission, replacing any previous rule for the action.
    pub fn add_permission(&mut self, permission: Permission) {
        self.permissions
            .insert(permission.action().to_string(), permission);
    }

    pub fn get_permission(&self, action: &str) -> Option<&Permission> {
        self.permissions.get(&action.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set<const N: usize>(roles: [&str; N]) -> HashSet<String> {
        roles.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn match_any_truth_table() {
        let m = ValueMatch::Any;
        assert!(m.is_match(&set(["a", "b"]), &set(["b", "c"])));
        assert!(!m.is_match(&set(["a", "b"]), &set(["c", "d"])));
        assert!(!m.is_match(&set([]), &set(["a"])));
    }

    #[test]
    fn match_all_truth_table() {
        let m = ValueMatch::All;
        assert!(m.is_match(&set(["a", "b"]), &set(["a", "b", "c"])));
        assert!(!m.is_match(&set(["a", "b"]), &set(["a", "c"])));
        assert!(m.is_match(&set([]), &set(["a"])));
    }

    #[test]
    fn match_none_truth_table() {
        let m = ValueMatch::None;
        assert!(m.is_match(&set(["a", "b"]), &set(["c", "d"])));
        assert!(!m.is_match(&set(["a", "b"]), &set(["b"])));
        assert!(m.is_match(&set([]), &set(["a"])));
    }

    #[test]
    fn action_is_normalized() {
        let p = Permission::new("  Process ", ["admin"], ValueMatch::Any).unwrap();
        assert_eq!(p.action(), "process");
    }

    #[test]
    fn empty_action_fails_validation() {
        let err = Permission::new("   ", ["admin"], ValueMatch::Any).unwrap_err();
        assert_eq!(err.tag(), Some("action"));
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn authorize_uses_match() {
        let mut subject = Subject::new("u1");
        subject.add_roles(["role1", "role2", "role3"]);

        let all = Permission::new("process", ["role1", "role2"], ValueMatch::All).unwrap();
        assert!(all.authorize(&subject));

        let none = Permission::new("process", ["role1", "role2"], ValueMatch::None).unwrap();
        assert!(!none.authorize(&subject));
    }

    #[test]
    fn manager_lookup_is_case_insensitive() {
        let mut manager = PermissionManager::new();
        manager.add_permission(Permission::new("Process", ["r"], ValueMatch::Any).unwrap());
        assert!(manager.get_permission("PROCESS").is_some());
        assert!(manager.get_permission(" process ").is_some());
        assert!(manager.get_permission("save").is_none());
    }

    #[test]
    fn parse_match_names() {
        assert_eq!(ValueMatch::parse("MatchAny").unwrap(), ValueMatch::Any);
        assert_eq!(ValueMatch::parse("MatchAll").unwrap(), ValueMatch::All);
        assert_eq!(ValueMatch::parse("MatchNone").unwrap(), ValueMatch::None);
        assert!(ValueMatch::parse("MatchSome").is_err());
    }
}
