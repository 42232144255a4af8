use std::collections::{HashMap, HashSet};

use crate::error::CelastrinaError;
use crate::subject::Subject;

/// A single recorded authentication assertion.
#[derive(Clone, Debug)]
pub struct Assertion {
    pub result: bool,
    pub remarks: Option<String>,
}

/// Request-scoped ledger of authentication assertions.
///
/// Authenticators record their outcome by name and may stage role
/// assignments; [`Asserter::assign`] applies the accumulated assignments to
/// the subject once the chain has run.
#[derive(Debug, Default)]
pub struct Asserter {
    assertions: HashMap<String, Assertion>,
    assignments: HashSet<String>,
}

impl Asserter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an assertion with no role assignments.
    pub fn assert(&mut self, name: &str, result: bool) -> Result<(), CelastrinaError> {
        self.assert_with(name, result, Vec::<String>::new(), None)
    }

    /// Record an assertion, staging role assignments and optional remarks.
    ///
    /// The name is trimmed; an empty name fails validation. Re-asserting a
    /// name overwrites the previous record.
    pub fn assert_with<I, S>(
        &mut self,
        name: &str,
        result: bool,
        assignments: I,
        remarks: Option<&str>,
    ) -> Result<(), CelastrinaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(CelastrinaError::validation(
                "assertion name must not be empty",
                "name",
            ));
        }
        self.assertions.insert(
            name.to_string(),
            Assertion {
                result,
                remarks: remarks.map(str::to_string),
            },
        );
        if result {
            self.assignments
                .extend(assignments.into_iter().map(Into::into));
        }
        Ok(())
    }

    pub fn assertion(&self, name: &str) -> Option<&Assertion> {
        self.assertions.get(name.trim())
    }

    /// Whether the named assertion was recorded affirmative.
    pub fn is_affirmed(&self, name: &str) -> bool {
        self.assertion(name).map(|a| a.result).unwrap_or(false)
    }

    /// Whether any recorded assertion is affirmative.
    pub fn has_affirmative_assertion(&self) -> bool {
        self.assertions.values().any(|a| a.result)
    }

    /// Apply the staged role assignments to the subject. Idempotent.
    pub fn assign(&self, subject: &mut Subject) {
        subject.add_roles(self.assignments.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_fails_validation() {
        let mut asserter = Asserter::new();
        let err = asserter.assert("   ", true).unwrap_err();
        assert_eq!(err.tag(), Some("name"));
    }

    #[test]
    fn names_are_trimmed() {
        let mut asserter = Asserter::new();
        asserter.assert(" header ", true).unwrap();
        assert!(asserter.is_affirmed("header"));
    }

    #[test]
    fn affirmative_detection() {
        let mut asserter = Asserter::new();
        asserter.assert("a", false).unwrap();
        assert!(!asserter.has_affirmative_assertion());
        asserter.assert("b", true).unwrap();
        assert!(asserter.has_affirmative_assertion());
    }

    #[test]
    fn reassertion_overwrites() {
        let mut asserter = Asserter::new();
        asserter.assert("a", true).unwrap();
        asserter.assert("a", false).unwrap();
        assert!(!asserter.is_affirmed("a"));
    }

    #[test]
    fn negative_assertions_stage_no_roles() {
        let mut asserter = Asserter::new();
        asserter
            .assert_with("a", false, ["admin"], Some("token rejected"))
            .unwrap();
        let mut subject = Subject::new("u1");
        asserter.assign(&mut subject);
        assert!(subject.roles().is_empty());
    }

    #[test]
    fn assign_is_idempotent() {
        let mut asserter = Asserter::new();
        asserter.assert_with("a", true, ["admin", "reader"], None).unwrap();
        let mut subject = Subject::new("u1");
        asserter.assign(&mut subject);
        asserter.assign(&mut subject);
        assert_eq!(subject.roles().len(), 2);
    }
}
