//! Severity-tagged issue collections.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

pub trait Diagnostic: Debug {
    fn severity(&self) -> Severity;
}

/// Issues in the order they were found.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IssueSet<T> {
    issues: Vec<T>,
}

impl<T> Default for IssueSet<T> {
    fn default() -> Self {
        Self { issues: Vec::new() }
    }
}

impl<T: Diagnostic> IssueSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: T) {
        self.issues.push(issue);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.issues.iter()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity() == severity)
            .count()
    }

    pub fn has_error(&self) -> bool {
        self.num_errors() > 0
    }

    pub fn has_warning(&self) -> bool {
        self.num_warnings() > 0
    }

    pub fn num_errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn num_warnings(&self) -> usize {
        self.count(Severity::Warning)
    }
}

impl<T> IntoIterator for IssueSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a IssueSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Flag(Severity);

    impl Diagnostic for Flag {
        fn severity(&self) -> Severity {
            self.0
        }
    }

    #[test]
    fn counts_by_severity() {
        let mut set = IssueSet::new();
        set.add(Flag(Severity::Info));
        set.add(Flag(Severity::Warning));
        set.add(Flag(Severity::Warning));
        assert!(!set.has_error());
        assert_eq!(set.num_warnings(), 2);
        set.add(Flag(Severity::Error));
        assert!(set.has_error());
        assert_eq!(set.len(), 4);
    }
}
