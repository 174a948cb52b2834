//! Validation issues and the per-run report.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

/// Issue severity. Errors exclude the entry from the canonical output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Warning => write!(f, "WARNING"),
        }
    }
}

/// One finding about one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub entry_name: String,
    pub severity: Severity,
    /// Dotted path of the offending field
    pub field: String,
    pub message: String,
    /// Shell command that fixes the issue, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_command: Option<String>,
}

impl ValidationIssue {
    pub fn error(entry: &str, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entry_name: entry.to_string(),
            severity: Severity::Error,
            field: field.into(),
            message: message.into(),
            remediation_command: None,
        }
    }

    pub fn warning(entry: &str, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entry_name: entry.to_string(),
            severity: Severity::Warning,
            field: field.into(),
            message: message.into(),
            remediation_command: None,
        }
    }

    pub fn with_remediation(mut self, command: Option<String>) -> Self {
        self.remediation_command = command;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}: {}",
            self.severity, self.entry_name, self.field, self.message
        )
    }
}

/// Every issue found in one run, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|issue| issue.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|issue| !issue.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_error)
    }

    pub fn has_errors_for(&self, entry: &str) -> bool {
        self.errors().any(|issue| issue.entry_name == entry)
    }

    pub fn issues_for<'a>(&'a self, entry: &'a str) -> impl Iterator<Item = &'a ValidationIssue> {
        self.issues.iter().filter(move |issue| issue.entry_name == entry)
    }

    /// Entry names with at least one issue, in first-seen order.
    pub fn entry_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.issues
            .iter()
            .map(|issue| issue.entry_name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Remediation commands in issue order, each listed once.
    pub fn remediation_commands(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.issues
            .iter()
            .filter_map(|issue| issue.remediation_command.as_deref())
            .filter(|command| seen.insert(*command))
            .collect()
    }

    /// Issues that carry a remediation command
    pub fn fixable(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.remediation_command.is_some())
    }
}

impl Extend<ValidationIssue> for ValidationReport {
    fn extend<T: IntoIterator<Item = ValidationIssue>>(&mut self, iter: T) {
        self.issues.extend(iter);
    }
}
