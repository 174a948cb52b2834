//! Rendering of validation results.
//!
//! Remediation lives on the issues as plain data; a [`Reporter`] decides how
//! it is shown. Three renderings exist: a human summary grouped by entry, a
//! JSON document for tooling, and an executable fix script.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::emit::ExcludedEntry;
use crate::error::{DbMonError, Result};
use crate::validation::{Severity, ValidationIssue, ValidationReport};

/// Renders a validation report.
pub trait Reporter {
    /// Renders `report` and the entries left out of the output.
    ///
    /// # Errors
    /// Returns an error if the rendering cannot be produced.
    fn render(&self, report: &ValidationReport, excluded: &[ExcludedEntry]) -> Result<String>;
}

/// Report format selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = DbMonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "human" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(DbMonError::configuration(format!(
                "unknown report format '{}', expected text or json",
                other
            ))),
        }
    }
}

impl ReportFormat {
    /// Reporter for this format
    pub fn reporter(self) -> Box<dyn Reporter> {
        match self {
            Self::Text => Box::new(SummaryReporter),
            Self::Json => Box::new(JsonReporter::default()),
        }
    }
}

/// Human-readable summary grouped by entry, errors before warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryReporter;

impl Reporter for SummaryReporter {
    fn render(&self, report: &ValidationReport, excluded: &[ExcludedEntry]) -> Result<String> {
        let mut out = String::new();
        let entries = report.entry_names();

        if entries.is_empty() {
            out.push_str("No issues found\n");
        } else {
            let _ = writeln!(
                out,
                "Validation summary: {} error(s), {} warning(s) across {} entries",
                report.error_count(),
                report.warning_count(),
                entries.len()
            );
        }

        for entry in entries {
            let _ = writeln!(out, "\n{}", entry);
            for severity in [Severity::Error, Severity::Warning] {
                for issue in report
                    .issues_for(entry)
                    .filter(|issue| issue.severity == severity)
                {
                    let _ = writeln!(out, "  {} {}: {}", issue.severity, issue.field, issue.message);
                    if let Some(command) = &issue.remediation_command {
                        let _ = writeln!(out, "    fix: {}", command);
                    }
                }
            }
        }

        if !excluded.is_empty() {
            let _ = writeln!(out, "\nExcluded from output:");
            for entry in excluded {
                let _ = writeln!(out, "  {}: {}", entry.name, entry.reason);
            }
        }

        Ok(out)
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    error_count: usize,
    warning_count: usize,
    issues: &'a [ValidationIssue],
    excluded: &'a [ExcludedEntry],
    remediation_commands: Vec<&'a str>,
}

/// Machine-readable report.
#[derive(Debug, Clone, Copy)]
pub struct JsonReporter {
    pub pretty: bool,
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl Reporter for JsonReporter {
    fn render(&self, report: &ValidationReport, excluded: &[ExcludedEntry]) -> Result<String> {
        let body = JsonReport {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            issues: report.issues(),
            excluded,
            remediation_commands: report.remediation_commands(),
        };
        let rendered = if self.pretty {
            serde_json::to_string_pretty(&body)
        } else {
            serde_json::to_string(&body)
        };
        rendered
            .map(|mut text| {
                text.push('\n');
                text
            })
            .map_err(|source| DbMonError::Serialization {
                context: "validation report to JSON".to_string(),
                source,
            })
    }
}

/// Bash script with one commented block per fixable issue.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixScriptReporter {
    /// Written into the header when set
    pub generated_at: Option<DateTime<Utc>>,
}

impl FixScriptReporter {
    /// Script header stamped with the current time
    pub fn timestamped() -> Self {
        Self {
            generated_at: Some(Utc::now()),
        }
    }
}

/// Keeps multi-line messages inside a single comment line.
fn comment_line(text: &str) -> String {
    text.lines().collect::<Vec<_>>().join(" ")
}

impl Reporter for FixScriptReporter {
    fn render(&self, report: &ValidationReport, _excluded: &[ExcludedEntry]) -> Result<String> {
        let mut out = String::from("#!/bin/bash\n# Commands to fix database monitoring configuration issues\n");
        if let Some(generated_at) = self.generated_at {
            let _ = writeln!(out, "# Generated: {}", generated_at.to_rfc3339());
        }
        out.push_str("# Replace YOUR_PASSWORD before running.\n");

        let mut fixable = report.fixable().peekable();
        if fixable.peek().is_none() {
            out.push_str("\n# No fixable issues found\n");
        }
        for issue in fixable {
            if let Some(command) = &issue.remediation_command {
                let _ = write!(
                    out,
                    "\n# {}: {}\n# {}\n{}\n",
                    issue.entry_name,
                    issue.field,
                    comment_line(&issue.message),
                    command
                );
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::ExclusionReason;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sample_report() -> ValidationReport {
        let mut report = ValidationReport::new();
        report.push(ValidationIssue::warning(
            "prod-db",
            "credentials.password",
            "plain-text password in configuration",
        ));
        report.push(
            ValidationIssue::error(
                "prod-db",
                "credentials.password_env",
                "credential resolution failed (NotFound): DB_PASS",
            )
            .with_remediation(Some("export DB_PASS='YOUR_PASSWORD'".to_string())),
        );
        report.push(ValidationIssue::warning("reports", "name", "odd name"));
        report
    }

    fn excluded() -> Vec<ExcludedEntry> {
        vec![ExcludedEntry {
            name: "prod-db".to_string(),
            reason: ExclusionReason::ValidationErrors { count: 1 },
        }]
    }

    #[test]
    fn test_summary_groups_by_entry_errors_first() {
        let text = SummaryReporter.render(&sample_report(), &excluded()).unwrap();
        let expected = "\
Validation summary: 1 error(s), 2 warning(s) across 2 entries

prod-db
  ERROR credentials.password_env: credential resolution failed (NotFound): DB_PASS
    fix: export DB_PASS='YOUR_PASSWORD'
  WARNING credentials.password: plain-text password in configuration

reports
  WARNING name: odd name

Excluded from output:
  prod-db: 1 validation error(s)
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_summary_without_issues() {
        let text = SummaryReporter.render(&ValidationReport::new(), &[]).unwrap();
        assert_eq!(text, "No issues found\n");
    }

    #[test]
    fn test_json_report_shape() {
        let text = JsonReporter { pretty: false }
            .render(&sample_report(), &excluded())
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["error_count"], 1);
        assert_eq!(value["warning_count"], 2);
        assert_eq!(value["issues"][1]["severity"], "error");
        assert_eq!(value["excluded"][0]["reason"], "validation_errors");
        assert_eq!(value["excluded"][0]["count"], 1);
        assert_eq!(
            value["remediation_commands"][0],
            "export DB_PASS='YOUR_PASSWORD'"
        );
    }

    #[test]
    fn test_fix_script_blocks() {
        let reporter = FixScriptReporter {
            generated_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        };
        let script = reporter.render(&sample_report(), &[]).unwrap();
        let expected = "\
#!/bin/bash
# Commands to fix database monitoring configuration issues
# Generated: 2024-05-01T12:00:00+00:00
# Replace YOUR_PASSWORD before running.

# prod-db: credentials.password_env
# credential resolution failed (NotFound): DB_PASS
export DB_PASS='YOUR_PASSWORD'
";
        assert_eq!(script, expected);
    }

    #[test]
    fn test_fix_script_without_fixable_issues() {
        let script = FixScriptReporter::default()
            .render(&ValidationReport::new(), &[])
            .unwrap();
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(!script.contains("Generated"));
        assert!(script.ends_with("# No fixable issues found\n"));
    }

    #[test]
    fn test_report_format_parsing() {
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("TEXT".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert!("xml".parse::<ReportFormat>().is_err());
    }
}
