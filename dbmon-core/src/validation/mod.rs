//! Entry validation and remediation.
//!
//! The [`Validator`] folds normalization rejections and credential failures
//! into a single [`ValidationReport`] alongside its own structural,
//! cross-field, and monitoring value checks. Remediation is plain data on
//! each issue; rendering it is left to a [`Reporter`](crate::report::Reporter).

pub mod output;
mod report;

use std::net::IpAddr;

use regex::Regex;
use tracing::{debug, info};

pub use report::{Severity, ValidationIssue, ValidationReport};

use crate::credentials::{CredentialFailure, Resolution};
use crate::error::{CredentialErrorKind, DbMonError, Result};
use crate::models::{
    Connection, DatabaseEntry, DatabaseType, EntryShape, MonitoringConfig, PasswordSource,
    Provider, RejectedEntry, SourceKind,
};

/// Accepted PostgreSQL `sslmode` values.
pub const SSL_MODES: [&str; 6] = ["disable", "allow", "prefer", "require", "verify-ca", "verify-full"];

/// Placeholder used in generated commands where the operator supplies a secret.
pub const PASSWORD_PLACEHOLDER: &str = "YOUR_PASSWORD";

const NAME_PATTERN: &str = r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$";
const HOSTNAME_PATTERN: &str =
    r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";
const INTERVAL_PATTERN: &str = r"^\d+[smh]$";
const SECRET_NAME_PATTERN: &str = r"^[a-zA-Z0-9/_+=.@-]+$";
const SSM_PARAMETER_PATTERN: &str = r"^/[a-zA-Z0-9/_.-]+$";
const ENV_VAR_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

const MAX_SQL_QUERY_LENGTH: std::ops::RangeInclusive<i64> = 1..=10_000;
const QUERY_TIMEOUT_SECS: std::ops::RangeInclusive<i64> = 1..=3_600;

/// Compiled field-format patterns.
#[derive(Debug, Clone)]
pub struct Validator {
    name: Regex,
    hostname: Regex,
    interval: Regex,
    secret_name: Regex,
    ssm_parameter: Regex,
    env_var: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        DbMonError::configuration(format!("invalid validation pattern {}: {}", pattern, e))
    })
}

impl Validator {
    /// Compiles the validation patterns.
    ///
    /// # Errors
    /// Returns a configuration error if a built-in pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            name: compile(NAME_PATTERN)?,
            hostname: compile(HOSTNAME_PATTERN)?,
            interval: compile(INTERVAL_PATTERN)?,
            secret_name: compile(SECRET_NAME_PATTERN)?,
            ssm_parameter: compile(SSM_PARAMETER_PATTERN)?,
            env_var: compile(ENV_VAR_PATTERN)?,
        })
    }

    /// Validates a merged configuration.
    ///
    /// `resolution` is `None` when credentials were not resolved (offline
    /// validation); the structural checks still run.
    pub fn validate(&self, config: &MonitoringConfig, resolution: Option<&Resolution>) -> ValidationReport {
        let mut report = ValidationReport::new();

        for rejected in &config.rejected {
            report.push(rejection_issue(rejected));
        }

        for entry in &config.entries {
            self.check_entry(entry, &mut report);
            if let Some(failure) = resolution.and_then(|r| r.failure_for(&entry.name)) {
                report.push(credential_issue(failure));
            }
        }

        info!(
            "Validation completed: {} error(s), {} warning(s)",
            report.error_count(),
            report.warning_count()
        );
        report
    }

    fn check_entry(&self, entry: &DatabaseEntry, report: &mut ValidationReport) {
        debug!("Validating '{}'", entry.name);
        let name = entry.name.as_str();

        if !self.name.is_match(name) {
            let message =
                "name must start with a letter or digit and contain only letters, digits, '-' and '_'";
            // Legacy names may fall back to the host, which is allowed to contain dots
            report.push(match entry.shape {
                EntryShape::Enhanced => ValidationIssue::error(name, "name", message),
                EntryShape::Legacy => ValidationIssue::warning(name, "name", message),
            });
        }

        for ignored in &entry.ignored_fields {
            report.push(ValidationIssue::warning(name, &ignored.field, &ignored.reason));
        }

        self.check_connection(entry, report);
        self.check_credentials(entry, report);
        self.check_monitoring(entry, report);
        check_provider_flags(entry, report);
        check_tls(entry, report);
    }

    fn is_valid_host(&self, host: &str) -> bool {
        host.parse::<IpAddr>().is_ok() || (host.len() <= 253 && self.hostname.is_match(host))
    }

    fn check_connection(&self, entry: &DatabaseEntry, report: &mut ValidationReport) {
        let name = entry.name.as_str();
        let connection = &entry.connection;

        if !self.is_valid_host(connection.host()) {
            report.push(ValidationIssue::error(
                name,
                connection.host_field(),
                format!("'{}' is not a valid hostname or IP address", connection.host()),
            ));
        }

        if let Some(reader) = connection.reader_host() {
            if !self.is_valid_host(reader) {
                report.push(ValidationIssue::error(
                    name,
                    "connection.reader_endpoint",
                    format!("'{}' is not a valid hostname or IP address", reader),
                ));
            }
        }

        if connection.database().is_some_and(|database| database.trim().is_empty()) {
            report.push(ValidationIssue::error(
                name,
                "connection.database",
                "database must not be empty; omit it to use the default",
            ));
        }

        if connection.port() == 0 {
            report.push(ValidationIssue::error(
                name,
                "connection.port",
                "port must be between 1 and 65535",
            ));
        }

        if let Some(ssl_mode) = connection.ssl_mode() {
            if !SSL_MODES.contains(&ssl_mode) {
                report.push(ValidationIssue::error(
                    name,
                    "connection.ssl_mode",
                    format!(
                        "invalid ssl_mode '{}', expected one of: {}",
                        ssl_mode,
                        SSL_MODES.join(", ")
                    ),
                ));
            } else if entry.db_type == DatabaseType::Mysql {
                report.push(ValidationIssue::warning(
                    name,
                    "connection.ssl_mode",
                    "ssl_mode only applies to postgresql; use tls settings for mysql",
                ));
            }
        }
    }

    fn check_credentials(&self, entry: &DatabaseEntry, report: &mut ValidationReport) {
        let name = entry.name.as_str();
        if entry.credentials.username.trim().is_empty() {
            report.push(ValidationIssue::error(
                name,
                "credentials.username",
                "username must not be empty",
            ));
        }

        match &entry.credentials.source {
            PasswordSource::Plain { .. } => {
                report.push(ValidationIssue::warning(
                    name,
                    "credentials.password",
                    "plain-text password in configuration; consider a secret store or environment variable",
                ));
            }
            PasswordSource::EnvVar { variable } => {
                if !self.env_var.is_match(variable) {
                    report.push(ValidationIssue::error(
                        name,
                        "credentials.password_env",
                        format!("'{}' is not a valid environment variable name", variable),
                    ));
                }
            }
            PasswordSource::AwsSecretsManager { key, .. } => {
                if !self.secret_name.is_match(key) {
                    report.push(ValidationIssue::error(
                        name,
                        "credentials.password_key",
                        format!("invalid secret name '{}'", key),
                    ));
                }
            }
            PasswordSource::AwsSsmParameter { key, .. } => {
                if !self.ssm_parameter.is_match(key) {
                    report.push(ValidationIssue::error(
                        name,
                        "credentials.password_key",
                        format!("invalid SSM parameter name '{}', must start with '/'", key),
                    ));
                }
            }
        }
    }

    fn check_monitoring(&self, entry: &DatabaseEntry, report: &mut ValidationReport) {
        let name = entry.name.as_str();
        let monitoring = &entry.monitoring;

        let intervals = [
            ("monitoring.interval", &monitoring.interval),
            ("monitoring.query_metrics_interval", &monitoring.query_metrics_interval),
        ];
        for (field, value) in intervals {
            if let Some(value) = value {
                if !self.interval.is_match(value) {
                    report.push(ValidationIssue::error(
                        name,
                        field,
                        format!("invalid interval '{}', expected a number followed by s, m or h", value),
                    ));
                }
            }
        }

        if let Some(length) = monitoring.max_sql_query_length {
            if !MAX_SQL_QUERY_LENGTH.contains(&length) {
                report.push(ValidationIssue::error(
                    name,
                    "monitoring.max_sql_query_length",
                    format!("{} is outside 1-10000", length),
                ));
            }
        }

        if let Some(timeout) = monitoring.query_timeout {
            if !QUERY_TIMEOUT_SECS.contains(&timeout) {
                report.push(ValidationIssue::error(
                    name,
                    "monitoring.query_timeout",
                    format!("{} is outside 1-3600 seconds", timeout),
                ));
            }
        }

        if let Some(limit) = monitoring.batch_limit {
            if limit < 1 {
                report.push(ValidationIssue::error(
                    name,
                    "monitoring.batch_limit",
                    "batch_limit must be at least 1",
                ));
            }
        }

        if monitoring.monitor_readers == Some(true) && entry.provider() == Provider::Aurora {
            if entry.connection.reader_host().is_none() {
                report.push(
                    ValidationIssue::error(
                        name,
                        "connection.reader_endpoint",
                        "monitoring.monitor_readers is enabled but connection.reader_endpoint is not set",
                    )
                    .with_remediation(Some(reader_endpoint_command(&entry.connection))),
                );
            }
        }
    }
}

fn check_provider_flags(entry: &DatabaseEntry, report: &mut ValidationReport) {
    let name = entry.name.as_str();
    let provider = entry.provider();
    let monitoring = &entry.monitoring;

    let managed_flags = [
        ("monitoring.collect_rds_metrics", monitoring.collect_rds_metrics, Provider::Rds),
        ("monitoring.collect_aurora_metrics", monitoring.collect_aurora_metrics, Provider::Aurora),
        ("monitoring.monitor_readers", monitoring.monitor_readers, Provider::Aurora),
    ];
    for (field, value, expected) in managed_flags {
        if value == Some(true) && provider != expected {
            report.push(ValidationIssue::warning(
                name,
                field,
                format!("only applies to provider {}, ignored for {}", expected, provider),
            ));
        }
    }

    if entry.db_type == DatabaseType::Mysql {
        let postgres_flags = [
            ("monitoring.collect_bloat_metrics", monitoring.collect_bloat_metrics),
            ("monitoring.collect_db_lock_metrics", monitoring.collect_db_lock_metrics),
        ];
        for (field, value) in postgres_flags {
            if value == Some(true) {
                report.push(ValidationIssue::warning(
                    name,
                    field,
                    "only applies to postgresql, ignored for mysql",
                ));
            }
        }
    }
}

fn check_tls(entry: &DatabaseEntry, report: &mut ValidationReport) {
    let name = entry.name.as_str();
    if entry
        .tls
        .ca_bundle_file
        .as_deref()
        .is_some_and(|path| path.trim().is_empty())
    {
        report.push(ValidationIssue::error(
            name,
            "tls.ca_bundle_file",
            "CA bundle path must not be empty",
        ));
    }
    if entry.tls.is_enabled() {
        return;
    }
    if entry
        .tls
        .ca_bundle_file
        .as_deref()
        .is_some_and(|path| !path.trim().is_empty())
    {
        report.push(ValidationIssue::warning(
            name,
            "tls.ca_bundle_file",
            "CA bundle is set but TLS is disabled",
        ));
    }
    if entry.tls.verify_server_certificate == Some(true) {
        report.push(ValidationIssue::warning(
            name,
            "tls.verify_server_certificate",
            "certificate verification is enabled but TLS is disabled",
        ));
    }
}

fn rejection_issue(rejected: &RejectedEntry) -> ValidationIssue {
    ValidationIssue::error(
        &rejected.name,
        rejected.error.field(),
        format!("{} ({}[{}])", rejected.error, rejected.list, rejected.index),
    )
}

fn credential_issue(failure: &CredentialFailure) -> ValidationIssue {
    let field = match failure.source {
        SourceKind::Plain => "credentials.password",
        SourceKind::EnvVar => "credentials.password_env",
        SourceKind::AwsSecretsManager | SourceKind::AwsSsmParameter => "credentials.password_key",
    };
    ValidationIssue::error(&failure.entry, field, failure.error.to_string())
        .with_remediation(remediation_for(failure))
}

/// Quotes a value for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn region_flag(region: Option<&str>) -> String {
    region.map_or_else(String::new, |r| format!(" --region {}", shell_quote(r)))
}

/// Shell command that addresses a credential failure, if one exists.
pub fn remediation_for(failure: &CredentialFailure) -> Option<String> {
    let reference = failure.reference.as_deref()?;
    let region = region_flag(failure.region.as_deref());
    match (failure.error.kind, failure.source) {
        (CredentialErrorKind::NotFound, SourceKind::EnvVar) => Some(format!(
            "export {}={}",
            reference,
            shell_quote(PASSWORD_PLACEHOLDER)
        )),
        (CredentialErrorKind::NotFound, SourceKind::AwsSecretsManager) => Some(format!(
            "aws secretsmanager create-secret --name {} --secret-string {}{}",
            shell_quote(reference),
            shell_quote(PASSWORD_PLACEHOLDER),
            region
        )),
        (CredentialErrorKind::NotFound, SourceKind::AwsSsmParameter) => Some(format!(
            "aws ssm put-parameter --name {} --value {} --type SecureString{}",
            shell_quote(reference),
            shell_quote(PASSWORD_PLACEHOLDER),
            region
        )),
        (
            CredentialErrorKind::AccessDenied | CredentialErrorKind::Unavailable,
            SourceKind::AwsSecretsManager | SourceKind::AwsSsmParameter,
        ) => Some(format!("aws sts get-caller-identity{}", region)),
        _ => None,
    }
}

/// `aws rds describe-db-clusters` lookup for the reader endpoint of a cluster.
fn reader_endpoint_command(connection: &Connection) -> String {
    let endpoint = connection.host();
    let labels: Vec<&str> = endpoint.split('.').collect();
    let cluster = labels.first().copied().unwrap_or(endpoint);
    // <cluster>.cluster-<id>.<region>.rds.amazonaws.com
    let region = if endpoint.ends_with(".rds.amazonaws.com") && labels.len() >= 6 {
        labels.get(labels.len() - 4).copied()
    } else {
        None
    };
    format!(
        "aws rds describe-db-clusters --db-cluster-identifier {} --query 'DBClusters[0].ReaderEndpoint' --output text{}",
        shell_quote(cluster),
        region_flag(region)
    )
}
