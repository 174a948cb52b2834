//! Canonical document emission.
//!
//! Flattens every emittable entry into the item shape the agent templates
//! consume, grouped by database type in input order. Entries that are
//! disabled, rejected, carry error issues, or have no resolved password are
//! left out and listed in [`Emission::excluded`] with the reason.
//!
//! # Security Guarantees
//! - Items carry the resolved password and nothing about where it came from
//! - Each item is self-checked with
//!   [`validate_canonical_item`](crate::validation::output::validate_canonical_item);
//!   an item that fails is excluded and reported, the rest are still emitted
//! - [`CanonicalDocument::masked`] produces a copy safe to print

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::credentials::{REDACTED, Resolution, Secret};
use crate::error::{DbMonError, Result};
use crate::models::{
    DatabaseEntry, DatabaseType, ENVIRONMENT_LABEL, MonitoringConfig, MonitoringOptions,
    PasswordSource, Provider,
};
use crate::validation::output::{
    OutputCheckError, scan_for_source_markers, validate_canonical_item,
};
use crate::validation::{ValidationIssue, ValidationReport};

/// `database` emitted for PostgreSQL items that do not name one.
pub const DEFAULT_POSTGRES_DATABASE: &str = "postgres";

/// `sslmode` emitted for PostgreSQL items that do not set one.
pub const DEFAULT_POSTGRES_SSLMODE: &str = "require";

/// Item keys owned by the canonical shape. Extra monitoring keys and entry
/// passthrough keys with these names are dropped.
const RESERVED_ITEM_KEYS: &[&str] = &[
    "service_name",
    "provider",
    "host",
    "port",
    "reader_host",
    "user",
    "password",
    "database",
    "sslmode",
    "tls_enabled",
    "tls_verify_server_certificate",
    "tls_ca",
    "environment",
    "custom_labels",
    "password_source",
    "password_key",
    "password_env",
    "credentials",
];

/// Serialization format of the canonical document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl OutputFormat {
    /// `.json` selects JSON; everything else is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// One flat database item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalItem {
    pub service_name: String,
    pub provider: Provider,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reader_host: Option<String>,
    pub user: String,
    pub password: Secret,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslmode: Option<String>,
    #[serde(flatten)]
    pub monitoring: MonitoringOptions,
    pub tls_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_verify_server_certificate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_ca: Option<String>,
    pub environment: String,
    pub custom_labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub passthrough: BTreeMap<String, Value>,
}

/// The rendered agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CanonicalDocument {
    #[serde(flatten)]
    pub passthrough: BTreeMap<String, Value>,
    pub mysql_databases: Vec<CanonicalItem>,
    pub postgresql_databases: Vec<CanonicalItem>,
}

impl CanonicalDocument {
    /// Number of emitted items
    pub fn len(&self) -> usize {
        self.mysql_databases.len() + self.postgresql_databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items in emission order
    pub fn items(&self) -> impl Iterator<Item = &CanonicalItem> {
        self.mysql_databases
            .iter()
            .chain(self.postgresql_databases.iter())
    }

    pub fn item(&self, service_name: &str) -> Option<&CanonicalItem> {
        self.items().find(|item| item.service_name == service_name)
    }

    /// Copy with every password replaced by the redaction marker.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        for item in masked
            .mysql_databases
            .iter_mut()
            .chain(masked.postgresql_databases.iter_mut())
        {
            item.password = Secret::new(REDACTED);
        }
        masked
    }

    /// JSON value of the document, plaintext passwords included.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|source| DbMonError::Serialization {
            context: "canonical document to JSON value".to_string(),
            source,
        })
    }

    /// Renders the document as YAML or pretty JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Yaml => {
                serde_yaml::to_string(self).map_err(|source| DbMonError::Yaml {
                    context: "canonical document to YAML".to_string(),
                    source,
                })
            }
            OutputFormat::Json => serde_json::to_string_pretty(self)
                .map(|mut text| {
                    text.push('\n');
                    text
                })
                .map_err(|source| DbMonError::Serialization {
                    context: "canonical document to JSON".to_string(),
                    source,
                }),
        }
    }
}

/// Why an entry was left out of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    Disabled,
    Rejected,
    ValidationErrors { count: usize },
    UnresolvedCredential,
    OutputCheck { detail: String },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Rejected => write!(f, "rejected during normalization"),
            Self::ValidationErrors { count } => write!(f, "{} validation error(s)", count),
            Self::UnresolvedCredential => write!(f, "password not resolved"),
            Self::OutputCheck { detail } => write!(f, "failed output check: {}", detail),
        }
    }
}

/// Entry that was not emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedEntry {
    pub name: String,
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

/// Canonical document plus everything that was left out of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emission {
    pub document: CanonicalDocument,
    pub excluded: Vec<ExcludedEntry>,
    /// Error issues for items that failed the output self-check
    pub issues: Vec<ValidationIssue>,
}

/// Builds the canonical document, self-checking each item.
///
/// With `resolution` set to `None` only plain passwords can be emitted;
/// entries using any other source are excluded as unresolved. Items that
/// fail the output self-check are excluded and get an error issue in
/// [`Emission::issues`].
///
/// # Errors
/// Returns an error only if an item cannot be serialized for the check or
/// the embedded schema fails to compile.
pub fn emit(
    config: &MonitoringConfig,
    report: &ValidationReport,
    resolution: Option<&Resolution>,
) -> Result<Emission> {
    let mut emission = Emission {
        document: CanonicalDocument {
            passthrough: document_passthrough(&config.passthrough),
            ..CanonicalDocument::default()
        },
        ..Emission::default()
    };

    for rejected in &config.rejected {
        emission.excluded.push(ExcludedEntry {
            name: rejected.name.clone(),
            reason: ExclusionReason::Rejected,
        });
    }

    for entry in &config.entries {
        let built = match build_item(entry, report, resolution) {
            Ok(item) => check_item(entry, item)?,
            Err(reason) => Err(reason),
        };
        match built {
            Ok(item) => match entry.db_type {
                DatabaseType::Mysql => emission.document.mysql_databases.push(item),
                DatabaseType::Postgresql => emission.document.postgresql_databases.push(item),
            },
            Err(ExclusionReason::OutputCheck { detail }) => {
                warn!("Excluding '{}': failed output check: {}", entry.name, detail);
                emission.issues.push(ValidationIssue::error(
                    &entry.name,
                    "output",
                    format!("emitted item failed the output check: {}", detail),
                ));
                emission.excluded.push(ExcludedEntry {
                    name: entry.name.clone(),
                    reason: ExclusionReason::OutputCheck { detail },
                });
            }
            Err(reason) => {
                debug!("Excluding '{}': {}", entry.name, reason);
                emission.excluded.push(ExcludedEntry {
                    name: entry.name.clone(),
                    reason,
                });
            }
        }
    }

    info!(
        "Emitted {} entries, excluded {}",
        emission.document.len(),
        emission.excluded.len()
    );
    Ok(emission)
}

/// Top-level passthrough minus `_`-prefixed keys and anything carrying a
/// credential source key.
fn document_passthrough(passthrough: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    passthrough
        .iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .filter(|(key, value)| {
            let mut single = serde_json::Map::new();
            single.insert((*key).clone(), (*value).clone());
            match scan_for_source_markers(&Value::Object(single), "") {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping top-level '{}': {}", key, e);
                    false
                }
            }
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Runs the output self-check on a built item. The password is redacted
/// first so check failures never quote it.
fn check_item(
    entry: &DatabaseEntry,
    item: CanonicalItem,
) -> Result<std::result::Result<CanonicalItem, ExclusionReason>> {
    let mut redacted = item.clone();
    redacted.password = Secret::new(REDACTED);
    let value = serde_json::to_value(&redacted).map_err(|source| DbMonError::Serialization {
        context: format!("item '{}' to JSON value", entry.name),
        source,
    })?;

    match validate_canonical_item(entry.db_type, &value) {
        Ok(()) => Ok(Ok(item)),
        Err(e @ OutputCheckError::SchemaCompilation { .. }) => Err(e.into()),
        Err(e) => Ok(Err(ExclusionReason::OutputCheck {
            detail: e.to_string(),
        })),
    }
}

fn build_item(
    entry: &DatabaseEntry,
    report: &ValidationReport,
    resolution: Option<&Resolution>,
) -> std::result::Result<CanonicalItem, ExclusionReason> {
    if !entry.enabled {
        return Err(ExclusionReason::Disabled);
    }

    let errors = report
        .errors()
        .filter(|issue| issue.entry_name == entry.name)
        .count();
    if errors > 0 {
        return Err(ExclusionReason::ValidationErrors { count: errors });
    }

    let (user, password) = match resolution {
        Some(resolution) => {
            let credential = resolution
                .credential_for(&entry.name)
                .ok_or(ExclusionReason::UnresolvedCredential)?;
            (credential.username.clone(), credential.password.clone())
        }
        None => match &entry.credentials.source {
            PasswordSource::Plain { password } => {
                (entry.credentials.username.clone(), password.clone())
            }
            _ => return Err(ExclusionReason::UnresolvedCredential),
        },
    };

    let connection = &entry.connection;
    let (database, sslmode) = match entry.db_type {
        DatabaseType::Postgresql => (
            Some(
                connection
                    .database()
                    .unwrap_or(DEFAULT_POSTGRES_DATABASE)
                    .to_string(),
            ),
            Some(
                connection
                    .ssl_mode()
                    .unwrap_or(DEFAULT_POSTGRES_SSLMODE)
                    .to_string(),
            ),
        ),
        DatabaseType::Mysql => (connection.database().map(str::to_string), None),
    };

    let tls_enabled = entry.tls.is_enabled();
    let custom_labels = entry
        .labels
        .iter()
        .filter(|(key, _)| key.as_str() != ENVIRONMENT_LABEL)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(CanonicalItem {
        service_name: entry.name.clone(),
        provider: entry.provider(),
        host: connection.host().to_string(),
        port: connection.port(),
        reader_host: connection.reader_host().map(str::to_string),
        user,
        password,
        database,
        sslmode,
        monitoring: applicable_monitoring(entry),
        tls_enabled,
        tls_verify_server_certificate: entry
            .tls
            .verify_server_certificate
            .filter(|_| tls_enabled),
        tls_ca: entry.tls.ca_bundle_file.clone().filter(|_| tls_enabled),
        environment: entry.environment().to_string(),
        custom_labels,
        passthrough: without_reserved(&entry.name, &entry.passthrough),
    })
}

/// Merged monitoring options minus the flags that do not apply to the
/// entry's provider or type.
fn applicable_monitoring(entry: &DatabaseEntry) -> MonitoringOptions {
    let mut monitoring = entry.monitoring.clone();
    let provider = entry.provider();
    if provider != Provider::Rds {
        monitoring.collect_rds_metrics = None;
    }
    if provider != Provider::Aurora {
        monitoring.collect_aurora_metrics = None;
        monitoring.monitor_readers = None;
    }
    if entry.db_type == DatabaseType::Mysql {
        monitoring.collect_bloat_metrics = None;
        monitoring.collect_db_lock_metrics = None;
    }
    monitoring.extra = without_reserved(&entry.name, &monitoring.extra);
    monitoring
}

fn without_reserved(entry: &str, values: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    values
        .iter()
        .filter(|(key, _)| {
            let reserved = RESERVED_ITEM_KEYS.contains(&key.as_str());
            if reserved {
                warn!("Dropping '{}' from '{}': the key is reserved", key, entry);
            }
            !reserved
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialProvenance, ResolvedCredential};
    use crate::defaults::merge_defaults;
    use crate::models::SourceKind;
    use crate::normalize::{InputFormat, normalize, parse_document};
    use crate::validation::Validator;
    use pretty_assertions::assert_eq;

    fn merged(text: &str) -> MonitoringConfig {
        merge_defaults(normalize(&[parse_document(text, InputFormat::Yaml).unwrap()]).unwrap())
    }

    fn emit_offline(text: &str) -> Emission {
        let config = merged(text);
        let report = Validator::new().unwrap().validate(&config, None);
        emit(&config, &report, None).unwrap()
    }

    #[test]
    fn test_legacy_postgres_item_shape() {
        let emission = emit_offline(
            r"
newrelic_account_id: '12345'
postgresql_databases:
  - name: reports
    host: pg.internal
    password: pg-pass
    environment: staging
    custom_labels: {team: analytics}
",
        );
        let yaml = emission.document.render(OutputFormat::Yaml).unwrap();
        let expected = r"newrelic_account_id: '12345'
mysql_databases: []
postgresql_databases:
- service_name: reports
  provider: ec2
  host: pg.internal
  port: 5432
  user: newrelic
  password: pg-pass
  database: postgres
  sslmode: require
  extended_metrics: true
  interval: 30s
  enable_query_monitoring: true
  query_metrics_interval: 60s
  max_sql_query_length: 1000
  gather_query_samples: true
  query_timeout: 30
  batch_limit: 100
  collect_bloat_metrics: true
  collect_db_lock_metrics: true
  tls_enabled: false
  environment: staging
  custom_labels:
    team: analytics
";
        assert_eq!(yaml, expected);
    }

    #[test]
    fn test_disabled_and_invalid_entries_excluded_with_reason() {
        let emission = emit_offline(
            r"
databases:
  - name: off
    type: mysql
    enabled: false
    connection: {host: a}
    credentials: {password: p}
  - name: broken
    type: mysql
    connection: {host: 'not valid!'}
    credentials: {password: p}
  - name: env-backed
    type: mysql
    connection: {host: c}
    credentials: {password_source: env_var, password_env: DB_PASS}
  - name: kept
    type: mysql
    connection: {host: d}
    credentials: {password: p}
  - name: bad-provider
    type: mysql
    provider: azure
    connection: {host: e}
",
        );
        let names: Vec<&str> = emission.document.items().map(|i| i.service_name.as_str()).collect();
        assert_eq!(names, vec!["kept"]);
        assert_eq!(
            emission.excluded,
            vec![
                ExcludedEntry { name: "bad-provider".into(), reason: ExclusionReason::Rejected },
                ExcludedEntry { name: "off".into(), reason: ExclusionReason::Disabled },
                ExcludedEntry {
                    name: "broken".into(),
                    reason: ExclusionReason::ValidationErrors { count: 1 }
                },
                ExcludedEntry {
                    name: "env-backed".into(),
                    reason: ExclusionReason::UnresolvedCredential
                },
            ]
        );
    }

    #[test]
    fn test_resolved_password_used_and_no_markers() {
        let config = merged(
            r"
databases:
  - name: prod-mysql
    type: mysql
    provider: rds
    connection: {endpoint: prod.abc123.us-east-1.rds.amazonaws.com}
    credentials:
      username: monitor
      password_source: aws_secrets_manager
      password_key: prod/mysql/newrelic
",
        );
        let resolution = Resolution {
            credentials: vec![ResolvedCredential {
                username: "monitor".to_string(),
                password: Secret::new("from-secrets-manager"),
                provenance: CredentialProvenance {
                    entry: "prod-mysql".to_string(),
                    source: SourceKind::AwsSecretsManager,
                    reference: Some("prod/mysql/newrelic".to_string()),
                    region: None,
                },
            }],
            failures: Vec::new(),
        };
        let report = Validator::new().unwrap().validate(&config, Some(&resolution));
        let emission = emit(&config, &report, Some(&resolution)).unwrap();

        let item = emission.document.item("prod-mysql").unwrap();
        assert!(item.tls_enabled);
        assert_eq!(item.password.expose(), "from-secrets-manager");
        assert_eq!(item.user, "monitor");
        assert_eq!(item.monitoring.collect_rds_metrics, Some(true));

        let json = emission.document.render(OutputFormat::Json).unwrap();
        assert!(!json.contains("password_source"));
        assert!(!json.contains("aws_secrets_manager"));
        assert!(!json.contains("prod/mysql/newrelic"));
    }

    #[test]
    fn test_inapplicable_flags_and_tls_details_dropped() {
        let emission = emit_offline(
            r"
databases:
  - name: plain-mysql
    type: mysql
    connection: {host: h}
    credentials: {password: p}
    monitoring:
      collect_rds_metrics: true
      collect_bloat_metrics: true
      custom_threshold: 5
      host: shadowed
    tls: {ca_bundle_file: /etc/ssl/ca.pem}
",
        );
        let item = emission.document.item("plain-mysql").unwrap();
        assert_eq!(item.monitoring.collect_rds_metrics, None);
        assert_eq!(item.monitoring.collect_bloat_metrics, None);
        assert_eq!(item.monitoring.extra.get("custom_threshold"), Some(&Value::from(5)));
        assert!(!item.monitoring.extra.contains_key("host"));
        assert_eq!(item.tls_ca, None);
        assert_eq!(item.host, "h");
    }

    #[test]
    fn test_aurora_reader_host_and_passthrough() {
        let emission = emit_offline(
            r"
_metadata: {generated_at: '2024-01-01T00:00:00Z'}
postgresql_databases:
  - name: cluster
    provider: aurora
    connection:
      cluster_endpoint: c.cluster-x.us-east-1.rds.amazonaws.com
      reader_endpoint: c.cluster-ro-x.us-east-1.rds.amazonaws.com
      database: orders
      sslmode: verify-full
    credentials: {password: p}
    owner: dba-team
",
        );
        assert!(!emission.document.passthrough.contains_key("_metadata"));
        let item = emission.document.item("cluster").unwrap();
        assert_eq!(
            item.reader_host.as_deref(),
            Some("c.cluster-ro-x.us-east-1.rds.amazonaws.com")
        );
        assert_eq!(item.database.as_deref(), Some("orders"));
        assert_eq!(item.sslmode.as_deref(), Some("verify-full"));
        assert_eq!(item.tls_verify_server_certificate, Some(true));
        assert_eq!(item.monitoring.monitor_readers, Some(true));
        assert_eq!(item.passthrough.get("owner"), Some(&Value::from("dba-team")));
    }

    #[test]
    fn test_masked_copy_hides_passwords() {
        let emission = emit_offline("mysql_databases:\n  - host: h\n    password: hunter2\n");
        let masked = emission.document.masked();
        let yaml = masked.render(OutputFormat::Yaml).unwrap();
        assert!(!yaml.contains("hunter2"));
        assert!(yaml.contains(REDACTED));
        assert_eq!(emission.document.item("h").unwrap().password.expose(), "hunter2");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let text = r"
mysql_databases:
  - {name: a, host: a, password: p, custom_labels: {z: '1', a: '2'}}
  - {name: b, host: b, password: p}
";
        let first = emit_offline(text).document.render(OutputFormat::Yaml).unwrap();
        let second = emit_offline(text).document.render(OutputFormat::Yaml).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_backend_names_in_user_data_are_emitted() {
        let emission = emit_offline(
            r"
source: aws_secrets_manager
databases:
  - name: literal
    type: mysql
    connection: {host: h}
    credentials: {password: env_var}
    labels: {origin: aws_ssm_parameter}
    note: env_var
",
        );
        assert!(emission.excluded.is_empty());
        assert!(emission.issues.is_empty());
        let item = emission.document.item("literal").unwrap();
        assert_eq!(item.password.expose(), "env_var");
        assert_eq!(
            item.custom_labels.get("origin").map(String::as_str),
            Some("aws_ssm_parameter")
        );
        assert_eq!(item.passthrough.get("note"), Some(&Value::from("env_var")));
        assert_eq!(
            emission.document.passthrough.get("source"),
            Some(&Value::from("aws_secrets_manager"))
        );
    }

    #[test]
    fn test_nested_source_key_excludes_only_that_item() {
        let emission = emit_offline(
            r"
credentials: {region: us-east-1}
databases:
  - name: leaky
    type: mysql
    connection: {host: a}
    credentials: {password: p}
    owner: {password_env: DB_PASS}
  - name: clean
    type: mysql
    connection: {host: b}
    credentials: {password: p}
",
        );
        let names: Vec<&str> = emission.document.items().map(|i| i.service_name.as_str()).collect();
        assert_eq!(names, vec!["clean"]);
        assert!(!emission.document.passthrough.contains_key("credentials"));

        assert_eq!(emission.excluded.len(), 1);
        assert_eq!(emission.excluded[0].name, "leaky");
        assert!(matches!(
            &emission.excluded[0].reason,
            ExclusionReason::OutputCheck { detail } if detail.contains("owner.password_env")
        ));
        assert_eq!(emission.issues.len(), 1);
        assert_eq!(emission.issues[0].entry_name, "leaky");
        assert_eq!(emission.issues[0].field, "output");
        assert!(emission.issues[0].is_error());
    }

    #[test]
    fn test_resolved_blank_username_fails_output_check_without_leaking_password() {
        let config = merged(
            r"
databases:
  - name: blank-user
    type: mysql
    connection: {host: a}
    credentials: {password_source: env_var, password_env: A_PASS}
  - name: ok
    type: mysql
    connection: {host: b}
    credentials: {password_source: env_var, password_env: B_PASS}
",
        );
        let credential = |entry: &str, username: &str| ResolvedCredential {
            username: username.to_string(),
            password: Secret::new("do-not-print"),
            provenance: CredentialProvenance {
                entry: entry.to_string(),
                source: SourceKind::EnvVar,
                reference: None,
                region: None,
            },
        };
        let resolution = Resolution {
            credentials: vec![credential("blank-user", ""), credential("ok", "newrelic")],
            failures: Vec::new(),
        };
        let report = Validator::new().unwrap().validate(&config, Some(&resolution));

        let emission = emit(&config, &report, Some(&resolution)).unwrap();

        assert_eq!(emission.document.len(), 1);
        assert!(emission.document.item("ok").is_some());
        let ExclusionReason::OutputCheck { detail } = &emission.excluded[0].reason else {
            panic!("expected an output check exclusion");
        };
        assert!(!detail.contains("do-not-print"));
        assert!(!emission.issues[0].message.contains("do-not-print"));
    }

    #[test]
    fn test_output_format_from_path() {
        assert_eq!(OutputFormat::from_path(Path::new("out.json")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_path(Path::new("out.yml")), OutputFormat::Yaml);
        assert_eq!(OutputFormat::from_path(Path::new("out")), OutputFormat::Yaml);
    }
}
