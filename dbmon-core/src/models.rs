//! In-memory schema shared by every pipeline stage.
//!
//! The normalizer produces these types from any supported input shape; all
//! later stages only ever see this representation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::credentials::Secret;
use crate::error::EntryError;

/// Username used when an entry does not name one.
pub const DEFAULT_USERNAME: &str = "newrelic";

/// Label that becomes the emitted `environment` field.
pub const ENVIRONMENT_LABEL: &str = "environment";

/// Database engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Mysql,
    Postgresql,
}

impl DatabaseType {
    /// All types in emission order
    pub const ALL: [Self; 2] = [Self::Mysql, Self::Postgresql];

    /// Port used when the connection omits one
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Mysql => 3306,
            Self::Postgresql => 5432,
        }
    }

    /// Name of the typed list carrying entries of this type
    pub const fn list_key(self) -> &'static str {
        match self {
            Self::Mysql => "mysql_databases",
            Self::Postgresql => "postgresql_databases",
        }
    }

    /// Lowercase identifier
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgresql => "postgresql",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(Self::Mysql),
            "postgresql" | "postgres" => Ok(Self::Postgresql),
            other => Err(EntryError::unsupported("type", other)),
        }
    }
}

/// Deployment shape of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Container,
    Ec2,
    Rds,
    Aurora,
}

impl Provider {
    /// Lowercase identifier
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Ec2 => "ec2",
            Self::Rds => "rds",
            Self::Aurora => "aurora",
        }
    }

    /// Managed providers are the ones with cloud-side metrics
    pub const fn is_managed(self) -> bool {
        matches!(self, Self::Rds | Self::Aurora)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container" => Ok(Self::Container),
            "ec2" => Ok(Self::Ec2),
            "rds" => Ok(Self::Rds),
            "aurora" => Ok(Self::Aurora),
            other => Err(EntryError::unsupported("provider", other)),
        }
    }
}

/// Self-managed host connection (container or ec2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConnection {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub ssl_mode: Option<String>,
}

/// Managed single-instance connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConnection {
    pub endpoint: String,
    pub port: u16,
    pub database: Option<String>,
    pub ssl_mode: Option<String>,
}

/// Managed cluster connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConnection {
    pub cluster_endpoint: String,
    pub reader_endpoint: Option<String>,
    pub port: u16,
    pub database: Option<String>,
    pub ssl_mode: Option<String>,
}

/// Connection details, keyed by provider.
///
/// The variant fixes which address fields exist, so a cluster endpoint on an
/// ec2 entry cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Container(HostConnection),
    Ec2(HostConnection),
    Rds(InstanceConnection),
    Aurora(ClusterConnection),
}

impl Connection {
    /// Provider implied by the variant
    pub const fn provider(&self) -> Provider {
        match self {
            Self::Container(_) => Provider::Container,
            Self::Ec2(_) => Provider::Ec2,
            Self::Rds(_) => Provider::Rds,
            Self::Aurora(_) => Provider::Aurora,
        }
    }

    /// Primary address the agent connects to
    pub fn host(&self) -> &str {
        match self {
            Self::Container(c) | Self::Ec2(c) => &c.host,
            Self::Rds(c) => &c.endpoint,
            Self::Aurora(c) => &c.cluster_endpoint,
        }
    }

    /// Dotted path of the primary address field, for diagnostics
    pub const fn host_field(&self) -> &'static str {
        match self {
            Self::Container(_) | Self::Ec2(_) => "connection.host",
            Self::Rds(_) => "connection.endpoint",
            Self::Aurora(_) => "connection.cluster_endpoint",
        }
    }

    /// Reader endpoint, only ever present on clusters
    pub fn reader_host(&self) -> Option<&str> {
        match self {
            Self::Aurora(c) => c.reader_endpoint.as_deref(),
            _ => None,
        }
    }

    pub const fn port(&self) -> u16 {
        match self {
            Self::Container(c) | Self::Ec2(c) => c.port,
            Self::Rds(c) => c.port,
            Self::Aurora(c) => c.port,
        }
    }

    pub fn database(&self) -> Option<&str> {
        match self {
            Self::Container(c) | Self::Ec2(c) => c.database.as_deref(),
            Self::Rds(c) => c.database.as_deref(),
            Self::Aurora(c) => c.database.as_deref(),
        }
    }

    pub fn ssl_mode(&self) -> Option<&str> {
        match self {
            Self::Container(c) | Self::Ec2(c) => c.ssl_mode.as_deref(),
            Self::Rds(c) => c.ssl_mode.as_deref(),
            Self::Aurora(c) => c.ssl_mode.as_deref(),
        }
    }
}

/// Credential backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Plain,
    EnvVar,
    AwsSecretsManager,
    AwsSsmParameter,
}

impl SourceKind {
    pub const ALL: [Self; 4] = [
        Self::Plain,
        Self::EnvVar,
        Self::AwsSecretsManager,
        Self::AwsSsmParameter,
    ];

    /// Identifier as written in `credentials.password_source`
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::EnvVar => "env_var",
            Self::AwsSecretsManager => "aws_secrets_manager",
            Self::AwsSsmParameter => "aws_ssm_parameter",
        }
    }

    /// Field that must accompany this source
    pub const fn companion_field(self) -> &'static str {
        match self {
            Self::Plain => "password",
            Self::EnvVar => "password_env",
            Self::AwsSecretsManager | Self::AwsSsmParameter => "password_key",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EntryError::unsupported("credentials.password_source", s))
    }
}

/// Declared password source with its companion data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordSource {
    Plain { password: Secret },
    EnvVar { variable: String },
    AwsSecretsManager { key: String, region: Option<String> },
    AwsSsmParameter { key: String, region: Option<String> },
}

impl PasswordSource {
    pub const fn kind(&self) -> SourceKind {
        match self {
            Self::Plain { .. } => SourceKind::Plain,
            Self::EnvVar { .. } => SourceKind::EnvVar,
            Self::AwsSecretsManager { .. } => SourceKind::AwsSecretsManager,
            Self::AwsSsmParameter { .. } => SourceKind::AwsSsmParameter,
        }
    }

    /// Lookup key for non-plain sources
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Plain { .. } => None,
            Self::EnvVar { variable } => Some(variable),
            Self::AwsSecretsManager { key, .. } | Self::AwsSsmParameter { key, .. } => Some(key),
        }
    }

    /// Region a secret-store lookup is pinned to
    pub fn region(&self) -> Option<&str> {
        match self {
            Self::AwsSecretsManager { region, .. } | Self::AwsSsmParameter { region, .. } => {
                region.as_deref()
            }
            _ => None,
        }
    }
}

/// Declared credentials of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSpec {
    pub username: String,
    pub source: PasswordSource,
}

fn fill<T: Clone>(slot: &mut Option<T>, fallback: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(fallback);
    }
}

/// Monitoring options. Unset fields are `None` until the merger fills them.
///
/// Keys this type does not know are kept in `extra` and emitted verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_metrics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collect_inventory: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_query_monitoring: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_metrics_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sql_query_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gather_query_samples: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_timeout: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collect_bloat_metrics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collect_db_lock_metrics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collect_rds_metrics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collect_aurora_metrics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_readers: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MonitoringOptions {
    /// Fills every unset field from `fallback`; set fields are never touched.
    pub fn merge_from(&mut self, fallback: &Self) {
        fill(&mut self.extended_metrics, &fallback.extended_metrics);
        fill(&mut self.collect_inventory, &fallback.collect_inventory);
        fill(&mut self.interval, &fallback.interval);
        fill(&mut self.enable_query_monitoring, &fallback.enable_query_monitoring);
        fill(&mut self.query_metrics_interval, &fallback.query_metrics_interval);
        fill(&mut self.max_sql_query_length, &fallback.max_sql_query_length);
        fill(&mut self.gather_query_samples, &fallback.gather_query_samples);
        fill(&mut self.query_timeout, &fallback.query_timeout);
        fill(&mut self.batch_limit, &fallback.batch_limit);
        fill(&mut self.collect_bloat_metrics, &fallback.collect_bloat_metrics);
        fill(&mut self.collect_db_lock_metrics, &fallback.collect_db_lock_metrics);
        fill(&mut self.collect_rds_metrics, &fallback.collect_rds_metrics);
        fill(&mut self.collect_aurora_metrics, &fallback.collect_aurora_metrics);
        fill(&mut self.monitor_readers, &fallback.monitor_readers);
        for (key, value) in &fallback.extra {
            self.extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// TLS options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_server_certificate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_bundle_file: Option<String>,
}

impl TlsOptions {
    pub fn merge_from(&mut self, fallback: &Self) {
        fill(&mut self.enabled, &fallback.enabled);
        fill(&mut self.verify_server_certificate, &fallback.verify_server_certificate);
        fill(&mut self.ca_bundle_file, &fallback.ca_bundle_file);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }
}

/// Field that was present in the input but deliberately not used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoredField {
    pub field: String,
    pub reason: String,
}

/// Which input shape an entry was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryShape {
    Legacy,
    Enhanced,
}

/// One database to monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseEntry {
    pub name: String,
    pub enabled: bool,
    pub db_type: DatabaseType,
    pub connection: Connection,
    pub credentials: CredentialSpec,
    pub monitoring: MonitoringOptions,
    pub tls: TlsOptions,
    pub labels: BTreeMap<String, String>,
    /// Unknown entry-level keys, re-emitted on the flat item
    pub passthrough: BTreeMap<String, serde_json::Value>,
    pub ignored_fields: Vec<IgnoredField>,
    pub shape: EntryShape,
}

impl DatabaseEntry {
    pub const fn provider(&self) -> Provider {
        self.connection.provider()
    }

    /// Label mapped to the emitted `environment` field
    pub fn environment(&self) -> &str {
        self.labels
            .get(ENVIRONMENT_LABEL)
            .map_or("production", String::as_str)
    }
}

/// Entry that could not be constructed from its input item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEntry {
    /// Best-effort name; falls back to `<list>[<index>]`
    pub name: String,
    /// List the item came from
    pub list: String,
    pub index: usize,
    pub error: EntryError,
}

/// Document-level fallbacks applied after provider defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalDefaults {
    /// Collection interval, mapped to `monitoring.interval`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Query timeout in seconds, mapped to `monitoring.query_timeout`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    /// Mapped to `monitoring.batch_limit`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_limit: Option<i64>,
    pub monitoring: MonitoringOptions,
    pub tls: TlsOptions,
}

impl GlobalDefaults {
    /// Baseline every merged entry ends up with when nothing else is set.
    pub fn builtin() -> Self {
        Self {
            interval: Some("30s".to_string()),
            timeout: Some(30),
            batch_limit: Some(100),
            monitoring: MonitoringOptions {
                extended_metrics: Some(true),
                enable_query_monitoring: Some(true),
                query_metrics_interval: Some("60s".to_string()),
                max_sql_query_length: Some(1000),
                gather_query_samples: Some(true),
                ..MonitoringOptions::default()
            },
            tls: TlsOptions {
                enabled: Some(false),
                ..TlsOptions::default()
            },
        }
    }

    pub fn merge_from(&mut self, fallback: &Self) {
        fill(&mut self.interval, &fallback.interval);
        fill(&mut self.timeout, &fallback.timeout);
        fill(&mut self.batch_limit, &fallback.batch_limit);
        self.monitoring.merge_from(&fallback.monitoring);
        self.tls.merge_from(&fallback.tls);
    }

    /// Monitoring layer this block contributes for one entry type.
    ///
    /// Values in the nested `monitoring` block win over the scalar shorthands.
    pub fn monitoring_for(&self, db_type: DatabaseType) -> MonitoringOptions {
        let mut monitoring = self.monitoring.clone();
        fill(&mut monitoring.interval, &self.interval);
        fill(&mut monitoring.query_timeout, &self.timeout);
        fill(&mut monitoring.batch_limit, &self.batch_limit);
        if db_type == DatabaseType::Postgresql {
            fill(&mut monitoring.collect_bloat_metrics, &Some(true));
            fill(&mut monitoring.collect_db_lock_metrics, &Some(true));
        }
        monitoring
    }
}

/// Fallback `monitoring`/`tls` for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderDefaults {
    pub monitoring: MonitoringOptions,
    pub tls: TlsOptions,
}

impl ProviderDefaults {
    /// Built-in values for managed providers.
    pub fn builtin(provider: Provider) -> Self {
        match provider {
            Provider::Rds => Self {
                monitoring: MonitoringOptions {
                    collect_rds_metrics: Some(true),
                    ..MonitoringOptions::default()
                },
                tls: TlsOptions {
                    enabled: Some(true),
                    ..TlsOptions::default()
                },
            },
            Provider::Aurora => Self {
                monitoring: MonitoringOptions {
                    monitor_readers: Some(true),
                    collect_aurora_metrics: Some(true),
                    ..MonitoringOptions::default()
                },
                tls: TlsOptions {
                    enabled: Some(true),
                    verify_server_certificate: Some(true),
                    ..TlsOptions::default()
                },
            },
            Provider::Container | Provider::Ec2 => Self::default(),
        }
    }

    pub fn merge_from(&mut self, fallback: &Self) {
        self.monitoring.merge_from(&fallback.monitoring);
        self.tls.merge_from(&fallback.tls);
    }
}

/// Tag filter applied when none is configured.
pub const DEFAULT_TAG_FILTER: (&str, &str) = ("monitor", "newrelic");

/// Parses a `key=value` tag filter. Surrounding whitespace is trimmed and
/// the value may be empty.
///
/// # Errors
/// Returns an invalid-field error when the separator is missing or the key
/// is empty.
pub fn parse_tag_filter(s: &str) -> Result<(String, String), EntryError> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(EntryError::invalid(
            "discovery.tag_filters",
            format!("'{}' is not in key=value form", s),
        )),
    }
}

/// `discovery` block of enhanced documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Default: true
    pub enabled: bool,
    /// Regions to scan; empty scans every region given
    pub regions: Vec<String>,
    /// Every filter must match a resource's tags
    pub tag_filters: BTreeMap<String, String>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            regions: Vec::new(),
            tag_filters: BTreeMap::new(),
        }
    }
}

impl DiscoverySettings {
    pub fn scans_region(&self, region: &str) -> bool {
        self.regions.is_empty() || self.regions.iter().any(|r| r == region)
    }

    /// Configured filters, or the default filter when none are set
    pub fn effective_filters(&self) -> BTreeMap<String, String> {
        if self.tag_filters.is_empty() {
            let (key, value) = DEFAULT_TAG_FILTER;
            BTreeMap::from([(key.to_string(), value.to_string())])
        } else {
            self.tag_filters.clone()
        }
    }
}

/// Parsed root of one or more input documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitoringConfig {
    /// Constructed entries in input order
    pub entries: Vec<DatabaseEntry>,
    /// Items that could not be constructed, in input order
    pub rejected: Vec<RejectedEntry>,
    /// Document-supplied global defaults (built-ins are applied by the merger)
    pub global_defaults: GlobalDefaults,
    /// Document-supplied provider defaults
    pub provider_defaults: BTreeMap<Provider, ProviderDefaults>,
    pub discovery: Option<DiscoverySettings>,
    /// Unknown top-level keys
    pub passthrough: BTreeMap<String, serde_json::Value>,
}

impl MonitoringConfig {
    pub fn enabled_entries(&self) -> impl Iterator<Item = &DatabaseEntry> {
        self.entries.iter().filter(|entry| entry.enabled)
    }

    pub fn entry(&self, name: &str) -> Option<&DatabaseEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}
