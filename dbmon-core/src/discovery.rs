//! Conversion of cloud inventory into enhanced input documents.
//!
//! Reads the JSON printed by `aws rds describe-db-instances` and
//! `aws rds describe-db-clusters`, keeps the resources whose tags match every
//! filter, and maps them to enhanced entries under the typed lists. The
//! result carries a `_metadata` block and normalizes like any other input.
//!
//! Nothing here talks to AWS.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::emit::OutputFormat;
use crate::error::{DbMonError, Result};
use crate::models::{
    DEFAULT_USERNAME, DatabaseType, DiscoverySettings, ENVIRONMENT_LABEL, MonitoringOptions,
    Provider, SourceKind, TlsOptions,
};

/// Tags that are consumed by discovery instead of copied into labels.
const RESERVED_TAGS: &[&str] = &["Environment", "env", "monitor"];

/// Environment label used when a resource carries no environment tag.
const UNKNOWN: &str = "unknown";

/// `Key`/`Value` pair of an RDS tag list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagRecord {
    pub key: String,
    pub value: String,
}

/// `Endpoint` of an RDS instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointRecord {
    pub address: String,
    pub port: Option<u16>,
}

/// One element of `DBInstances`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbInstanceRecord {
    #[serde(rename = "DBInstanceIdentifier")]
    pub identifier: String,
    pub engine: String,
    pub engine_version: Option<String>,
    #[serde(rename = "DBInstanceStatus")]
    pub status: String,
    pub endpoint: Option<EndpointRecord>,
    pub master_username: Option<String>,
    #[serde(rename = "DBInstanceClass")]
    pub instance_class: Option<String>,
    #[serde(rename = "MultiAZ", default)]
    pub multi_az: bool,
    #[serde(default)]
    pub tag_list: Vec<TagRecord>,
}

/// One element of `DBClusters`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbClusterRecord {
    #[serde(rename = "DBClusterIdentifier")]
    pub identifier: String,
    pub engine: String,
    pub engine_version: Option<String>,
    pub status: String,
    pub endpoint: Option<String>,
    pub reader_endpoint: Option<String>,
    pub port: Option<u16>,
    pub master_username: Option<String>,
    #[serde(default)]
    pub tag_list: Vec<TagRecord>,
}

#[derive(Deserialize)]
struct DescribeDbInstances {
    #[serde(rename = "DBInstances", default)]
    db_instances: Vec<DbInstanceRecord>,
}

#[derive(Deserialize)]
struct DescribeDbClusters {
    #[serde(rename = "DBClusters", default)]
    db_clusters: Vec<DbClusterRecord>,
}

/// Parses `aws rds describe-db-instances` output.
///
/// # Errors
/// Returns a schema error if the JSON does not have the expected shape.
pub fn parse_instances(json: &str) -> Result<Vec<DbInstanceRecord>> {
    serde_json::from_str::<DescribeDbInstances>(json)
        .map(|output| output.db_instances)
        .map_err(|e| DbMonError::schema(format!("invalid describe-db-instances output: {}", e)))
}

/// Parses `aws rds describe-db-clusters` output.
///
/// # Errors
/// Returns a schema error if the JSON does not have the expected shape.
pub fn parse_clusters(json: &str) -> Result<Vec<DbClusterRecord>> {
    serde_json::from_str::<DescribeDbClusters>(json)
        .map(|output| output.db_clusters)
        .map_err(|e| DbMonError::schema(format!("invalid describe-db-clusters output: {}", e)))
}

/// Everything discovered in one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionInventory {
    pub region: String,
    pub instances: Vec<DbInstanceRecord>,
    pub clusters: Vec<DbClusterRecord>,
}

/// Maps an RDS engine name to a database type.
pub fn engine_type(engine: &str) -> Option<DatabaseType> {
    match engine {
        "mysql" | "mariadb" | "aurora" | "aurora-mysql" => Some(DatabaseType::Mysql),
        "postgres" | "aurora-postgresql" => Some(DatabaseType::Postgresql),
        _ => None,
    }
}

/// Secret id the monitoring password is expected under.
pub fn secret_key(provider: Provider, region: &str, identifier: &str) -> String {
    format!("/{}/{}/{}/newrelic", provider, region, identifier)
}

/// True when every filter is present in `tags` with the same value.
pub fn matches_filters(tags: &BTreeMap<String, String>, filters: &BTreeMap<String, String>) -> bool {
    filters
        .iter()
        .all(|(key, value)| tags.get(key) == Some(value))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredConnection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reader_endpoint: Option<String>,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredCredentials {
    pub username: String,
    pub password_source: SourceKind,
    pub password_key: String,
    pub region: String,
}

/// Enhanced entry produced for one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredEntry {
    pub name: String,
    pub enabled: bool,
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    pub provider: Provider,
    pub connection: DiscoveredConnection,
    pub credentials: DiscoveredCredentials,
    pub monitoring: MonitoringOptions,
    pub tls: TlsOptions,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryMetadata {
    pub generated_at: String,
    pub regions_scanned: Vec<String>,
    pub tag_filters: BTreeMap<String, String>,
}

/// Discovery output in the enhanced input shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryDocument {
    pub mysql_databases: Vec<DiscoveredEntry>,
    pub postgresql_databases: Vec<DiscoveredEntry>,
    #[serde(rename = "_metadata")]
    pub metadata: DiscoveryMetadata,
}

impl DiscoveryDocument {
    /// Document as a JSON value, ready for the normalizer.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|source| DbMonError::Serialization {
            context: "discovery document to JSON value".to_string(),
            source,
        })
    }

    /// Renders the document as YAML or pretty JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Yaml => serde_yaml::to_string(self).map_err(|source| DbMonError::Yaml {
                context: "discovery document to YAML".to_string(),
                source,
            }),
            OutputFormat::Json => serde_json::to_string_pretty(self)
                .map(|mut text| {
                    text.push('\n');
                    text
                })
                .map_err(|source| DbMonError::Serialization {
                    context: "discovery document to JSON".to_string(),
                    source,
                }),
        }
    }
}

/// Resource that matched the filters but could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedResource {
    pub identifier: String,
    pub region: String,
    pub reason: String,
}

/// Result of one discovery pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryOutput {
    pub document: DiscoveryDocument,
    pub skipped: Vec<SkippedResource>,
}

fn tag_map(tags: &[TagRecord]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|tag| (tag.key.clone(), tag.value.clone()))
        .collect()
}

/// Labels shared by instances and clusters, plus every non-reserved tag.
fn base_labels(
    tags: &BTreeMap<String, String>,
    region: &str,
    engine: &str,
    engine_version: Option<&str>,
) -> BTreeMap<String, String> {
    let environment = tags
        .get("Environment")
        .or_else(|| tags.get("env"))
        .map_or(UNKNOWN, String::as_str);

    let mut labels = BTreeMap::from([
        (ENVIRONMENT_LABEL.to_string(), environment.to_string()),
        ("region".to_string(), region.to_string()),
        ("engine".to_string(), engine.to_string()),
        (
            "engine_version".to_string(),
            engine_version.unwrap_or(UNKNOWN).to_string(),
        ),
    ]);
    for (key, value) in tags {
        if !RESERVED_TAGS.contains(&key.as_str()) {
            labels.insert(key.clone(), value.clone());
        }
    }
    labels
}

fn instance_entry(
    record: &DbInstanceRecord,
    region: &str,
    db_type: DatabaseType,
    tags: &BTreeMap<String, String>,
) -> std::result::Result<DiscoveredEntry, String> {
    let endpoint = record
        .endpoint
        .as_ref()
        .ok_or_else(|| format!("instance has no endpoint (status {})", record.status))?;

    let mut labels = base_labels(tags, region, &record.engine, record.engine_version.as_deref());
    labels
        .entry("instance_class".to_string())
        .or_insert_with(|| record.instance_class.clone().unwrap_or_else(|| UNKNOWN.to_string()));
    labels
        .entry("multi_az".to_string())
        .or_insert_with(|| record.multi_az.to_string());

    Ok(DiscoveredEntry {
        name: record.identifier.clone(),
        enabled: record.status == "available",
        db_type,
        provider: Provider::Rds,
        connection: DiscoveredConnection {
            endpoint: Some(endpoint.address.clone()),
            cluster_endpoint: None,
            reader_endpoint: None,
            port: endpoint.port.unwrap_or(db_type.default_port()),
        },
        credentials: DiscoveredCredentials {
            username: record
                .master_username
                .clone()
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password_source: SourceKind::AwsSecretsManager,
            password_key: secret_key(Provider::Rds, region, &record.identifier),
            region: region.to_string(),
        },
        monitoring: MonitoringOptions {
            collect_inventory: Some(true),
            extended_metrics: Some(true),
            collect_rds_metrics: Some(true),
            enable_query_monitoring: Some(true),
            ..MonitoringOptions::default()
        },
        tls: TlsOptions {
            enabled: Some(true),
            ..TlsOptions::default()
        },
        labels,
    })
}

fn cluster_entry(
    record: &DbClusterRecord,
    region: &str,
    db_type: DatabaseType,
    tags: &BTreeMap<String, String>,
) -> std::result::Result<DiscoveredEntry, String> {
    let endpoint = record
        .endpoint
        .clone()
        .ok_or_else(|| format!("cluster has no endpoint (status {})", record.status))?;

    let mut labels = base_labels(tags, region, &record.engine, record.engine_version.as_deref());
    labels
        .entry("cluster_type".to_string())
        .or_insert_with(|| "aurora".to_string());
    labels
        .entry("ha_enabled".to_string())
        .or_insert_with(|| "true".to_string());

    Ok(DiscoveredEntry {
        name: record.identifier.clone(),
        enabled: record.status == "available",
        db_type,
        provider: Provider::Aurora,
        connection: DiscoveredConnection {
            endpoint: None,
            cluster_endpoint: Some(endpoint),
            reader_endpoint: record.reader_endpoint.clone(),
            port: record.port.unwrap_or(db_type.default_port()),
        },
        credentials: DiscoveredCredentials {
            username: record
                .master_username
                .clone()
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password_source: SourceKind::AwsSecretsManager,
            password_key: secret_key(Provider::Aurora, region, &record.identifier),
            region: region.to_string(),
        },
        monitoring: MonitoringOptions {
            collect_inventory: Some(true),
            extended_metrics: Some(true),
            collect_aurora_metrics: Some(true),
            monitor_readers: Some(true),
            enable_query_monitoring: Some(true),
            ..MonitoringOptions::default()
        },
        tls: TlsOptions {
            enabled: Some(true),
            verify_server_certificate: Some(true),
            ..TlsOptions::default()
        },
        labels,
    })
}

/// Maps every matching resource of `inventories` into a discovery document.
///
/// Resources whose tags miss a filter are dropped silently; resources that
/// match but cannot be mapped (unsupported engine, no endpoint yet) are
/// listed in [`DiscoveryOutput::skipped`].
pub fn discover(
    inventories: &[RegionInventory],
    filters: &BTreeMap<String, String>,
    generated_at: DateTime<Utc>,
) -> DiscoveryOutput {
    let mut mysql_databases = Vec::new();
    let mut postgresql_databases = Vec::new();
    let mut skipped = Vec::new();

    let mut place = |identifier: &str,
                     region: &str,
                     result: std::result::Result<DiscoveredEntry, String>| {
        match result {
            Ok(entry) => match entry.db_type {
                DatabaseType::Mysql => mysql_databases.push(entry),
                DatabaseType::Postgresql => postgresql_databases.push(entry),
            },
            Err(reason) => {
                debug!("Skipping '{}' in {}: {}", identifier, region, reason);
                skipped.push(SkippedResource {
                    identifier: identifier.to_string(),
                    region: region.to_string(),
                    reason,
                });
            }
        }
    };

    for inventory in inventories {
        let region = inventory.region.as_str();
        for record in &inventory.instances {
            let tags = tag_map(&record.tag_list);
            if !matches_filters(&tags, filters) {
                continue;
            }
            let result = engine_type(&record.engine)
                .ok_or_else(|| format!("unsupported engine '{}'", record.engine))
                .and_then(|db_type| instance_entry(record, region, db_type, &tags));
            place(&record.identifier, region, result);
        }
        for record in &inventory.clusters {
            let tags = tag_map(&record.tag_list);
            if !matches_filters(&tags, filters) {
                continue;
            }
            let result = engine_type(&record.engine)
                .ok_or_else(|| format!("unsupported engine '{}'", record.engine))
                .and_then(|db_type| cluster_entry(record, region, db_type, &tags));
            place(&record.identifier, region, result);
        }
    }

    info!(
        "Discovered {} mysql and {} postgresql databases across {} regions",
        mysql_databases.len(),
        postgresql_databases.len(),
        inventories.len()
    );

    DiscoveryOutput {
        document: DiscoveryDocument {
            mysql_databases,
            postgresql_databases,
            metadata: DiscoveryMetadata {
                generated_at: generated_at.to_rfc3339(),
                regions_scanned: inventories
                    .iter()
                    .map(|inventory| inventory.region.clone())
                    .collect(),
                tag_filters: filters.clone(),
            },
        },
        skipped,
    }
}

/// Runs [`discover`] as scoped by a `discovery` settings block.
///
/// Inventories from regions outside `settings.regions` are not scanned and
/// the settings' effective tag filters apply. `settings.enabled` is left to
/// the caller.
pub fn discover_with_settings(
    inventories: &[RegionInventory],
    settings: &DiscoverySettings,
    generated_at: DateTime<Utc>,
) -> DiscoveryOutput {
    let scoped: Vec<RegionInventory> = inventories
        .iter()
        .filter(|inventory| {
            let scanned = settings.scans_region(&inventory.region);
            if !scanned {
                info!(
                    "Not scanning {}: outside the configured regions {:?}",
                    inventory.region, settings.regions
                );
            }
            scanned
        })
        .cloned()
        .collect();
    discover(&scoped, &settings.effective_filters(), generated_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Connection, DEFAULT_TAG_FILTER, DiscoverySettings, PasswordSource};
    use crate::normalize::normalize;
    use chrono::TimeZone;

    const INSTANCES: &str = r#"{
      "DBInstances": [
        {
          "DBInstanceIdentifier": "orders-db",
          "Engine": "mysql",
          "EngineVersion": "8.0.35",
          "DBInstanceStatus": "available",
          "Endpoint": {"Address": "orders-db.abc123.us-east-1.rds.amazonaws.com", "Port": 3306},
          "MasterUsername": "admin",
          "DBInstanceClass": "db.r6g.large",
          "MultiAZ": true,
          "TagList": [
            {"Key": "monitor", "Value": "newrelic"},
            {"Key": "Environment", "Value": "prod"},
            {"Key": "team", "Value": "payments"}
          ]
        },
        {
          "DBInstanceIdentifier": "scratch",
          "Engine": "postgres",
          "DBInstanceStatus": "available",
          "Endpoint": {"Address": "scratch.abc123.us-east-1.rds.amazonaws.com", "Port": 5432},
          "TagList": []
        },
        {
          "DBInstanceIdentifier": "legacy-oracle",
          "Engine": "oracle-ee",
          "DBInstanceStatus": "available",
          "Endpoint": {"Address": "oracle.abc123.us-east-1.rds.amazonaws.com", "Port": 1521},
          "TagList": [{"Key": "monitor", "Value": "newrelic"}]
        }
      ]
    }"#;

    const CLUSTERS: &str = r#"{
      "DBClusters": [
        {
          "DBClusterIdentifier": "analytics",
          "Engine": "aurora-postgresql",
          "Status": "stopped",
          "Endpoint": "analytics.cluster-xyz.us-east-1.rds.amazonaws.com",
          "ReaderEndpoint": "analytics.cluster-ro-xyz.us-east-1.rds.amazonaws.com",
          "Port": 5432,
          "TagList": [{"Key": "monitor", "Value": "newrelic"}, {"Key": "env", "Value": "staging"}]
        }
      ]
    }"#;

    fn default_filters() -> BTreeMap<String, String> {
        DiscoverySettings::default().effective_filters()
    }

    fn inventory() -> Vec<RegionInventory> {
        vec![RegionInventory {
            region: "us-east-1".to_string(),
            instances: parse_instances(INSTANCES).unwrap(),
            clusters: parse_clusters(CLUSTERS).unwrap(),
        }]
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_engine_mapping() {
        assert_eq!(engine_type("aurora-mysql"), Some(DatabaseType::Mysql));
        assert_eq!(engine_type("mariadb"), Some(DatabaseType::Mysql));
        assert_eq!(engine_type("aurora-postgresql"), Some(DatabaseType::Postgresql));
        assert_eq!(engine_type("sqlserver-ex"), None);
    }

    #[test]
    fn test_tag_filters_must_all_match() {
        let tags = BTreeMap::from([
            ("monitor".to_string(), "newrelic".to_string()),
            ("team".to_string(), "dba".to_string()),
        ]);
        let mut filters = default_filters();
        assert!(matches_filters(&tags, &filters));
        filters.insert("team".to_string(), "payments".to_string());
        assert!(!matches_filters(&tags, &filters));
        assert!(matches_filters(&tags, &BTreeMap::new()));
    }

    #[test]
    fn test_instance_mapping() {
        let output = discover(&inventory(), &default_filters(), generated_at());
        let entry = &output.document.mysql_databases[0];

        assert_eq!(entry.name, "orders-db");
        assert!(entry.enabled);
        assert_eq!(entry.provider, Provider::Rds);
        assert_eq!(entry.credentials.username, "admin");
        assert_eq!(entry.credentials.password_key, "/rds/us-east-1/orders-db/newrelic");
        assert_eq!(entry.labels.get("environment").map(String::as_str), Some("prod"));
        assert_eq!(entry.labels.get("team").map(String::as_str), Some("payments"));
        assert_eq!(entry.labels.get("multi_az").map(String::as_str), Some("true"));
        assert!(!entry.labels.contains_key("monitor"));
        assert!(!entry.labels.contains_key("Environment"));
    }

    #[test]
    fn test_cluster_mapping_and_skips() {
        let output = discover(&inventory(), &default_filters(), generated_at());

        let cluster = &output.document.postgresql_databases[0];
        assert_eq!(cluster.name, "analytics");
        assert!(!cluster.enabled);
        assert_eq!(cluster.provider, Provider::Aurora);
        assert_eq!(cluster.credentials.username, DEFAULT_USERNAME);
        assert_eq!(cluster.labels.get("environment").map(String::as_str), Some("staging"));

        // "scratch" has no monitor tag, the oracle instance has no mapping
        assert_eq!(output.document.postgresql_databases.len(), 1);
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].identifier, "legacy-oracle");
        assert!(output.skipped[0].reason.contains("oracle-ee"));
    }

    #[test]
    fn test_metadata_block() {
        let output = discover(&inventory(), &default_filters(), generated_at());
        let value = output.document.to_value().unwrap();
        let (key, filter) = DEFAULT_TAG_FILTER;
        assert_eq!(value["_metadata"]["generated_at"], "2024-05-01T12:00:00+00:00");
        assert_eq!(value["_metadata"]["regions_scanned"][0], "us-east-1");
        assert_eq!(value["_metadata"]["tag_filters"][key], filter);
    }

    #[test]
    fn test_output_normalizes_as_enhanced_entries() {
        let output = discover(&inventory(), &default_filters(), generated_at());
        let config = normalize(&[output.document.to_value().unwrap()]).unwrap();

        assert!(config.rejected.is_empty());
        assert!(config.entries.iter().all(|entry| entry.ignored_fields.is_empty()));
        let cluster = config.entry("analytics").unwrap();
        assert!(matches!(
            &cluster.connection,
            Connection::Aurora(c) if c.reader_endpoint.is_some()
        ));
        assert!(matches!(
            &cluster.credentials.source,
            PasswordSource::AwsSecretsManager { region: Some(region), .. } if region == "us-east-1"
        ));
        assert!(config.passthrough.contains_key("_metadata"));
    }

    #[test]
    fn test_settings_block_scopes_regions_and_filters() {
        let document = crate::normalize::parse_document(
            r"
discovery:
  regions: [us-east-1]
  tag_filters: {team: payments}
",
            crate::normalize::InputFormat::Yaml,
        )
        .unwrap();
        let settings = normalize(&[document]).unwrap().discovery.unwrap();
        let mut inventories = inventory();
        inventories.push(RegionInventory {
            region: "eu-west-1".to_string(),
            instances: parse_instances(INSTANCES).unwrap(),
            clusters: Vec::new(),
        });

        let output = discover_with_settings(&inventories, &settings, generated_at());

        let names: Vec<&str> = output
            .document
            .mysql_databases
            .iter()
            .map(|entry| entry.name.as_str())
            .collect();
        assert_eq!(names, vec!["orders-db"]);
        assert!(output.document.postgresql_databases.is_empty());
        assert_eq!(output.document.metadata.regions_scanned, vec!["us-east-1"]);
        assert_eq!(
            output.document.metadata.tag_filters,
            BTreeMap::from([("team".to_string(), "payments".to_string())])
        );
    }

    #[test]
    fn test_malformed_inventory_is_schema_error() {
        let err = parse_instances("{\"DBInstances\": [{\"Engine\": 3}]}").unwrap_err();
        assert!(err.is_schema_failure());
    }
}
