//! Input normalization.
//!
//! Parses legacy flat lists, enhanced nested entries, and discovery output
//! into a single [`MonitoringConfig`]. Entries that cannot be constructed are
//! kept as [`RejectedEntry`] records so the validator can report them; only a
//! malformed document or a duplicate name aborts the run.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::credentials::Secret;
use crate::error::{DbMonError, EntryError, Result};
use crate::models::{
    ClusterConnection, Connection, CredentialSpec, DEFAULT_USERNAME, DatabaseEntry, DatabaseType,
    DiscoverySettings, ENVIRONMENT_LABEL, EntryShape, GlobalDefaults, HostConnection, IgnoredField,
    InstanceConnection, MonitoringConfig, MonitoringOptions, PasswordSource, Provider,
    ProviderDefaults, RejectedEntry, SourceKind, TlsOptions,
};

/// Keys whose presence marks an item as enhanced-shape.
const ENHANCED_MARKERS: [&str; 3] = ["connection", "credentials", "provider"];

/// Monitoring keys a legacy item may carry at its top level.
const LEGACY_MONITORING_KEYS: [&str; 14] = [
    "extended_metrics",
    "collect_inventory",
    "interval",
    "enable_query_monitoring",
    "query_metrics_interval",
    "max_sql_query_length",
    "gather_query_samples",
    "query_timeout",
    "batch_limit",
    "collect_bloat_metrics",
    "collect_db_lock_metrics",
    "collect_rds_metrics",
    "collect_aurora_metrics",
    "monitor_readers",
];

const TLS_KEYS: [&str; 3] = ["enabled", "verify_server_certificate", "ca_bundle_file"];

/// Serialization format of an input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Yaml,
    Json,
}

impl InputFormat {
    /// Picks the format from the file extension, falling back to content
    /// sniffing for unknown extensions.
    pub fn detect(path: &Path, content: &str) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
                Self::Yaml
            }
            _ if content.trim_start().starts_with('{') => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Parses document text into a generic tree.
///
/// # Errors
/// Returns a schema error if the text is not valid YAML/JSON.
pub fn parse_document(content: &str, format: InputFormat) -> Result<Value> {
    match format {
        InputFormat::Json => serde_json::from_str(content)
            .map_err(|e| DbMonError::schema(format!("invalid JSON: {}", e))),
        InputFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| DbMonError::schema(format!("invalid YAML: {}", e))),
    }
}

/// Reads and parses one input file.
///
/// # Errors
/// Returns an I/O error if the file cannot be read, or a schema error naming
/// the file if it cannot be parsed.
pub async fn read_document(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DbMonError::io(format!("Failed to read {}", path.display()), e))?;
    let format = InputFormat::detect(path, &content);
    debug!("Parsing {} as {:?}", path.display(), format);
    parse_document(&content, format).map_err(|e| match e {
        DbMonError::Schema { message } => {
            DbMonError::schema(format!("{}: {}", path.display(), message))
        }
        other => other,
    })
}

/// Reads every input file in order.
pub async fn read_documents(paths: &[PathBuf]) -> Result<Vec<Value>> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        documents.push(read_document(path).await?);
    }
    Ok(documents)
}

/// Normalizes parsed documents into one configuration.
///
/// Documents are processed in order. Later documents override earlier
/// defaults per field; entries accumulate, and a name seen twice anywhere is
/// fatal.
///
/// # Errors
/// Returns a schema error for a non-mapping root, a malformed defaults or
/// discovery block, a non-list entry collection, or a duplicate name.
pub fn normalize(documents: &[Value]) -> Result<MonitoringConfig> {
    let mut config = MonitoringConfig::default();
    let mut seen = HashSet::new();

    for (position, document) in documents.iter().enumerate() {
        let root = match document {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(DbMonError::schema(format!(
                    "document {} root must be a mapping, found {}",
                    position + 1,
                    describe(other)
                )));
            }
        };
        normalize_document(root, &mut config, &mut seen)?;
    }

    info!(
        "Normalized {} entries ({} rejected) from {} document(s)",
        config.entries.len(),
        config.rejected.len(),
        documents.len()
    );
    Ok(config)
}

#[derive(Debug, Clone, Copy)]
struct EntryList {
    key: &'static str,
    db_type: Option<DatabaseType>,
}

const ENTRY_LISTS: [EntryList; 3] = [
    EntryList {
        key: "databases",
        db_type: None,
    },
    EntryList {
        key: "mysql_databases",
        db_type: Some(DatabaseType::Mysql),
    },
    EntryList {
        key: "postgresql_databases",
        db_type: Some(DatabaseType::Postgresql),
    },
];

fn normalize_document(
    mut root: Map<String, Value>,
    config: &mut MonitoringConfig,
    seen: &mut HashSet<String>,
) -> Result<()> {
    if let Some(value) = root.remove("global_defaults") {
        let mut defaults: GlobalDefaults = section(value, "global_defaults")?;
        defaults.merge_from(&config.global_defaults);
        config.global_defaults = defaults;
    }

    if let Some(value) = root.remove("provider_defaults") {
        let by_name: BTreeMap<String, Value> = section(value, "provider_defaults")?;
        for (name, value) in by_name {
            let provider = name.parse::<Provider>().map_err(|e| {
                DbMonError::schema(format!("invalid provider_defaults: {}", e))
            })?;
            let mut defaults: ProviderDefaults =
                section(value, &format!("provider_defaults.{}", name))?;
            if let Some(earlier) = config.provider_defaults.get(&provider) {
                defaults.merge_from(earlier);
            }
            config.provider_defaults.insert(provider, defaults);
        }
    }

    if let Some(value) = root.remove("discovery") {
        let settings: DiscoverySettings = section(value, "discovery")?;
        config.discovery = Some(settings);
    }

    for list in ENTRY_LISTS {
        match root.remove(list.key) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for (index, item) in items.into_iter().enumerate() {
                    normalize_item(item, list, index, config, seen)?;
                }
            }
            Some(other) => {
                return Err(DbMonError::schema(format!(
                    "{} must be a list, found {}",
                    list.key,
                    describe(&other)
                )));
            }
        }
    }

    // Later documents win for repeated top-level keys
    config.passthrough.extend(root);
    Ok(())
}

fn section<T: DeserializeOwned + Default>(value: Value, key: &str) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(|e| DbMonError::schema(format!("invalid {}: {}", key, e)))
}

fn normalize_item(
    item: Value,
    list: EntryList,
    index: usize,
    config: &mut MonitoringConfig,
    seen: &mut HashSet<String>,
) -> Result<()> {
    let placeholder = || format!("{}[{}]", list.key, index);

    let map = match item {
        Value::Object(map) => map,
        other => {
            let error = EntryError::invalid(
                placeholder(),
                format!("expected a mapping, found {}", describe(&other)),
            );
            warn!("Rejected {}: {}", placeholder(), error);
            config.rejected.push(RejectedEntry {
                name: placeholder(),
                list: list.key.to_string(),
                index,
                error,
            });
            return Ok(());
        }
    };

    let shape = if ENHANCED_MARKERS.iter().any(|key| map.contains_key(*key)) {
        EntryShape::Enhanced
    } else {
        EntryShape::Legacy
    };
    let name = item_name(&map, shape);

    if let Some(name) = &name {
        if !seen.insert(name.clone()) {
            return Err(DbMonError::duplicate_name(name));
        }
    }

    let built = match shape {
        EntryShape::Legacy => build_legacy(map, list, name.clone()),
        EntryShape::Enhanced => build_enhanced(map, list, name.clone()),
    };

    match built {
        Ok(entry) => {
            debug!(
                "Normalized {} entry '{}' ({}/{})",
                match shape {
                    EntryShape::Legacy => "legacy",
                    EntryShape::Enhanced => "enhanced",
                },
                entry.name,
                entry.db_type,
                entry.provider()
            );
            config.entries.push(entry);
        }
        Err(error) => {
            let name = name.unwrap_or_else(placeholder);
            warn!("Rejected entry '{}': {}", name, error);
            config.rejected.push(RejectedEntry {
                name,
                list: list.key.to_string(),
                index,
                error,
            });
        }
    }
    Ok(())
}

/// Identity of an item: `name`, or for legacy items `service_name` then `host`.
fn item_name(map: &Map<String, Value>, shape: EntryShape) -> Option<String> {
    let keys: &[&str] = match shape {
        EntryShape::Enhanced => &["name"],
        EntryShape::Legacy => &["name", "service_name", "host"],
    };
    keys.iter()
        .filter_map(|key| map.get(*key).and_then(scalar_string))
        .find(|value| !value.is_empty())
}

/// String form of a string, number, or boolean value.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        _ => None,
    }
}

fn resolve_type(declared: Option<String>, list: EntryList) -> std::result::Result<DatabaseType, EntryError> {
    match (declared, list.db_type) {
        (Some(declared), Some(listed)) => {
            let declared = declared.parse::<DatabaseType>()?;
            if declared == listed {
                Ok(declared)
            } else {
                Err(EntryError::invalid(
                    "type",
                    format!(
                        "{} entry listed under {}; move it to {}",
                        declared,
                        list.key,
                        declared.list_key()
                    ),
                ))
            }
        }
        (Some(declared), None) => declared.parse(),
        (None, Some(listed)) => Ok(listed),
        (None, None) => Err(EntryError::missing_for(
            "type",
            "entries under databases must declare a type",
        )),
    }
}

fn build_enhanced(
    mut item: Map<String, Value>,
    list: EntryList,
    name: Option<String>,
) -> std::result::Result<DatabaseEntry, EntryError> {
    item.remove("name");
    let name = name.ok_or_else(|| EntryError::missing("name"))?;
    let db_type = resolve_type(take_str(&mut item, "type", "type")?, list)?;
    let enabled = take_bool(&mut item, "enabled", "enabled")?.unwrap_or(true);
    let mut ignored = Vec::new();

    let mut connection_map = take_object(&mut item, "connection", "connection")?.unwrap_or_default();
    let provider = match take_str(&mut item, "provider", "provider")? {
        Some(provider) => provider.parse::<Provider>()?,
        None => infer_provider(&connection_map),
    };
    let connection = build_connection(provider, db_type, &mut connection_map, &mut ignored)?;

    let legacy_user = take_str(&mut item, "user", "user")?;
    let legacy_password = take_str(&mut item, "password", "password")?;
    let credentials = match take_object(&mut item, "credentials", "credentials")? {
        Some(mut block) => {
            if legacy_password.is_some() {
                ignored.push(ignore(
                    "password",
                    "legacy password ignored; credentials.password_source takes precedence",
                ));
            }
            if legacy_user.is_some() {
                ignored.push(ignore(
                    "user",
                    "legacy user ignored; credentials.username takes precedence",
                ));
            }
            build_credentials(&mut block, &mut ignored)?
        }
        None => CredentialSpec {
            username: legacy_user.unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            source: PasswordSource::Plain {
                password: Secret::new(legacy_password.ok_or_else(|| {
                    EntryError::missing_for("credentials.password", "password_source=plain")
                })?),
            },
        },
    };

    let monitoring = take_monitoring(&mut item)?;
    let tls = take_tls(&mut item, &mut ignored)?;
    let labels = take_labels(&mut item, "labels")?;

    Ok(DatabaseEntry {
        name,
        enabled,
        db_type,
        connection,
        credentials,
        monitoring,
        tls,
        labels,
        passthrough: item.into_iter().collect(),
        ignored_fields: ignored,
        shape: EntryShape::Enhanced,
    })
}

fn build_legacy(
    mut item: Map<String, Value>,
    list: EntryList,
    name: Option<String>,
) -> std::result::Result<DatabaseEntry, EntryError> {
    item.remove("name");
    item.remove("service_name");
    let host = take_str(&mut item, "host", "host")?
        .filter(|host| !host.is_empty())
        .ok_or_else(|| EntryError::missing("host"))?;
    let name = name.unwrap_or_else(|| host.clone());
    let db_type = resolve_type(take_str(&mut item, "type", "type")?, list)?;
    let enabled = take_bool(&mut item, "enabled", "enabled")?.unwrap_or(true);
    let port = take_port(&mut item, "port", "port")?.unwrap_or(db_type.default_port());
    let database = take_str(&mut item, "database", "database")?;
    let ssl_mode = take_ssl_mode(&mut item, "")?;

    let username = match take_str(&mut item, "user", "user")? {
        Some(user) => Some(user),
        None => take_str(&mut item, "username", "username")?,
    };
    let password = take_str(&mut item, "password", "password")?
        .ok_or_else(|| EntryError::missing_for("password", "password_source=plain"))?;

    let mut monitoring_map = Map::new();
    for key in LEGACY_MONITORING_KEYS {
        if let Some(value) = item.remove(key) {
            monitoring_map.insert(key.to_string(), value);
        }
    }
    let monitoring = parse_monitoring(monitoring_map)?;

    let tls = TlsOptions {
        enabled: take_bool(&mut item, "tls_enabled", "tls_enabled")?,
        verify_server_certificate: take_bool(
            &mut item,
            "tls_verify_server_certificate",
            "tls_verify_server_certificate",
        )?,
        ca_bundle_file: take_str(&mut item, "tls_ca", "tls_ca")?,
    };

    let mut labels = take_labels(&mut item, "custom_labels")?;
    if let Some(environment) = take_str(&mut item, "environment", "environment")? {
        labels.insert(ENVIRONMENT_LABEL.to_string(), environment);
    }

    Ok(DatabaseEntry {
        name,
        enabled,
        db_type,
        connection: Connection::Ec2(HostConnection {
            host,
            port,
            database,
            ssl_mode,
        }),
        credentials: CredentialSpec {
            username: username.unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            source: PasswordSource::Plain {
                password: Secret::new(password),
            },
        },
        monitoring,
        tls,
        labels,
        passthrough: item.into_iter().collect(),
        ignored_fields: Vec::new(),
        shape: EntryShape::Legacy,
    })
}

fn infer_provider(connection: &Map<String, Value>) -> Provider {
    if connection.contains_key("cluster_endpoint") {
        Provider::Aurora
    } else if connection.contains_key("endpoint") {
        Provider::Rds
    } else {
        Provider::Ec2
    }
}

fn build_connection(
    provider: Provider,
    db_type: DatabaseType,
    map: &mut Map<String, Value>,
    ignored: &mut Vec<IgnoredField>,
) -> std::result::Result<Connection, EntryError> {
    let address_key = match provider {
        Provider::Container | Provider::Ec2 => "host",
        Provider::Rds => "endpoint",
        Provider::Aurora => "cluster_endpoint",
    };

    for key in ["host", "endpoint", "cluster_endpoint", "reader_endpoint"] {
        let allowed = key == address_key || (key == "reader_endpoint" && provider == Provider::Aurora);
        if !allowed && map.contains_key(key) {
            return Err(EntryError::invalid(
                format!("connection.{}", key),
                format!(
                    "not valid for provider {}; use connection.{}",
                    provider, address_key
                ),
            ));
        }
    }

    let address_field = format!("connection.{}", address_key);
    let address = take_str(map, address_key, &address_field)?
        .filter(|address| !address.is_empty())
        .ok_or_else(|| EntryError::missing_for(address_field.clone(), format!("provider={}", provider)))?;
    let port = take_port(map, "port", "connection.port")?.unwrap_or(db_type.default_port());
    let database = take_str(map, "database", "connection.database")?;
    let ssl_mode = take_ssl_mode(map, "connection.")?;
    let reader_endpoint = take_str(map, "reader_endpoint", "connection.reader_endpoint")?
        .filter(|reader| !reader.is_empty());

    for key in map.keys() {
        ignored.push(ignore(
            &format!("connection.{}", key),
            "unknown connection field",
        ));
    }

    Ok(match provider {
        Provider::Container => Connection::Container(HostConnection {
            host: address,
            port,
            database,
            ssl_mode,
        }),
        Provider::Ec2 => Connection::Ec2(HostConnection {
            host: address,
            port,
            database,
            ssl_mode,
        }),
        Provider::Rds => Connection::Rds(InstanceConnection {
            endpoint: address,
            port,
            database,
            ssl_mode,
        }),
        Provider::Aurora => Connection::Aurora(ClusterConnection {
            cluster_endpoint: address,
            reader_endpoint,
            port,
            database,
            ssl_mode,
        }),
    })
}

fn build_credentials(
    map: &mut Map<String, Value>,
    ignored: &mut Vec<IgnoredField>,
) -> std::result::Result<CredentialSpec, EntryError> {
    let username = take_str(map, "username", "credentials.username")?
        .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
    let kind = match take_str(map, "password_source", "credentials.password_source")? {
        Some(source) => source.parse::<SourceKind>()?,
        None => SourceKind::Plain,
    };
    let password = take_str(map, "password", "credentials.password")?;
    let password_env = take_str(map, "password_env", "credentials.password_env")?;
    let password_key = take_str(map, "password_key", "credentials.password_key")?;
    let region = take_str(map, "region", "credentials.region")?;

    let uses_store = matches!(kind, SourceKind::AwsSecretsManager | SourceKind::AwsSsmParameter);
    let unused = [
        ("password", password.is_some() && kind != SourceKind::Plain),
        ("password_env", password_env.is_some() && kind != SourceKind::EnvVar),
        ("password_key", password_key.is_some() && !uses_store),
        ("region", region.is_some() && !uses_store),
    ];
    for (field, present) in unused {
        if present {
            ignored.push(ignore(
                &format!("credentials.{}", field),
                &format!("not used by password_source={}", kind),
            ));
        }
    }
    for key in map.keys() {
        ignored.push(ignore(
            &format!("credentials.{}", key),
            "unknown credentials field",
        ));
    }

    let companion = |value: Option<String>| {
        value.filter(|v| !v.is_empty()).ok_or_else(|| {
            EntryError::missing_for(
                format!("credentials.{}", kind.companion_field()),
                format!("password_source={}", kind),
            )
        })
    };

    let source = match kind {
        SourceKind::Plain => PasswordSource::Plain {
            password: Secret::new(password.ok_or_else(|| {
                EntryError::missing_for("credentials.password", "password_source=plain")
            })?),
        },
        SourceKind::EnvVar => PasswordSource::EnvVar {
            variable: companion(password_env)?,
        },
        SourceKind::AwsSecretsManager => PasswordSource::AwsSecretsManager {
            key: companion(password_key)?,
            region,
        },
        SourceKind::AwsSsmParameter => PasswordSource::AwsSsmParameter {
            key: companion(password_key)?,
            region,
        },
    };

    Ok(CredentialSpec { username, source })
}

fn parse_monitoring(map: Map<String, Value>) -> std::result::Result<MonitoringOptions, EntryError> {
    serde_json::from_value(Value::Object(map))
        .map_err(|e| EntryError::invalid("monitoring", e.to_string()))
}

fn take_monitoring(item: &mut Map<String, Value>) -> std::result::Result<MonitoringOptions, EntryError> {
    match take_object(item, "monitoring", "monitoring")? {
        Some(map) => parse_monitoring(map),
        None => Ok(MonitoringOptions::default()),
    }
}

fn take_tls(
    item: &mut Map<String, Value>,
    ignored: &mut Vec<IgnoredField>,
) -> std::result::Result<TlsOptions, EntryError> {
    let Some(mut map) = take_object(item, "tls", "tls")? else {
        return Ok(TlsOptions::default());
    };
    let unknown: Vec<String> = map
        .keys()
        .filter(|key| !TLS_KEYS.contains(&key.as_str()))
        .cloned()
        .collect();
    for key in unknown {
        map.remove(&key);
        ignored.push(ignore(&format!("tls.{}", key), "unknown tls field"));
    }
    serde_json::from_value(Value::Object(map)).map_err(|e| EntryError::invalid("tls", e.to_string()))
}

/// Reads a label mapping, stringifying scalar values.
fn take_labels(
    item: &mut Map<String, Value>,
    key: &str,
) -> std::result::Result<BTreeMap<String, String>, EntryError> {
    let Some(map) = take_object(item, key, key)? else {
        return Ok(BTreeMap::new());
    };
    map.into_iter()
        .map(|(label, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                other => {
                    return Err(EntryError::invalid(
                        format!("{}.{}", key, label),
                        format!("expected a scalar value, found {}", describe(&other)),
                    ));
                }
            };
            Ok((label, text))
        })
        .collect()
}

fn take_ssl_mode(
    map: &mut Map<String, Value>,
    prefix: &str,
) -> std::result::Result<Option<String>, EntryError> {
    let ssl_mode = take_str(map, "ssl_mode", &format!("{}ssl_mode", prefix))?;
    let sslmode = take_str(map, "sslmode", &format!("{}sslmode", prefix))?;
    Ok(ssl_mode.or(sslmode))
}

fn take_str(
    map: &mut Map<String, Value>,
    key: &str,
    field: &str,
) -> std::result::Result<Option<String>, EntryError> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        // Unquoted YAML scalars such as `password: 12345`
        Some(other @ (Value::Number(_) | Value::Bool(_))) => {
            debug!("Reading {} value of '{}' as a string", describe(&other), field);
            Ok(scalar_string(&other))
        }
        Some(other) => Err(EntryError::invalid(
            field,
            format!("expected a string, found {}", describe(&other)),
        )),
    }
}

fn take_bool(
    map: &mut Map<String, Value>,
    key: &str,
    field: &str,
) -> std::result::Result<Option<bool>, EntryError> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(other) => Err(EntryError::invalid(
            field,
            format!("expected a boolean, found {}", describe(&other)),
        )),
    }
}

/// Ports may be written as numbers or numeric strings.
fn take_port(
    map: &mut Map<String, Value>,
    key: &str,
    field: &str,
) -> std::result::Result<Option<u16>, EntryError> {
    let out_of_range = |raw: &str| {
        EntryError::invalid(field, format!("port {} is outside 1-65535", raw))
    };
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
            Some(port) if port > 0 => Ok(Some(port)),
            _ => Err(out_of_range(&n.to_string())),
        },
        Some(Value::String(s)) => match s.trim().parse::<u16>() {
            Ok(port) if port > 0 => Ok(Some(port)),
            _ => Err(out_of_range(&s)),
        },
        Some(other) => Err(EntryError::invalid(
            field,
            format!("expected a port number, found {}", describe(&other)),
        )),
    }
}

fn take_object(
    map: &mut Map<String, Value>,
    key: &str,
    field: &str,
) -> std::result::Result<Option<Map<String, Value>>, EntryError> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(inner)) => Ok(Some(inner)),
        Some(other) => Err(EntryError::invalid(
            field,
            format!("expected a mapping, found {}", describe(&other)),
        )),
    }
}

fn ignore(field: &str, reason: &str) -> IgnoredField {
    IgnoredField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(text: &str) -> Value {
        parse_document(text, InputFormat::Yaml).unwrap()
    }

    fn normalize_one(text: &str) -> MonitoringConfig {
        normalize(&[yaml(text)]).unwrap()
    }

    #[test]
    fn test_legacy_items_become_ec2_plain() {
        let config = normalize_one(
            r"
mysql_databases:
  - host: 10.0.1.50
    port: 3306
    user: monitor
    password: secret
    service_name: orders
postgresql_databases:
  - host: pg.internal
    password: pg-secret
    database: app
",
        );

        assert_eq!(config.entries.len(), 2);
        let orders = &config.entries[0];
        assert_eq!(orders.name, "orders");
        assert_eq!(orders.db_type, DatabaseType::Mysql);
        assert_eq!(orders.provider(), Provider::Ec2);
        assert_eq!(orders.credentials.username, "monitor");
        assert_eq!(orders.shape, EntryShape::Legacy);

        let pg = &config.entries[1];
        assert_eq!(pg.name, "pg.internal");
        assert_eq!(pg.connection.port(), 5432);
        assert_eq!(pg.credentials.username, "newrelic");
        assert_eq!(pg.connection.database(), Some("app"));
    }

    #[test]
    fn test_legacy_naming_precedence() {
        let config = normalize_one(
            r"
mysql_databases:
  - name: explicit
    service_name: service
    host: h1
    password: p
  - service_name: service-only
    host: h2
    password: p
",
        );
        let names: Vec<&str> = config.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["explicit", "service-only"]);
    }

    #[test]
    fn test_legacy_flat_fields_mapped() {
        let config = normalize_one(
            r"
mysql_databases:
  - host: h1
    password: p
    extended_metrics: false
    tls_enabled: true
    tls_ca: /etc/ssl/ca.pem
    environment: staging
    custom_labels:
      team: dba
      tier: 2
    agent_flag: keep-me
",
        );
        let entry = &config.entries[0];
        assert_eq!(entry.monitoring.extended_metrics, Some(false));
        assert_eq!(entry.tls.enabled, Some(true));
        assert_eq!(entry.tls.ca_bundle_file.as_deref(), Some("/etc/ssl/ca.pem"));
        assert_eq!(entry.environment(), "staging");
        assert_eq!(entry.labels.get("tier").map(String::as_str), Some("2"));
        assert_eq!(
            entry.passthrough.get("agent_flag"),
            Some(&Value::String("keep-me".to_string()))
        );
    }

    #[test]
    fn test_enhanced_entries_under_databases() {
        let config = normalize_one(
            r"
databases:
  - name: prod-rds
    type: mysql
    provider: rds
    connection:
      endpoint: prod.abc.us-east-1.rds.amazonaws.com
    credentials:
      password_source: aws_secrets_manager
      password_key: prod/mysql/newrelic
      region: us-east-1
    labels:
      environment: production
",
        );
        let entry = &config.entries[0];
        assert_eq!(entry.provider(), Provider::Rds);
        assert_eq!(entry.connection.port(), 3306);
        assert_eq!(
            entry.credentials.source,
            PasswordSource::AwsSecretsManager {
                key: "prod/mysql/newrelic".to_string(),
                region: Some("us-east-1".to_string()),
            }
        );
        assert!(entry.ignored_fields.is_empty());
    }

    #[test]
    fn test_enhanced_entries_under_typed_lists() {
        let config = normalize_one(
            r"
postgresql_databases:
  - name: cluster
    provider: aurora
    connection:
      cluster_endpoint: c.cluster-xyz.rds.amazonaws.com
      reader_endpoint: c.cluster-ro-xyz.rds.amazonaws.com
      port: 5432
    credentials:
      password_source: aws_ssm_parameter
      password_key: /aurora/us-east-1/cluster/newrelic
_metadata:
  generated_at: 2024-01-01T00:00:00Z
",
        );
        let entry = &config.entries[0];
        assert_eq!(entry.db_type, DatabaseType::Postgresql);
        assert_eq!(
            entry.connection.reader_host(),
            Some("c.cluster-ro-xyz.rds.amazonaws.com")
        );
        assert!(config.passthrough.contains_key("_metadata"));
    }

    #[test]
    fn test_provider_inferred_from_connection() {
        let config = normalize_one(
            r"
databases:
  - name: inferred
    type: postgresql
    connection:
      endpoint: db.example.com
    credentials:
      password: p
",
        );
        assert_eq!(config.entries[0].provider(), Provider::Rds);
    }

    #[test]
    fn test_duplicate_names_abort() {
        let result = normalize(&[yaml(
            r"
databases:
  - name: prod-db
    type: mysql
    connection: {host: a}
    credentials: {password: p}
  - name: prod-db
    type: postgresql
    connection: {host: b}
    credentials: {password: p}
",
        )]);
        let err = result.unwrap_err();
        assert!(err.is_schema_failure());
        assert_eq!(
            err.to_string(),
            "Schema error: duplicate database name: prod-db"
        );
    }

    #[test]
    fn test_duplicate_names_across_documents_abort() {
        let first = yaml("mysql_databases:\n  - host: h\n    name: same\n    password: p\n");
        let second = yaml("postgresql_databases:\n  - host: h2\n    name: same\n    password: p\n");
        assert!(normalize(&[first, second]).is_err());
    }

    #[test]
    fn test_unconstructible_entries_are_rejected_not_dropped() {
        let config = normalize_one(
            r"
databases:
  - name: azure-db
    type: mysql
    provider: azure
    connection: {host: a}
  - name: no-env
    type: mysql
    connection: {host: b}
    credentials: {password_source: env_var}
  - name: wrong-shape
    type: mysql
    provider: rds
    connection: {host: c}
  - name: bad-port
    type: mysql
    connection: {host: d, port: 70000}
    credentials: {password: p}
  - name: fine
    type: mysql
    connection: {host: e}
    credentials: {password: p}
mysql_databases:
  - name: misplaced
    type: postgresql
    host: f
    password: p
",
        );

        assert_eq!(config.entries.len(), 1);
        let rejected: Vec<(&str, &EntryError)> = config
            .rejected
            .iter()
            .map(|r| (r.name.as_str(), &r.error))
            .collect();
        assert_eq!(rejected.len(), 5);
        assert_eq!(rejected[0].1, &EntryError::unsupported("provider", "azure"));
        assert_eq!(
            rejected[1].1,
            &EntryError::missing_for("credentials.password_env", "password_source=env_var")
        );
        assert_eq!(rejected[2].1.field(), "connection.host");
        assert_eq!(rejected[3].1.field(), "connection.port");
        assert_eq!(rejected[4].0, "misplaced");
        assert_eq!(rejected[4].1.field(), "type");
    }

    #[test]
    fn test_non_mapping_item_rejected_with_position() {
        let config = normalize_one("mysql_databases:\n  - just-a-string\n");
        assert_eq!(config.rejected[0].name, "mysql_databases[0]");
    }

    #[test]
    fn test_enhanced_credentials_win_over_legacy_password() {
        let config = normalize_one(
            r"
databases:
  - name: both
    type: mysql
    connection: {host: a}
    password: legacy
    credentials:
      password_source: env_var
      password_env: DB_PASS
      password_key: stray
",
        );
        let entry = &config.entries[0];
        assert_eq!(
            entry.credentials.source,
            PasswordSource::EnvVar {
                variable: "DB_PASS".to_string()
            }
        );
        let fields: Vec<&str> = entry.ignored_fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["password", "credentials.password_key"]);
    }

    #[test]
    fn test_later_documents_override_defaults_per_field() {
        let first = yaml(
            r"
global_defaults:
  interval: 60s
  batch_limit: 50
provider_defaults:
  rds:
    tls: {enabled: false}
    monitoring: {collect_rds_metrics: false}
",
        );
        let second = yaml(
            r"
global_defaults:
  interval: 15s
provider_defaults:
  rds:
    monitoring: {collect_rds_metrics: true}
",
        );

        let config = normalize(&[first, second]).unwrap();

        assert_eq!(config.global_defaults.interval.as_deref(), Some("15s"));
        assert_eq!(config.global_defaults.batch_limit, Some(50));
        let rds = &config.provider_defaults[&Provider::Rds];
        assert_eq!(rds.tls.enabled, Some(false));
        assert_eq!(rds.monitoring.collect_rds_metrics, Some(true));
    }

    #[test]
    fn test_invalid_provider_defaults_is_schema_error() {
        let result = normalize(&[yaml("provider_defaults:\n  azure: {}\n")]);
        assert!(result.unwrap_err().is_schema_failure());
    }

    #[test]
    fn test_unknown_top_level_keys_preserved() {
        let config = normalize_one("newrelic_account_id: '12345'\nmysql_databases: []\n");
        assert_eq!(
            config.passthrough.get("newrelic_account_id"),
            Some(&Value::String("12345".to_string()))
        );
    }

    #[test]
    fn test_non_list_collection_is_schema_error() {
        let result = normalize(&[yaml("mysql_databases: {host: a}\n")]);
        assert!(result.unwrap_err().is_schema_failure());
    }

    #[test]
    fn test_discovery_block_parsed() {
        let config = normalize_one(
            r"
discovery:
  enabled: true
  regions: [us-east-1, eu-west-1]
  tag_filters:
    team: dba
",
        );
        let discovery = config.discovery.unwrap();
        assert_eq!(discovery.regions, vec!["us-east-1", "eu-west-1"]);
        assert_eq!(discovery.tag_filters.get("team").map(String::as_str), Some("dba"));
    }

    #[test]
    fn test_numeric_scalars_read_as_strings() {
        let config = normalize_one(
            r"
mysql_databases:
  - name: legacy-numeric
    host: 10.0.0.1
    user: 4242
    password: 12345
databases:
  - name: enhanced-numeric
    type: postgresql
    connection: {host: 1234, database: 2024}
    credentials: {username: 99, password: 3.5}
  - name: 2024
    type: mysql
    connection: {host: numeric-name}
    credentials: {password: p}
  - name: flag-password
    type: mysql
    connection: {host: h}
    credentials: {password: true}
",
        );

        assert!(config.rejected.is_empty());
        let legacy = &config.entries[0];
        assert_eq!(legacy.credentials.username, "4242");
        assert_eq!(
            legacy.credentials.source,
            PasswordSource::Plain { password: Secret::new("12345") }
        );

        let enhanced = &config.entries[1];
        assert_eq!(enhanced.connection.host(), "1234");
        assert_eq!(enhanced.connection.database(), Some("2024"));
        assert_eq!(enhanced.credentials.username, "99");
        assert_eq!(
            enhanced.credentials.source,
            PasswordSource::Plain { password: Secret::new("3.5") }
        );

        assert_eq!(config.entries[2].name, "2024");
        assert_eq!(
            config.entries[3].credentials.source,
            PasswordSource::Plain { password: Secret::new("true") }
        );
    }

    #[test]
    fn test_non_scalar_string_field_rejected() {
        let config = normalize_one(
            "databases:\n  - name: bad\n    type: mysql\n    connection: {host: [a, b]}\n    credentials: {password: p}\n",
        );
        assert!(config.entries.is_empty());
        assert_eq!(config.rejected[0].error.field(), "connection.host");
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            InputFormat::detect(Path::new("config.json"), ""),
            InputFormat::Json
        );
        assert_eq!(
            InputFormat::detect(Path::new("config.yml"), "{}"),
            InputFormat::Yaml
        );
        assert_eq!(
            InputFormat::detect(Path::new("config.conf"), "  {\"databases\": []}"),
            InputFormat::Json
        );
        assert_eq!(
            InputFormat::detect(Path::new("config"), "databases: []"),
            InputFormat::Yaml
        );
    }

    #[test]
    fn test_malformed_document_is_schema_error() {
        let err = parse_document("{not json", InputFormat::Json).unwrap_err();
        assert!(err.is_schema_failure());
    }

    #[test]
    fn test_empty_document_yields_empty_config() {
        let config = normalize(&[Value::Null]).unwrap();
        assert!(config.entries.is_empty());
        assert!(config.rejected.is_empty());
    }
}
