//! Self-check of canonical items before they are emitted.
//!
//! Each item is checked on its own so a failure excludes that item and
//! nothing else.
//!
//! # Security Guarantees
//! - Every item must match the embedded JSON Schema for agent configuration
//! - No credential source key (`password_source`, `password_key`,
//!   `password_env`, `credentials`) may appear anywhere in an item
//!
//! Values are never scanned: a password or label that happens to spell a
//! backend name is user data.

use jsonschema::Validator;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

use crate::error::DbMonError;
use crate::models::DatabaseType;

/// Output self-check failures.
#[derive(Debug, Error)]
pub enum OutputCheckError {
    /// Schema compilation failed during initialization
    #[error("JSON Schema compilation failed: {message}")]
    SchemaCompilation { message: String },

    /// The document does not match the schema
    #[error("Output validation failed with {error_count} errors: {errors:?}")]
    ValidationFailed {
        error_count: usize,
        errors: Vec<String>,
    },

    /// A credential source marker survived into the output
    #[error("Security validation failed: {reason}")]
    SecurityViolation { reason: String },
}

impl From<OutputCheckError> for DbMonError {
    fn from(error: OutputCheckError) -> Self {
        Self::output_validation(error.to_string())
    }
}

/// Keys that only exist in input documents.
const MARKER_KEYS: &[&str] = &[
    "password_source",
    "password_key",
    "password_env",
    "credentials",
];

/// Embedded JSON Schema for the canonical agent configuration
const CANONICAL_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "dbmon canonical agent configuration",
  "type": "object",
  "properties": {
    "mysql_databases": {
      "type": "array",
      "items": { "$ref": "#/$defs/item" }
    },
    "postgresql_databases": {
      "type": "array",
      "items": {
        "allOf": [
          { "$ref": "#/$defs/item" },
          { "required": ["database", "sslmode"] }
        ]
      }
    }
  },
  "$defs": {
    "interval": { "type": "string", "pattern": "^\\d+[smh]$" },
    "item": {
      "type": "object",
      "required": [
        "service_name", "provider", "host", "port", "user", "password",
        "tls_enabled", "environment", "custom_labels"
      ],
      "properties": {
        "service_name": { "type": "string", "minLength": 1 },
        "provider": { "enum": ["container", "ec2", "rds", "aurora"] },
        "host": { "type": "string", "minLength": 1 },
        "port": { "type": "integer", "minimum": 1, "maximum": 65535 },
        "reader_host": { "type": "string", "minLength": 1 },
        "user": { "type": "string", "minLength": 1 },
        "password": { "type": "string" },
        "database": { "type": "string", "minLength": 1 },
        "sslmode": {
          "enum": ["disable", "allow", "prefer", "require", "verify-ca", "verify-full"]
        },
        "extended_metrics": { "type": "boolean" },
        "collect_inventory": { "type": "boolean" },
        "interval": { "$ref": "#/$defs/interval" },
        "enable_query_monitoring": { "type": "boolean" },
        "query_metrics_interval": { "$ref": "#/$defs/interval" },
        "max_sql_query_length": { "type": "integer", "minimum": 1, "maximum": 10000 },
        "gather_query_samples": { "type": "boolean" },
        "query_timeout": { "type": "integer", "minimum": 1, "maximum": 3600 },
        "batch_limit": { "type": "integer", "minimum": 1 },
        "collect_bloat_metrics": { "type": "boolean" },
        "collect_db_lock_metrics": { "type": "boolean" },
        "collect_rds_metrics": { "type": "boolean" },
        "collect_aurora_metrics": { "type": "boolean" },
        "monitor_readers": { "type": "boolean" },
        "tls_enabled": { "type": "boolean" },
        "tls_verify_server_certificate": { "type": "boolean" },
        "tls_ca": { "type": "string", "minLength": 1 },
        "environment": { "type": "string" },
        "custom_labels": {
          "type": "object",
          "additionalProperties": { "type": "string" }
        }
      }
    }
  }
}"##;

/// Compiled JSON Schema instance (initialized once)
static COMPILED_SCHEMA: OnceLock<Validator> = OnceLock::new();

fn compiled_schema() -> Result<&'static Validator, OutputCheckError> {
    if let Some(validator) = COMPILED_SCHEMA.get() {
        return Ok(validator);
    }

    let schema_json: Value =
        serde_json::from_str(CANONICAL_SCHEMA).map_err(|e| OutputCheckError::SchemaCompilation {
            message: format!("Failed to parse embedded schema: {}", e),
        })?;

    let compiled = jsonschema::validator_for(&schema_json).map_err(|e| {
        OutputCheckError::SchemaCompilation {
            message: format!("Schema compilation error: {}", e),
        }
    })?;

    // Don't error if a concurrent caller already set it
    let _ = COMPILED_SCHEMA.set(compiled);

    COMPILED_SCHEMA
        .get()
        .ok_or_else(|| OutputCheckError::SchemaCompilation {
            message: "Schema validator could not be cached".to_string(),
        })
}

/// Validates one canonical item against the schema for its list.
///
/// # Errors
/// Returns every schema violation found, or the first credential source key.
pub fn validate_canonical_item(db_type: DatabaseType, item: &Value) -> Result<(), OutputCheckError> {
    let schema = compiled_schema()?;

    let mut wrapper = serde_json::Map::new();
    wrapper.insert(db_type.list_key().to_string(), Value::Array(vec![item.clone()]));
    let wrapper = Value::Object(wrapper);

    let errors: Vec<String> = schema
        .iter_errors(&wrapper)
        .map(|error| error.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(OutputCheckError::ValidationFailed {
            error_count: errors.len(),
            errors,
        });
    }

    scan_for_source_markers(item, "")
}

/// Rejects credential source keys anywhere in `value`.
///
/// # Errors
/// Returns a security violation naming the first key found and its path.
pub fn scan_for_source_markers(value: &Value, path: &str) -> Result<(), OutputCheckError> {
    match value {
        Value::Object(obj) => {
            for (key, val) in obj {
                let new_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                if MARKER_KEYS.contains(&key.as_str()) {
                    return Err(OutputCheckError::SecurityViolation {
                        reason: format!("Credential source field found at path '{}'", new_path),
                    });
                }
                scan_for_source_markers(val, &new_path)?;
            }
        }
        Value::Array(arr) => {
            for (index, item) in arr.iter().enumerate() {
                let new_path = format!("{}[{}]", path, index);
                scan_for_source_markers(item, &new_path)?;
            }
        }
        _ => {}
    }

    Ok(())
}
