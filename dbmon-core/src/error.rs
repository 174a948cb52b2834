//! Error types for the configuration pipeline.
//!
//! Two classes of failure exist:
//! - [`DbMonError`] is fatal for the whole run (malformed documents, duplicate
//!   names, I/O). Nothing is emitted when one is returned.
//! - [`EntryError`] and [`CredentialResolutionError`] are scoped to a single
//!   database entry. They are collected into the validation report and the
//!   run always completes.
//!
//! No error in this module ever carries a resolved password. Credential
//! errors name the variable, secret, or parameter that failed, never its value.

use serde::Serialize;
use thiserror::Error;

/// Main error type for fatal pipeline failures.
#[derive(Debug, Error)]
pub enum DbMonError {
    /// Malformed input or a duplicate entry name; aborts the run
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// Invalid runtime configuration (resolver tuning, logging, backends)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The canonical document failed its own output checks
    #[error("Output validation failed: {message}")]
    OutputValidation { message: String },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// YAML serialization or deserialization failed
    #[error("YAML processing failed: {context}")]
    Yaml {
        context: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Convenience type alias for Results with DbMonError
pub type Result<T> = std::result::Result<T, DbMonError>;

impl DbMonError {
    /// Creates a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates the schema error raised for a repeated entry name
    pub fn duplicate_name(name: &str) -> Self {
        Self::schema(format!("duplicate database name: {}", name))
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an output validation error
    pub fn output_validation(message: impl Into<String>) -> Self {
        Self::OutputValidation {
            message: message.into(),
        }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true for errors caused by the input documents rather than
    /// by the environment the pipeline runs in.
    pub fn is_schema_failure(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }
}

/// Per-entry construction failures recorded by the normalizer.
///
/// An entry that hits one of these is carried as rejected rather than
/// dropped, so the validator can report it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryError {
    /// Unknown provider, unknown type, or an unsupported combination
    #[error("unsupported {field} '{value}'")]
    UnsupportedProvider { field: String, value: String },

    /// Required field absent for the entry's provider or credential kind
    #[error("missing required field '{field}'{}", context_suffix(.context))]
    MissingField {
        field: String,
        context: Option<String>,
    },

    /// Field present but unusable (wrong type, out of range, wrong list)
    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

fn context_suffix(context: &Option<String>) -> String {
    context
        .as_ref()
        .map_or_else(String::new, |c| format!(" ({})", c))
}

impl EntryError {
    /// Creates an unsupported provider/type error
    pub fn unsupported(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UnsupportedProvider {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a missing field error without extra context
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            context: None,
        }
    }

    /// Creates a missing field error naming the requirement that applies
    pub fn missing_for(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            context: Some(context.into()),
        }
    }

    /// Creates an invalid field error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Dotted path of the offending field
    pub fn field(&self) -> &str {
        match self {
            Self::UnsupportedProvider { field, .. }
            | Self::MissingField { field, .. }
            | Self::InvalidField { field, .. } => field,
        }
    }
}

/// Classification of a terminal credential fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialErrorKind {
    /// The variable, secret, or parameter does not exist
    NotFound,
    /// The caller identity may not read the secret or parameter
    AccessDenied,
    /// The backend did not answer in time, or the run deadline expired
    Timeout,
    /// Any other backend failure, including an unconfigured backend
    Unavailable,
}

impl std::fmt::Display for CredentialErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "NotFound"),
            Self::AccessDenied => write!(f, "AccessDenied"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Unavailable => write!(f, "Unavailable"),
        }
    }
}

/// Per-entry credential resolution failure.
///
/// `detail` names what was looked up (variable name, secret id, parameter
/// name) or describes the failure; it never contains secret material.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("credential resolution failed ({kind}): {detail}")]
pub struct CredentialResolutionError {
    pub kind: CredentialErrorKind,
    pub detail: String,
}

impl CredentialResolutionError {
    /// Creates a new resolution error
    pub fn new(kind: CredentialErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Creates a not-found error
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(CredentialErrorKind::NotFound, detail)
    }

    /// Creates an access-denied error
    pub fn access_denied(detail: impl Into<String>) -> Self {
        Self::new(CredentialErrorKind::AccessDenied, detail)
    }

    /// Creates a timeout error
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(CredentialErrorKind::Timeout, detail)
    }

    /// Creates an unavailable-backend error
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(CredentialErrorKind::Unavailable, detail)
    }
}
