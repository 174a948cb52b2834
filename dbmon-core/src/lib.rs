//! Configuration resolution and credential pipeline for database monitoring
//! agents.
//!
//! Takes loosely structured database descriptors (legacy flat lists, the
//! enhanced multi-provider schema, or discovery output) and produces one
//! fully resolved, credential-populated document for the agent templates.
//!
//! # Security Guarantees
//! - Resolved passwords are held in zeroizing containers and never logged
//! - Credential source markers never reach the canonical output
//! - Credential errors name the lookup key, never the value
//!
//! # Architecture
//! Data flows strictly forward through five stages:
//! [`normalize`] → [`defaults`] → [`credentials`] → [`validation`] → [`emit`].
//! [`pipeline::Pipeline`] wires them together, [`discovery`] produces input
//! documents, and [`report`] renders the diagnostics.

pub mod credentials;
pub mod defaults;
pub mod discovery;
pub mod emit;
pub mod error;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod validation;

// Re-export commonly used types
pub use credentials::{CredentialResolver, Resolution, ResolverConfig, Secret};
pub use defaults::{DefaultsMerger, merge_defaults};
pub use emit::{CanonicalDocument, Emission, ExcludedEntry, ExclusionReason, OutputFormat, emit};
pub use error::{CredentialErrorKind, CredentialResolutionError, DbMonError, EntryError, Result};
pub use logging::{LogFormat, init_logging};
pub use models::{
    Connection, DatabaseEntry, DatabaseType, MonitoringConfig, PasswordSource, Provider,
    SourceKind,
};
pub use normalize::{InputFormat, normalize, parse_document, read_documents};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use report::{FixScriptReporter, JsonReporter, ReportFormat, Reporter, SummaryReporter};
pub use validation::output::validate_canonical_item;
pub use validation::{Severity, ValidationIssue, ValidationReport, Validator};
