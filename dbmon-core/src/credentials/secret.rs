//! Secret container and resolved credential records.
//!
//! # Security
//! - Secrets are stored in `Zeroizing<String>` and cleared on drop
//! - `Debug` output is redacted, so a secret can sit inside any derived
//!   `Debug` struct without leaking through `tracing` fields
//! - Provenance records only carry the source kind and key reference

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::models::SourceKind;

/// Placeholder written wherever a secret would otherwise be displayed.
pub const REDACTED: &str = "****";

/// Password or other credential material.
///
/// Serializing a `Secret` writes the plaintext; that is only done by the
/// canonical emitter for the rendered agent configuration.
#[derive(Clone, Default)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wraps a plaintext value
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Exposes the plaintext for emission
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Checks for an empty secret without exposing it
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", REDACTED)
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Secret {}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Where a resolved password came from. Never includes the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialProvenance {
    /// Entry the credential belongs to
    pub entry: String,
    /// Backend kind
    pub source: SourceKind,
    /// Variable name, secret id, or parameter name; `None` for plain
    pub reference: Option<String>,
    /// Region the lookup was scoped to, when applicable
    pub region: Option<String>,
}

/// Username and plaintext password ready for emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub username: String,
    pub password: Secret,
    pub provenance: CredentialProvenance,
}
