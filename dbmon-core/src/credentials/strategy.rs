//! One credential strategy per password source kind.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use serde::Deserialize;

use super::{BackoffPolicy, Secret};
use crate::error::{CredentialErrorKind, CredentialResolutionError};
use crate::models::PasswordSource;

/// Failure reported by a [`SecretStore`] for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

/// Classification of a single backend attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    NotFound,
    AccessDenied,
    /// The attempt exceeded its own timeout
    Timeout,
    /// Throttling, dispatch failures, 5xx responses
    Transient,
    /// Anything else; not retried
    Fatal,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Only timeouts and transient failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Timeout | FetchErrorKind::Transient)
    }

    fn into_resolution_error(self, reference: &str) -> CredentialResolutionError {
        let kind = match self.kind {
            FetchErrorKind::NotFound => CredentialErrorKind::NotFound,
            FetchErrorKind::AccessDenied => CredentialErrorKind::AccessDenied,
            FetchErrorKind::Timeout => CredentialErrorKind::Timeout,
            FetchErrorKind::Transient | FetchErrorKind::Fatal => CredentialErrorKind::Unavailable,
        };
        let detail = match kind {
            CredentialErrorKind::NotFound => reference.to_string(),
            _ => format!("{}: {}", reference, self.message),
        };
        CredentialResolutionError::new(kind, detail)
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Key/value secret backend, one implementation per cloud service.
///
/// Implementations perform exactly one attempt per call; retries and
/// timeouts are applied by [`SecretStoreStrategy`].
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Short backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Fetches the raw secret string for `key`, optionally pinned to `region`.
    async fn fetch(&self, key: &str, region: Option<&str>) -> Result<Secret, FetchError>;
}

/// Resolves the password of one source kind.
#[async_trait]
pub trait CredentialStrategy: Send + Sync {
    /// Produces the plaintext password for `source`.
    ///
    /// # Errors
    /// Returns a classified error; the value that failed to load is never
    /// part of it.
    async fn resolve(&self, source: &PasswordSource) -> Result<Secret, CredentialResolutionError>;
}

/// Literal password from the document.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainStrategy;

#[async_trait]
impl CredentialStrategy for PlainStrategy {
    async fn resolve(&self, source: &PasswordSource) -> Result<Secret, CredentialResolutionError> {
        match source {
            PasswordSource::Plain { password } => Ok(password.clone()),
            other => Err(mismatched(other)),
        }
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Password read from an environment variable.
#[derive(Clone)]
pub struct EnvVarStrategy {
    lookup: EnvLookup,
}

impl Default for EnvVarStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvVarStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvVarStrategy").finish_non_exhaustive()
    }
}

impl EnvVarStrategy {
    /// Reads the process environment
    pub fn new() -> Self {
        Self {
            lookup: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Reads from a fixed map instead of the process environment
    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self {
            lookup: Arc::new(move |name| vars.get(name).cloned()),
        }
    }
}

#[async_trait]
impl CredentialStrategy for EnvVarStrategy {
    async fn resolve(&self, source: &PasswordSource) -> Result<Secret, CredentialResolutionError> {
        let PasswordSource::EnvVar { variable } = source else {
            return Err(mismatched(source));
        };
        match (self.lookup)(variable) {
            Some(value) => Ok(Secret::new(value)),
            None => Err(CredentialResolutionError::not_found(variable.clone())),
        }
    }
}

/// Password fetched from a [`SecretStore`] with retries and per-attempt timeouts.
pub struct SecretStoreStrategy {
    store: Arc<dyn SecretStore>,
    backoff: BackoffPolicy,
    attempt_timeout: Duration,
    /// Unwrap `{"password": ...}` JSON documents (Secrets Manager convention)
    json_password_field: bool,
}

impl fmt::Debug for SecretStoreStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStoreStrategy")
            .field("store", &self.store.name())
            .field("backoff", &self.backoff)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl SecretStoreStrategy {
    pub fn new(store: Arc<dyn SecretStore>, backoff: BackoffPolicy, attempt_timeout: Duration) -> Self {
        Self {
            store,
            backoff,
            attempt_timeout,
            json_password_field: false,
        }
    }

    /// Extracts the `password` key when the stored value is a JSON object.
    pub fn with_json_password_field(mut self) -> Self {
        self.json_password_field = true;
        self
    }

    async fn attempt(&self, key: &str, region: Option<&str>) -> Result<Secret, FetchError> {
        match tokio::time::timeout(self.attempt_timeout, self.store.fetch(key, region)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::new(
                FetchErrorKind::Timeout,
                format!(
                    "{} did not answer within {:.1}s",
                    self.store.name(),
                    self.attempt_timeout.as_secs_f32()
                ),
            )),
        }
    }

    fn unwrap_value(&self, raw: Secret) -> Secret {
        if !self.json_password_field {
            return raw;
        }
        match serde_json::from_str::<SecretDocument>(raw.expose()) {
            Ok(SecretDocument {
                password: Some(password),
            }) => password,
            _ => raw,
        }
    }
}

/// JSON secret body. Only `password` is kept; other fields are skipped
/// without being copied.
#[derive(Deserialize)]
struct SecretDocument {
    password: Option<Secret>,
}

#[async_trait]
impl CredentialStrategy for SecretStoreStrategy {
    async fn resolve(&self, source: &PasswordSource) -> Result<Secret, CredentialResolutionError> {
        let (key, region) = match source {
            PasswordSource::AwsSecretsManager { key, region }
            | PasswordSource::AwsSsmParameter { key, region } => (key.as_str(), region.as_deref()),
            other => return Err(mismatched(other)),
        };

        let raw = (|| self.attempt(key, region))
            .retry(self.backoff.builder())
            .when(FetchError::is_retryable)
            .notify(|err: &FetchError, dur: Duration| {
                tracing::warn!(
                    backend = self.store.name(),
                    key = %key,
                    error = %err,
                    "Credential fetch failed. Retrying in {:.1}s",
                    dur.as_secs_f32()
                );
            })
            .await
            .map_err(|err| err.into_resolution_error(key))?;

        Ok(self.unwrap_value(raw))
    }
}

/// Stands in for a backend that could not be configured for this run.
#[derive(Debug, Clone)]
pub struct UnavailableStrategy {
    reason: String,
}

impl UnavailableStrategy {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CredentialStrategy for UnavailableStrategy {
    async fn resolve(&self, source: &PasswordSource) -> Result<Secret, CredentialResolutionError> {
        let reference = source.reference().unwrap_or(source.kind().as_str());
        Err(CredentialResolutionError::unavailable(format!(
            "{}: {}",
            reference, self.reason
        )))
    }
}

fn mismatched(source: &PasswordSource) -> CredentialResolutionError {
    CredentialResolutionError::unavailable(format!(
        "no strategy registered for password_source={}",
        source.kind()
    ))
}
