//! Credential resolution.
//!
//! Each password source kind has one [`CredentialStrategy`]. Secret-store
//! backends sit behind the [`SecretStore`] seam and share a single
//! [`BackoffPolicy`]. The [`CredentialResolver`] fans entries out over a
//! bounded worker pool and always returns a result per enabled entry.
//!
//! # Security
//! - Plaintext passwords live only in [`Secret`]
//! - Failures and provenance name the lookup key, never the value

mod backoff;
mod config;
mod resolver;
mod secret;
pub mod strategy;

#[cfg(feature = "aws")]
pub mod aws;

pub use backoff::BackoffPolicy;
pub use config::{
    ENV_ATTEMPT_TIMEOUT_SECS, ENV_DEADLINE_SECS, ENV_MAX_CONCURRENCY, ENV_RETRY_MAX_ATTEMPTS,
    MAX_ATTEMPT_TIMEOUT, MAX_DEADLINE, ResolverConfig,
};
pub use resolver::{CredentialFailure, CredentialResolver, Resolution};
pub use secret::{CredentialProvenance, REDACTED, ResolvedCredential, Secret};
pub use strategy::{CredentialStrategy, SecretStore};
