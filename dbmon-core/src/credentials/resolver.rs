//! Bounded, deadline-aware credential resolution.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::strategy::{
    CredentialStrategy, EnvVarStrategy, PlainStrategy, SecretStore, SecretStoreStrategy,
    UnavailableStrategy,
};
use super::config::MAX_DEADLINE;
use super::{CredentialProvenance, ResolvedCredential, ResolverConfig, Secret};
use crate::error::CredentialResolutionError;
use crate::models::{DatabaseEntry, SourceKind};

/// Credential failure for one entry, with what was looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialFailure {
    pub entry: String,
    pub source: SourceKind,
    pub reference: Option<String>,
    pub region: Option<String>,
    pub error: CredentialResolutionError,
}

/// Outcome of resolving a batch of entries. Both lists follow input order.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub credentials: Vec<ResolvedCredential>,
    pub failures: Vec<CredentialFailure>,
}

impl Resolution {
    pub fn credential_for(&self, entry: &str) -> Option<&ResolvedCredential> {
        self.credentials
            .iter()
            .find(|credential| credential.provenance.entry == entry)
    }

    pub fn failure_for(&self, entry: &str) -> Option<&CredentialFailure> {
        self.failures.iter().find(|failure| failure.entry == entry)
    }

    /// Provenance of every resolved credential
    pub fn provenance(&self) -> Vec<CredentialProvenance> {
        self.credentials
            .iter()
            .map(|credential| credential.provenance.clone())
            .collect()
    }
}

/// Dispatches each entry to the strategy registered for its source kind.
///
/// # Example
/// ```rust
/// use dbmon_core::credentials::{CredentialResolver, ResolverConfig};
///
/// let resolver = CredentialResolver::new(ResolverConfig::default());
/// assert!(resolver.supports(dbmon_core::models::SourceKind::EnvVar));
/// ```
pub struct CredentialResolver {
    strategies: HashMap<SourceKind, Arc<dyn CredentialStrategy>>,
    config: ResolverConfig,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.strategies.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("CredentialResolver")
            .field("strategies", &kinds)
            .field("config", &self.config)
            .finish()
    }
}

impl CredentialResolver {
    /// Resolver with the plain and environment strategies registered.
    pub fn new(config: ResolverConfig) -> Self {
        let mut strategies: HashMap<SourceKind, Arc<dyn CredentialStrategy>> = HashMap::new();
        strategies.insert(SourceKind::Plain, Arc::new(PlainStrategy));
        strategies.insert(SourceKind::EnvVar, Arc::new(EnvVarStrategy::new()));
        Self { strategies, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn supports(&self, kind: SourceKind) -> bool {
        self.strategies.contains_key(&kind)
    }

    /// Registers or replaces the strategy for one source kind.
    pub fn with_strategy(mut self, kind: SourceKind, strategy: Arc<dyn CredentialStrategy>) -> Self {
        self.strategies.insert(kind, strategy);
        self
    }

    /// Registers a secret store for one source kind, wrapped with the
    /// resolver's shared backoff policy and attempt timeout.
    pub fn with_secret_store(self, kind: SourceKind, store: Arc<dyn SecretStore>) -> Self {
        let strategy = SecretStoreStrategy::new(
            store,
            self.config.backoff.clone(),
            self.config.attempt_timeout,
        );
        let strategy = if kind == SourceKind::AwsSecretsManager {
            strategy.with_json_password_field()
        } else {
            strategy
        };
        self.with_strategy(kind, Arc::new(strategy))
    }

    /// Marks every secret-store kind without a strategy as unavailable.
    pub fn with_unavailable_backends(mut self, reason: &str) -> Self {
        for kind in [SourceKind::AwsSecretsManager, SourceKind::AwsSsmParameter] {
            self.strategies
                .entry(kind)
                .or_insert_with(|| Arc::new(UnavailableStrategy::new(reason)));
        }
        self
    }

    /// Builds AWS clients for the regions `entries` need and registers the
    /// AWS strategies that are not registered yet.
    #[cfg(feature = "aws")]
    pub async fn with_aws_backends(
        self,
        entries: &[DatabaseEntry],
        default_region: Option<&str>,
    ) -> Self {
        use super::aws::{SecretsManagerStore, SsmParameterStore, default_region as resolve_region};

        let needs = |resolver: &Self, kind: SourceKind| {
            !resolver.supports(kind)
                && entries
                    .iter()
                    .any(|e| e.enabled && e.credentials.source.kind() == kind)
        };
        let pinned = || {
            entries
                .iter()
                .filter(|e| e.enabled)
                .filter_map(|e| e.credentials.source.region())
        };

        if !needs(&self, SourceKind::AwsSecretsManager) && !needs(&self, SourceKind::AwsSsmParameter) {
            return self;
        }

        let region = resolve_region(default_region).await;
        let mut resolver = self;
        if needs(&resolver, SourceKind::AwsSecretsManager) {
            let store = SecretsManagerStore::connect(&region, pinned()).await;
            resolver = resolver.with_secret_store(SourceKind::AwsSecretsManager, Arc::new(store));
        }
        if needs(&resolver, SourceKind::AwsSsmParameter) {
            let store = SsmParameterStore::connect(&region, pinned()).await;
            resolver = resolver.with_secret_store(SourceKind::AwsSsmParameter, Arc::new(store));
        }
        resolver
    }

    /// Resolves credentials for every enabled entry.
    ///
    /// At most `max_concurrency` fetches run at once. When the overall
    /// deadline expires, in-flight fetches are dropped and every unfinished
    /// entry gets a `Timeout` failure. One entry failing never affects the
    /// others.
    pub async fn resolve(&self, entries: &[DatabaseEntry]) -> Resolution {
        let targets: Vec<&DatabaseEntry> = entries.iter().filter(|e| e.enabled).collect();
        // Unvalidated configs may carry a deadline too large to add to an instant
        let deadline = tokio::time::Instant::now() + self.config.deadline.min(MAX_DEADLINE);
        let mut slots: Vec<Option<Result<Secret, CredentialResolutionError>>> =
            vec![None; targets.len()];

        info!(
            "Resolving credentials for {} entries (max concurrency {})",
            targets.len(),
            self.config.max_concurrency
        );

        let fetches = targets.iter().enumerate().map(|(index, entry)| async move {
            (index, self.resolve_entry(entry).await)
        });
        let mut stream = stream::iter(fetches).buffer_unordered(self.config.max_concurrency.max(1));

        loop {
            match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(Some((index, result))) => slots[index] = Some(result),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Credential resolution deadline of {}s expired; abandoning unfinished fetches",
                        self.config.deadline.as_secs()
                    );
                    break;
                }
            }
        }
        drop(stream);

        let mut resolution = Resolution::default();
        for (entry, slot) in targets.into_iter().zip(slots) {
            let source = &entry.credentials.source;
            let result = slot.unwrap_or_else(|| {
                Err(CredentialResolutionError::timeout(format!(
                    "{}: resolution deadline of {}s expired",
                    source.reference().unwrap_or(source.kind().as_str()),
                    self.config.deadline.as_secs()
                )))
            });
            match result {
                Ok(password) => resolution.credentials.push(ResolvedCredential {
                    username: entry.credentials.username.clone(),
                    password,
                    provenance: CredentialProvenance {
                        entry: entry.name.clone(),
                        source: source.kind(),
                        reference: source.reference().map(str::to_string),
                        region: source.region().map(str::to_string),
                    },
                }),
                Err(error) => {
                    warn!("Credential resolution failed for '{}': {}", entry.name, error);
                    resolution.failures.push(CredentialFailure {
                        entry: entry.name.clone(),
                        source: source.kind(),
                        reference: source.reference().map(str::to_string),
                        region: source.region().map(str::to_string),
                        error,
                    });
                }
            }
        }

        info!(
            "Credential resolution completed: {} resolved, {} failed",
            resolution.credentials.len(),
            resolution.failures.len()
        );
        resolution
    }

    async fn resolve_entry(&self, entry: &DatabaseEntry) -> Result<Secret, CredentialResolutionError> {
        let kind = entry.credentials.source.kind();
        debug!("Resolving credentials for '{}' via {}", entry.name, kind);
        match self.strategies.get(&kind) {
            Some(strategy) => strategy.resolve(&entry.credentials.source).await,
            None => Err(CredentialResolutionError::unavailable(format!(
                "{}: no backend configured for password_source={}",
                entry.credentials.source.reference().unwrap_or(kind.as_str()),
                kind
            ))),
        }
    }
}
