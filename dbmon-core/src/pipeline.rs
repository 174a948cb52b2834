//! End-to-end run: normalize, merge defaults, resolve credentials, validate,
//! emit.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::credentials::{
    CredentialProvenance, CredentialResolver, CredentialStrategy, Resolution, ResolverConfig,
    SecretStore,
};
use crate::defaults::merge_defaults;
use crate::emit::{CanonicalDocument, ExcludedEntry, emit};
use crate::error::Result;
use crate::models::{DatabaseEntry, MonitoringConfig, SourceKind};
use crate::normalize::{normalize, read_documents};
use crate::validation::{ValidationReport, Validator};

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Merged configuration the document was built from
    pub config: MonitoringConfig,
    pub document: CanonicalDocument,
    pub report: ValidationReport,
    pub excluded: Vec<ExcludedEntry>,
    /// Where each emitted password came from; empty for offline runs
    pub provenance: Vec<CredentialProvenance>,
}

impl PipelineOutcome {
    pub fn has_errors(&self) -> bool {
        self.report.has_errors()
    }
}

/// Configured pipeline. Holds no per-run state and can be reused.
///
/// # Example
/// ```rust,no_run
/// use dbmon_core::credentials::ResolverConfig;
/// use dbmon_core::pipeline::Pipeline;
///
/// # async fn example() -> dbmon_core::Result<()> {
/// let outcome = Pipeline::new(ResolverConfig::from_env())
///     .with_region(Some("us-east-1".to_string()))
///     .run_paths(&["databases.yml".into()])
///     .await?;
/// println!("{} entries emitted", outcome.document.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    resolver_config: ResolverConfig,
    default_region: Option<String>,
    offline: bool,
    strategies: Vec<(SourceKind, Arc<dyn CredentialStrategy>)>,
    stores: Vec<(SourceKind, Arc<dyn SecretStore>)>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("resolver_config", &self.resolver_config)
            .field("default_region", &self.default_region)
            .field("offline", &self.offline)
            .field("strategies", &self.strategies.len())
            .field("stores", &self.stores.len())
            .finish()
    }
}

impl Pipeline {
    pub fn new(resolver_config: ResolverConfig) -> Self {
        Self {
            resolver_config,
            ..Self::default()
        }
    }

    /// Region for secret-store lookups that do not pin one
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.default_region = region;
        self
    }

    /// Skips credential resolution; only plain passwords can be emitted.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Replaces the strategy for one source kind
    pub fn with_strategy(mut self, kind: SourceKind, strategy: Arc<dyn CredentialStrategy>) -> Self {
        self.strategies.push((kind, strategy));
        self
    }

    /// Uses `store` for one secret-store kind instead of the AWS client
    pub fn with_secret_store(mut self, kind: SourceKind, store: Arc<dyn SecretStore>) -> Self {
        self.stores.push((kind, store));
        self
    }

    /// Reads and runs the given documents in order.
    ///
    /// # Errors
    /// Returns an error if a document cannot be read or parsed, or on any
    /// fatal error from [`Pipeline::run`].
    pub async fn run_paths(&self, paths: &[PathBuf]) -> Result<PipelineOutcome> {
        let documents = read_documents(paths).await?;
        self.run(&documents).await
    }

    /// Runs all five stages over parsed documents.
    ///
    /// # Errors
    /// Returns an error for malformed documents, duplicate entry names, or an
    /// invalid resolver configuration. Per-entry problems never fail the
    /// run, including an item failing the output self-check; they are in
    /// [`PipelineOutcome::report`].
    pub async fn run(&self, documents: &[Value]) -> Result<PipelineOutcome> {
        self.resolver_config.validate()?;

        let config = merge_defaults(normalize(documents)?);
        debug!(
            "Normalized {} entries ({} rejected)",
            config.entries.len(),
            config.rejected.len()
        );

        let resolution = if self.offline {
            info!("Offline run: skipping credential resolution");
            None
        } else {
            let resolver = self.resolver(&config.entries).await;
            Some(resolver.resolve(&config.entries).await)
        };

        let mut report = Validator::new()?.validate(&config, resolution.as_ref());
        let emission = emit(&config, &report, resolution.as_ref())?;
        report.extend(emission.issues);

        Ok(PipelineOutcome {
            config,
            document: emission.document,
            report,
            excluded: emission.excluded,
            provenance: resolution
                .as_ref()
                .map(Resolution::provenance)
                .unwrap_or_default(),
        })
    }

    async fn resolver(&self, entries: &[DatabaseEntry]) -> CredentialResolver {
        let mut resolver = CredentialResolver::new(self.resolver_config.clone());
        for (kind, strategy) in &self.strategies {
            resolver = resolver.with_strategy(*kind, Arc::clone(strategy));
        }
        for (kind, store) in &self.stores {
            resolver = resolver.with_secret_store(*kind, Arc::clone(store));
        }

        #[cfg(feature = "aws")]
        {
            resolver = resolver
                .with_aws_backends(entries, self.default_region.as_deref())
                .await;
        }
        #[cfg(not(feature = "aws"))]
        {
            debug!(
                "AWS support not compiled in; {} entries, default region {:?}",
                entries.len(),
                self.default_region
            );
        }

        resolver.with_unavailable_backends("AWS support is not compiled into this build")
    }
}
