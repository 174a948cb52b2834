//! Credential resolver configuration.

use std::time::Duration;

use super::BackoffPolicy;
use crate::error::DbMonError;

/// Environment variable overriding [`ResolverConfig::max_concurrency`].
pub const ENV_MAX_CONCURRENCY: &str = "DBMON_MAX_CONCURRENCY";
/// Environment variable overriding [`ResolverConfig::deadline`] (seconds).
pub const ENV_DEADLINE_SECS: &str = "DBMON_DEADLINE_SECS";
/// Environment variable overriding [`ResolverConfig::attempt_timeout`] (seconds).
pub const ENV_ATTEMPT_TIMEOUT_SECS: &str = "DBMON_ATTEMPT_TIMEOUT_SECS";
/// Environment variable overriding [`BackoffPolicy::max_attempts`].
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "DBMON_RETRY_MAX_ATTEMPTS";

/// Upper bound for [`ResolverConfig::deadline`].
pub const MAX_DEADLINE: Duration = Duration::from_secs(60 * 60);
/// Upper bound for [`ResolverConfig::attempt_timeout`].
pub const MAX_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Tuning for the credential resolution stage.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use dbmon_core::credentials::ResolverConfig;
///
/// let config = ResolverConfig::new()
///     .with_max_concurrency(4)
///     .with_deadline(Duration::from_secs(30));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Maximum number of concurrent credential fetches.
    ///
    /// Default: 8
    pub max_concurrency: usize,

    /// Overall deadline for the whole resolution step.
    ///
    /// Entries still unresolved when it expires get a `Timeout` error.
    /// Default: 60s
    pub deadline: Duration,

    /// Timeout for a single backend attempt.
    ///
    /// Default: 10s
    pub attempt_timeout: Duration,

    /// Retry policy shared by every strategy
    pub backoff: BackoffPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            deadline: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl ResolverConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from `DBMON_*` environment variables.
    ///
    /// Unparseable or zero values are ignored with a warning and the default
    /// is kept. Durations above their upper bound are kept as given and
    /// rejected by [`ResolverConfig::validate`].
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = env_count(ENV_MAX_CONCURRENCY) {
            config = config.with_max_concurrency(value);
        }
        if let Some(value) = env_number(ENV_DEADLINE_SECS) {
            config = config.with_deadline(Duration::from_secs(value));
        }
        if let Some(value) = env_number(ENV_ATTEMPT_TIMEOUT_SECS) {
            config = config.with_attempt_timeout(Duration::from_secs(value));
        }
        if let Some(value) = env_count(ENV_RETRY_MAX_ATTEMPTS) {
            config.backoff = config.backoff.with_max_attempts(value);
        }
        config
    }

    /// Sets the maximum concurrency for credential fetches.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1); // Ensure at least 1
        self
    }

    /// Sets the overall resolution deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Sets the shared retry policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Validates resolver parameters.
    ///
    /// # Errors
    /// Returns a configuration error for zero or out-of-range durations, zero
    /// concurrency, or zero retry attempts
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_concurrency == 0 {
            return Err(DbMonError::configuration(
                "max_concurrency must be greater than 0",
            ));
        }

        if self.deadline.is_zero() {
            return Err(DbMonError::configuration("deadline must be greater than 0"));
        }

        if self.deadline > MAX_DEADLINE {
            return Err(DbMonError::configuration(format!(
                "deadline of {}s exceeds the maximum of {}s",
                self.deadline.as_secs(),
                MAX_DEADLINE.as_secs()
            )));
        }

        if self.attempt_timeout.is_zero() {
            return Err(DbMonError::configuration(
                "attempt_timeout must be greater than 0",
            ));
        }

        if self.attempt_timeout > MAX_ATTEMPT_TIMEOUT {
            return Err(DbMonError::configuration(format!(
                "attempt_timeout of {}s exceeds the maximum of {}s",
                self.attempt_timeout.as_secs(),
                MAX_ATTEMPT_TIMEOUT.as_secs()
            )));
        }

        if self.backoff.max_attempts == 0 {
            return Err(DbMonError::configuration(
                "retry max_attempts must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn env_count(name: &str) -> Option<usize> {
    let value = env_number(name)?;
    match usize::try_from(value) {
        Ok(count) => Some(count),
        Err(_) => {
            tracing::warn!("Ignoring value for {}: {} does not fit this platform", name, value);
            None
        }
    }
}

fn env_number(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!("Ignoring invalid value for {}: expected a positive integer", name);
            None
        }
    }
}
