//! Shared retry policy for credential backend calls.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Exponential backoff applied to every secret-store fetch.
///
/// One policy object is built per run and handed to every strategy, so all
/// backends retry the same way. The retry budget is per fetch: each call to
/// [`BackoffPolicy::builder`] starts from zero.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use dbmon_core::credentials::BackoffPolicy;
///
/// let policy = BackoffPolicy::default()
///     .with_max_attempts(5)
///     .with_base_delay(Duration::from_millis(50));
/// assert_eq!(policy.max_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts including the first one.
    ///
    /// Default: 3
    pub max_attempts: usize,
    /// Delay before the first retry.
    ///
    /// Default: 200ms
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    ///
    /// Default: 5s
    pub max_delay: Duration,
    /// Randomize delays to avoid synchronized retries.
    ///
    /// Default: true
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Policy that performs exactly one attempt
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the total number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1); // Ensure at least 1
        self
    }

    /// Sets the delay before the first retry.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the maximum delay between attempts.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Number of retries after the first attempt
    pub fn retries(&self) -> usize {
        self.max_attempts.saturating_sub(1)
    }

    /// Fresh backoff builder for one fetch.
    pub fn builder(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay.max(self.base_delay))
            .with_factor(2.0)
            .with_max_times(self.retries());
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}
