//! AWS Secrets Manager and SSM Parameter Store backends.
//!
//! Clients are built once per region before resolution starts and are shared
//! read-only by every fetch. SDK-level retries are disabled; the shared
//! [`BackoffPolicy`](super::BackoffPolicy) owns retrying.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_sdk_secretsmanager::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::config::Region;

use super::Secret;
use super::strategy::{FetchError, FetchErrorKind, SecretStore};

/// Region used when neither the entry, the CLI, nor the environment names one.
pub const FALLBACK_REGION: &str = "us-east-1";

/// Resolves the run's default region from an explicit value, then the AWS
/// provider chain, then [`FALLBACK_REGION`].
pub async fn default_region(explicit: Option<&str>) -> String {
    if let Some(region) = explicit {
        return region.to_string();
    }
    RegionProviderChain::default_provider()
        .region()
        .await
        .map_or_else(|| FALLBACK_REGION.to_string(), |r| r.as_ref().to_string())
}

async fn sdk_config(region: &str) -> aws_config::SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .retry_config(RetryConfig::disabled())
        .load()
        .await
}

fn classify<E, R>(err: &SdkError<E, R>) -> FetchError
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::TimeoutError(_) => FetchError::new(FetchErrorKind::Timeout, "request timed out"),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            FetchError::new(FetchErrorKind::Timeout, "connection timed out")
        }
        SdkError::DispatchFailure(_) => {
            FetchError::new(FetchErrorKind::Transient, "request dispatch failed")
        }
        SdkError::ResponseError(_) => {
            FetchError::new(FetchErrorKind::Transient, "malformed service response")
        }
        SdkError::ServiceError(service) => {
            let code = service.err().code().unwrap_or("Unknown");
            let kind = match code {
                "ResourceNotFoundException" | "ParameterNotFound" | "ParameterVersionNotFound" => {
                    FetchErrorKind::NotFound
                }
                "AccessDeniedException" | "AccessDenied" | "UnrecognizedClientException" => {
                    FetchErrorKind::AccessDenied
                }
                "ThrottlingException" | "InternalServiceError" | "InternalServerError"
                | "InternalFailure" | "ServiceUnavailable" => FetchErrorKind::Transient,
                _ => FetchErrorKind::Fatal,
            };
            FetchError::new(kind, code.to_string())
        }
        _ => FetchError::new(FetchErrorKind::Fatal, "request could not be constructed"),
    }
}

/// Distinct regions needed by a set of lookups plus the default region.
fn regions<'a>(
    default_region: &'a str,
    pinned: impl IntoIterator<Item = &'a str>,
) -> BTreeSet<&'a str> {
    let mut regions: BTreeSet<&str> = pinned.into_iter().collect();
    regions.insert(default_region);
    regions
}

/// Secrets Manager backend with one client per region.
#[derive(Debug, Clone)]
pub struct SecretsManagerStore {
    default_region: String,
    clients: HashMap<String, aws_sdk_secretsmanager::Client>,
}

impl SecretsManagerStore {
    /// Builds clients for the default region and every pinned region.
    pub async fn connect<'a>(
        default_region: &'a str,
        pinned_regions: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut clients = HashMap::new();
        for region in regions(default_region, pinned_regions) {
            let config = sdk_config(region).await;
            clients.insert(region.to_string(), aws_sdk_secretsmanager::Client::new(&config));
        }
        tracing::debug!("Built {} Secrets Manager client(s)", clients.len());
        Self {
            default_region: default_region.to_string(),
            clients,
        }
    }
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    fn name(&self) -> &'static str {
        "secretsmanager"
    }

    async fn fetch(&self, key: &str, region: Option<&str>) -> Result<Secret, FetchError> {
        let region = region.unwrap_or(&self.default_region);
        let client = self.clients.get(region).ok_or_else(|| {
            FetchError::new(FetchErrorKind::Fatal, format!("no client for region {}", region))
        })?;

        let output = client
            .get_secret_value()
            .secret_id(key)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        output.secret_string().map(Secret::new).ok_or_else(|| {
            FetchError::new(FetchErrorKind::Fatal, "secret has no string value")
        })
    }
}

/// SSM Parameter Store backend with one client per region.
#[derive(Debug, Clone)]
pub struct SsmParameterStore {
    default_region: String,
    clients: HashMap<String, aws_sdk_ssm::Client>,
}

impl SsmParameterStore {
    /// Builds clients for the default region and every pinned region.
    pub async fn connect<'a>(
        default_region: &'a str,
        pinned_regions: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut clients = HashMap::new();
        for region in regions(default_region, pinned_regions) {
            let config = sdk_config(region).await;
            clients.insert(region.to_string(), aws_sdk_ssm::Client::new(&config));
        }
        tracing::debug!("Built {} SSM client(s)", clients.len());
        Self {
            default_region: default_region.to_string(),
            clients,
        }
    }
}

#[async_trait]
impl SecretStore for SsmParameterStore {
    fn name(&self) -> &'static str {
        "ssm"
    }

    async fn fetch(&self, key: &str, region: Option<&str>) -> Result<Secret, FetchError> {
        let region = region.unwrap_or(&self.default_region);
        let client = self.clients.get(region).ok_or_else(|| {
            FetchError::new(FetchErrorKind::Fatal, format!("no client for region {}", region))
        })?;

        let output = client
            .get_parameter()
            .name(key)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        output
            .parameter()
            .and_then(|p| p.value())
            .map(Secret::new)
            .ok_or_else(|| FetchError::new(FetchErrorKind::Fatal, "parameter has no value"))
    }
}
