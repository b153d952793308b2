//! Configuration for the sync engine.

use dirsync_protocol::{DeltaQuery, DEFAULT_RESOURCE_SET};
use serde::Deserialize;
use std::time::Duration;

/// Default interval between polls once the replica is caught up.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default service API version.
pub const DEFAULT_API_VERSION: &str = "1.5";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Resource set to query.
    pub resource_set: String,
    /// Object kinds to request (empty = all).
    pub object_kinds: Vec<String>,
    /// Properties to project (empty = all).
    pub properties: Vec<String>,
    /// Sleep after a delta batch before polling again.
    pub poll_interval: Duration,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration for the default resource set.
    pub fn new() -> Self {
        Self {
            resource_set: DEFAULT_RESOURCE_SET.to_string(),
            object_kinds: Vec::new(),
            properties: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the resource set.
    pub fn with_resource_set(mut self, resource_set: impl Into<String>) -> Self {
        self.resource_set = resource_set.into();
        self
    }

    /// Restricts sync to the given object kinds.
    pub fn with_object_kinds(mut self, kinds: Vec<String>) -> Self {
        self.object_kinds = kinds;
        self
    }

    /// Projects the given properties.
    pub fn with_properties(mut self, properties: Vec<String>) -> Self {
        self.properties = properties;
        self
    }

    /// Sets the polling interval.
    ///
    /// The failure backoff follows the polling interval unless set explicitly
    /// with [`RetryConfig::with_backoff_interval`].
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Interval slept after a failed cycle.
    pub fn backoff_interval(&self) -> Duration {
        self.retry.backoff_interval.unwrap_or(self.poll_interval)
    }

    /// Builds the differential query resuming from `token`.
    pub fn delta_query(&self, token: &str) -> DeltaQuery {
        DeltaQuery::new(self.resource_set.clone(), token)
            .with_object_kinds(self.object_kinds.iter().cloned())
            .with_properties(self.properties.iter().cloned())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per remote call when the credential expires, first call included.
    pub max_attempts: u32,
    /// Sleep after a failed cycle; `None` follows the polling interval.
    pub backoff_interval: Option<Duration>,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_interval: None,
        }
    }

    /// Creates a configuration with no credential retries.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Sets the failure backoff interval.
    pub fn with_backoff_interval(mut self, interval: Duration) -> Self {
        self.backoff_interval = Some(interval);
        self
    }

    /// Effective attempt bound, never below one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Location of the directory service.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Service host, e.g. `graph.windows.net`.
    pub host: String,
    /// Tenant domain name.
    pub tenant: String,
    /// API version sent with every request.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl ServiceEndpoint {
    /// Creates an endpoint with the default API version.
    pub fn new(host: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            tenant: tenant.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    /// Sets the API version.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Absolute URL of `path` under the tenant root.
    pub fn url(&self, path: &str) -> String {
        format!("https://{}/{}/{}", self.host, self.tenant, path)
    }
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

/// Application credentials exchanged for a bearer token.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct CredentialConfig {
    /// Token endpoint; `{tenant}` is replaced by the tenant domain.
    pub token_url: String,
    /// Identifier of the protected resource (the directory service).
    pub resource: String,
    /// Application client ID.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: String,
}

impl CredentialConfig {
    /// Resolves the token endpoint for `tenant`.
    pub fn token_url_for(&self, tenant: &str) -> String {
        self.token_url.replace("{tenant}", tenant)
    }
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("token_url", &self.token_url)
            .field("resource", &self.resource)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}
