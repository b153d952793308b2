//! JSON settings file.

use dirsync_engine::{CredentialConfig, RetryConfig, ServiceEndpoint, SyncConfig};
use dirsync_protocol::DEFAULT_RESOURCE_SET;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading the settings file.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The file could not be read.
    #[error("cannot read settings file {path:?}: {source}")]
    Read {
        /// Settings path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid settings JSON.
    #[error("invalid settings file {path:?}: {source}")]
    Parse {
        /// Settings path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Everything needed to run a sync.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Directory service location.
    pub endpoint: ServiceEndpoint,
    /// Application credentials.
    pub credentials: CredentialConfig,
    /// Where the continuation token is kept.
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    /// Optional JSON-lines file receiving every detected change.
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
    /// Seconds between polls once caught up.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Seconds to wait after a failed cycle; defaults to the poll interval.
    #[serde(default)]
    pub backoff_interval_secs: Option<u64>,
    /// Attempts per call when the credential expires.
    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: u32,
    /// Resource set to query.
    #[serde(default = "default_resource_set")]
    pub resource_set: String,
    /// Object kinds to request (empty = all).
    #[serde(default)]
    pub object_kinds: Vec<String>,
    /// Properties to request (empty = all).
    #[serde(default)]
    pub properties: Vec<String>,
}

fn default_token_path() -> PathBuf {
    PathBuf::from("continuation.token")
}

fn default_poll_interval_secs() -> u64 {
    dirsync_engine::DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_max_auth_attempts() -> u32 {
    RetryConfig::default().max_attempts
}

fn default_resource_set() -> String {
    DEFAULT_RESOURCE_SET.to_string()
}

impl Settings {
    /// Reads settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses settings from JSON text.
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    /// Applies command-line overrides.
    pub fn with_overrides(mut self, tenant: Option<String>, poll_interval_secs: Option<u64>) -> Self {
        if let Some(tenant) = tenant {
            self.endpoint.tenant = tenant;
        }
        if let Some(secs) = poll_interval_secs {
            self.poll_interval_secs = secs;
        }
        self
    }

    /// Builds the engine configuration.
    pub fn sync_config(&self) -> SyncConfig {
        let mut retry = RetryConfig::new(self.max_auth_attempts);
        if let Some(secs) = self.backoff_interval_secs {
            retry = retry.with_backoff_interval(Duration::from_secs(secs));
        }
        SyncConfig::new()
            .with_resource_set(self.resource_set.clone())
            .with_object_kinds(self.object_kinds.clone())
            .with_properties(self.properties.clone())
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_retry(retry)
    }
}
