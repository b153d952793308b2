//! Bearer credential acquisition and caching.
//!
//! The [`TokenBroker`] hands out the `Authorization` header value, acquiring
//! it from a [`CredentialProvider`] on first use and caching it until
//! [`TokenBroker::invalidate`] is called after an expiry fault.

use crate::config::CredentialConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, HttpRequest};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A short-lived bearer token.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct AccessToken {
    /// Token type, e.g. `Bearer`.
    pub token_type: String,
    /// Token value.
    pub access_token: String,
}

impl AccessToken {
    /// Creates a token.
    pub fn new(token_type: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            token_type: token_type.into(),
            access_token: access_token.into(),
        }
    }

    /// Value of the outbound `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token_type", &self.token_type)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Source of bearer tokens.
pub trait CredentialProvider: Send + Sync {
    /// Exchanges long-lived application credentials for a bearer token.
    fn acquire(&self) -> SyncResult<AccessToken>;
}

/// Caches the credential header between requests.
pub struct TokenBroker {
    provider: Box<dyn CredentialProvider>,
    cached: Mutex<Option<String>>,
}

impl TokenBroker {
    /// Creates a broker over `provider`.
    pub fn new(provider: impl CredentialProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            cached: Mutex::new(None),
        }
    }

    /// Returns the header value, acquiring a credential if none is cached.
    pub fn header(&self) -> SyncResult<String> {
        let mut cached = self.cached.lock();
        if let Some(header) = cached.as_ref() {
            return Ok(header.clone());
        }

        let header = self.provider.acquire()?.header_value();
        debug!("Acquired bearer credential");
        *cached = Some(header.clone());
        Ok(header)
    }

    /// Clears the cached credential.
    pub fn invalidate(&self) {
        if self.cached.lock().take().is_some() {
            info!("Invalidated cached credential");
        }
    }

    /// Returns true if a credential is cached.
    pub fn is_cached(&self) -> bool {
        self.cached.lock().is_some()
    }
}

impl std::fmt::Debug for TokenBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBroker")
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// OAuth2 client-credentials exchange against a token endpoint.
pub struct ClientCredentialsProvider<C: HttpClient> {
    config: CredentialConfig,
    tenant: String,
    client: Arc<C>,
}

impl<C: HttpClient> ClientCredentialsProvider<C> {
    /// Creates a provider for `tenant`.
    pub fn new(config: CredentialConfig, tenant: impl Into<String>, client: Arc<C>) -> Self {
        Self {
            config,
            tenant: tenant.into(),
            client,
        }
    }

    fn request(&self) -> HttpRequest {
        HttpRequest::post_form(
            self.config.token_url_for(&self.tenant),
            vec![
                ("grant_type".to_string(), "client_credentials".to_string()),
                ("resource".to_string(), self.config.resource.clone()),
                ("client_id".to_string(), self.config.client_id.clone()),
                ("client_secret".to_string(), self.config.client_secret.clone()),
            ],
        )
    }
}

impl<C: HttpClient> CredentialProvider for ClientCredentialsProvider<C> {
    fn acquire(&self) -> SyncResult<AccessToken> {
        let request = self.request();
        debug!(endpoint = %request.url, client_id = %self.config.client_id, "Requesting bearer credential");

        let response = self.client.send(&request).map_err(SyncError::Transport)?;
        if !response.is_success() {
            return Err(SyncError::Credential(format!(
                "token endpoint returned {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            )));
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Credential(format!("failed to parse token response: {e}")))
    }
}

/// A provider returning a fixed token.
///
/// Counts acquisitions so tests can observe cache behaviour.
#[derive(Debug)]
pub struct StaticCredentials {
    token: AccessToken,
    acquisitions: AtomicU64,
}

impl StaticCredentials {
    /// Creates a provider returning `token`.
    pub fn new(token: AccessToken) -> Self {
        Self {
            token,
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Number of times a token was handed out.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

impl CredentialProvider for StaticCredentials {
    fn acquire(&self) -> SyncResult<AccessToken> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.clone())
    }
}

impl<P: CredentialProvider + ?Sized> CredentialProvider for Arc<P> {
    fn acquire(&self) -> SyncResult<AccessToken> {
        (**self).acquire()
    }
}
