//! Directory service access over HTTP.
//!
//! [`HttpTransport`] turns queries into authenticated GET requests and maps
//! service faults onto [`SyncError`]. Sending is delegated to an
//! [`HttpClient`] so the engine itself carries no HTTP stack.

use crate::auth::TokenBroker;
use crate::config::ServiceEndpoint;
use crate::error::{SyncError, SyncResult};
use crate::transport::DirectoryTransport;
use dirsync_protocol::{
    Batch, DeltaQuery, FaultClass, ObjectQuery, RawRecord, RejectionKind, ServiceFault,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Authorization header.
pub const HEADER_AUTHORIZATION: &str = "Authorization";
/// Per-request correlation header.
pub const HEADER_CLIENT_REQUEST_ID: &str = "client-request-id";
/// Accept header.
pub const HEADER_ACCEPT: &str = "Accept";
/// Media type requested from the service.
pub const ACCEPT_MINIMAL_METADATA: &str = "application/json;odata=minimalmetadata";

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST with a form-encoded body.
    Post,
}

/// An outbound HTTP request.
///
/// Query and form pairs are unencoded; the client is responsible for encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Absolute URL without query string.
    pub url: String,
    /// Query-string parameters.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Form body parameters (POST only).
    pub form: Vec<(String, String)>,
}

impl HttpRequest {
    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            form: Vec::new(),
        }
    }

    /// Creates a form POST request.
    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            form,
        }
    }

    /// Sets the query-string parameters.
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the value of query parameter `name`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. An `Err`
/// means the request never produced a response (connection, DNS, timeout).
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String>;
}

/// HTTP-based directory transport.
///
/// Every request carries the broker's bearer credential, a fresh
/// correlation ID and the minimal-metadata JSON accept header.
pub struct HttpTransport<C: HttpClient> {
    endpoint: ServiceEndpoint,
    client: Arc<C>,
    broker: TokenBroker,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(endpoint: ServiceEndpoint, client: Arc<C>, broker: TokenBroker) -> Self {
        Self {
            endpoint,
            client,
            broker,
        }
    }

    /// Returns the service endpoint.
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Returns the token broker.
    pub fn broker(&self) -> &TokenBroker {
        &self.broker
    }

    fn get(&self, path: &str, query: Vec<(String, String)>) -> SyncResult<Vec<u8>> {
        let request = HttpRequest::get(self.endpoint.url(path))
            .with_query(query)
            .with_header(HEADER_AUTHORIZATION, self.broker.header()?)
            .with_header(HEADER_CLIENT_REQUEST_ID, Uuid::new_v4().to_string())
            .with_header(HEADER_ACCEPT, ACCEPT_MINIMAL_METADATA);

        debug!(endpoint = %request.url, "Making call to endpoint");
        debug!(query = %render_query(&request.query), "Query parameters");

        let response = self.client.send(&request).map_err(SyncError::Transport)?;
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(fault_error(&response))
        }
    }
}

impl<C: HttpClient> DirectoryTransport for HttpTransport<C> {
    fn fetch_changes(&self, query: &DeltaQuery) -> SyncResult<Batch> {
        let body = self.get(query.path(), query.query_pairs(&self.endpoint.api_version))?;
        Ok(Batch::decode(&body)?)
    }

    fn fetch_object(&self, query: &ObjectQuery) -> SyncResult<RawRecord> {
        let body = self.get(&query.path(), query.query_pairs(&self.endpoint.api_version))?;
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(serde_json::Value::Object(object)) => Ok(object),
            Ok(_) => Err(SyncError::MalformedResponse(format!(
                "object {} is not a JSON object",
                query.object_id
            ))),
            Err(e) => Err(SyncError::MalformedResponse(format!(
                "object {} is not JSON: {e}",
                query.object_id
            ))),
        }
    }

    fn invalidate_credentials(&self) {
        self.broker.invalidate();
    }
}

/// Maps an error response to the sync error taxonomy.
fn fault_error(response: &HttpResponse) -> SyncError {
    match ServiceFault::parse(&response.body) {
        Some(fault) => match fault.class() {
            FaultClass::AuthExpired => SyncError::AuthExpired(fault.message),
            FaultClass::Rejected(kind) => SyncError::rejected(kind, fault.code, fault.message),
        },
        None => SyncError::rejected(
            RejectionKind::Unknown,
            format!("HTTP {}", response.status),
            String::from_utf8_lossy(&response.body),
        ),
    }
}

fn render_query(query: &[(String, String)]) -> String {
    query
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}
