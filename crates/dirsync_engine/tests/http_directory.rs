//! End-to-end sync through the HTTP transport against a fake directory.

use dirsync_engine::{
    ClientCredentialsProvider, CredentialConfig, HttpClient, HttpMethod, HttpRequest,
    HttpResponse, HttpTransport, MemoryContinuationStore, MemoryReplica, RecordingSleeper,
    ServiceEndpoint, SyncConfig, SyncError, SyncLoop, TokenBroker,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const TOKEN_URL: &str = "https://login.example.com/contoso/oauth2/token";
const DELTA_URL: &str = "https://graph.example.com/contoso/directoryObjects";

/// Serves the token endpoint and the directory service.
///
/// Pages are keyed by the token exactly as it appears in the issued links,
/// and requests are matched on the percent-encoded form a client sends.
#[derive(Default)]
struct FakeDirectory {
    pages: HashMap<String, Value>,
    sent_tokens: Mutex<Vec<String>>,
    objects: HashMap<String, Value>,
    expired: Mutex<HashSet<String>>,
    issued: Mutex<u32>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeDirectory {
    fn page(mut self, token: &str, body: Value) -> Self {
        self.pages.insert(token.to_string(), body);
        self
    }

    fn object(mut self, id: &str, body: Value) -> Self {
        self.objects.insert(id.to_string(), body);
        self
    }

    fn expire(self, header: &str) -> Self {
        self.expired.lock().insert(header.to_string());
        self
    }

    fn sent_tokens(&self) -> Vec<String> {
        self.sent_tokens.lock().clone()
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    fn json(status: u16, body: Value) -> HttpResponse {
        HttpResponse::new(status, body.to_string().into_bytes())
    }

    fn fault(status: u16, code: &str) -> HttpResponse {
        Self::json(
            status,
            json!({ "odata.error": { "code": code, "message": { "lang": "en", "value": code } } }),
        )
    }

    fn issue_token(&self, request: &HttpRequest) -> HttpResponse {
        let form: HashMap<&str, &str> = request
            .form
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if form.get("client_secret") != Some(&"s3cret") {
            return Self::json(401, json!({ "error": "invalid_client" }));
        }
        let mut issued = self.issued.lock();
        *issued += 1;
        Self::json(
            200,
            json!({ "token_type": "Bearer", "access_token": format!("tok-{}", *issued) }),
        )
    }
}

impl HttpClient for FakeDirectory {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        self.requests.lock().push(request.clone());

        if request.method == HttpMethod::Post && request.url == TOKEN_URL {
            return Ok(self.issue_token(request));
        }

        let header = request.header("Authorization").unwrap_or_default();
        if self.expired.lock().contains(header) {
            return Ok(Self::fault(401, "Authentication_ExpiredToken"));
        }

        if request.url == DELTA_URL {
            let token = request.query_param("deltaLink").unwrap_or_default();
            let wire = urlencoding::encode(token).into_owned();
            self.sent_tokens.lock().push(wire.clone());
            return Ok(match self.pages.get(&wire) {
                Some(page) => Self::json(200, page.clone()),
                None => Self::fault(400, "Request_InvalidReplicaSessionKey"),
            });
        }

        let object = request
            .url
            .strip_prefix("https://graph.example.com/contoso/directoryObjects('")
            .and_then(|rest| rest.strip_suffix("')"));
        match object.and_then(|id| self.objects.get(id)) {
            Some(body) => Ok(Self::json(200, body.clone())),
            None => Ok(Self::fault(404, "Request_ResourceNotFound")),
        }
    }
}

fn credentials(secret: &str) -> CredentialConfig {
    CredentialConfig {
        token_url: "https://login.example.com/{tenant}/oauth2/token".into(),
        resource: "00000002-0000-0000-c000-000000000000".into(),
        client_id: "app".into(),
        client_secret: secret.into(),
    }
}

fn transport(directory: &Arc<FakeDirectory>, secret: &str) -> HttpTransport<FakeDirectory> {
    let endpoint = ServiceEndpoint::new("graph.example.com", "contoso");
    let provider =
        ClientCredentialsProvider::new(credentials(secret), "contoso", Arc::clone(directory));
    HttpTransport::new(endpoint, Arc::clone(directory), TokenBroker::new(provider))
}

fn link(token: &str) -> String {
    format!("{DELTA_URL}?deltaLink={token}")
}

#[test]
fn full_sync_over_http() {
    let directory = Arc::new(
        FakeDirectory::default()
            .page(
                "",
                json!({
                    "aad.nextLink": link("page2"),
                    "value": [
                        { "odata.type": "Microsoft.WindowsAzure.ActiveDirectory.User", "objectId": "A", "displayName": "Alice" },
                        { "odata.type": "Microsoft.WindowsAzure.ActiveDirectory.DirectoryLinkChange", "sourceObjectId": "A", "targetObjectId": "G" }
                    ]
                }),
            )
            .page(
                "page2",
                json!({
                    "aad.deltaLink": link("caught-up"),
                    "value": [
                        { "odata.type": "Microsoft.WindowsAzure.ActiveDirectory.Contact", "objectId": "C", "aad.isSoftDeleted": false }
                    ]
                }),
            )
            .object(
                "G",
                json!({ "odata.type": "Microsoft.WindowsAzure.ActiveDirectory.Group", "objectId": "G", "displayName": "Staff" }),
            ),
    );
    let store = Arc::new(MemoryContinuationStore::new());
    let config = SyncConfig::new().with_object_kinds(vec!["User".into(), "Group".into()]);
    let mut sync = SyncLoop::new(
        config,
        transport(&directory, "s3cret"),
        MemoryReplica::new(),
        Arc::clone(&store),
    )
    .with_sleeper(RecordingSleeper::new());

    let report = sync.sync_until_caught_up().unwrap();
    assert_eq!(report.applied, 3);
    assert_eq!(report.endpoints_fetched, 1);
    assert_eq!(store.history(), vec!["page2", "caught-up"]);

    let replica = sync.replica();
    assert!(replica.contains_node("A"));
    assert!(replica.contains_node("C"));
    assert!(replica.contains_node("G"));
    assert!(replica.contains_edge("A", "G"));

    let requests = directory.requests();
    assert_eq!(requests[0].url, TOKEN_URL);
    let delta = requests.iter().find(|r| r.url == DELTA_URL).unwrap();
    assert_eq!(delta.query_param("api-version"), Some("1.5"));
    assert_eq!(
        delta.query_param("$filter"),
        Some("isof('User') or isof('Group')")
    );
    assert_eq!(delta.header("Authorization"), Some("Bearer tok-1"));

    // The credential is acquired once and reused.
    let token_requests = requests.iter().filter(|r| r.url == TOKEN_URL).count();
    assert_eq!(token_requests, 1);
}

#[test]
fn encoded_token_round_trips() {
    let directory = Arc::new(
        FakeDirectory::default()
            .page(
                "",
                json!({ "aad.nextLink": link("Ab%2BCd%3D"), "value": [] }),
            )
            .page(
                "Ab%2BCd%3D",
                json!({
                    "aad.deltaLink": link("Zz%2F9%3D%3D"),
                    "value": [{ "odata.type": "User", "objectId": "A" }]
                }),
            ),
    );
    let store = Arc::new(MemoryContinuationStore::new());
    let mut sync = SyncLoop::new(
        SyncConfig::new(),
        transport(&directory, "s3cret"),
        MemoryReplica::new(),
        Arc::clone(&store),
    );

    let report = sync.sync_until_caught_up().unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(directory.sent_tokens(), vec!["", "Ab%2BCd%3D"]);
    assert_eq!(store.history(), vec!["Ab+Cd=", "Zz/9=="]);
}

#[test]
fn expired_credential_is_reacquired() {
    let directory = Arc::new(
        FakeDirectory::default()
            .page(
                "",
                json!({
                    "aad.deltaLink": link("d1"),
                    "value": [{ "odata.type": "User", "objectId": "A" }]
                }),
            )
            .expire("Bearer tok-1"),
    );
    let mut sync = SyncLoop::new(
        SyncConfig::new(),
        transport(&directory, "s3cret"),
        MemoryReplica::new(),
        MemoryContinuationStore::new(),
    );

    assert!(sync.run_cycle().unwrap().is_advanced());
    assert!(sync.replica().contains_node("A"));
    assert_eq!(sync.stats().auth_retries, 1);

    let token_requests = directory
        .requests()
        .iter()
        .filter(|r| r.url == TOKEN_URL)
        .count();
    assert_eq!(token_requests, 2);
}

#[test]
fn stale_token_is_rejected_without_retry() {
    let directory = Arc::new(FakeDirectory::default());
    let mut sync = SyncLoop::new(
        SyncConfig::new(),
        transport(&directory, "s3cret"),
        MemoryReplica::new(),
        MemoryContinuationStore::with_token("unknown"),
    );

    let err = sync.sync_until_caught_up().unwrap_err();
    match err {
        SyncError::Rejected { code, .. } => assert_eq!(code, "Request_InvalidReplicaSessionKey"),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(sync.token(), Some("unknown"));
}

#[test]
fn bad_client_secret_fails_the_cycle() {
    let directory = Arc::new(FakeDirectory::default());
    let mut sync = SyncLoop::new(
        SyncConfig::new(),
        transport(&directory, "wrong"),
        MemoryReplica::new(),
        MemoryContinuationStore::new(),
    );

    let err = sync.sync_until_caught_up().unwrap_err();
    assert!(matches!(err, SyncError::Credential(_)));
}
