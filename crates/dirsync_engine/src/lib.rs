//! # dirsync Engine
//!
//! Differential sync of a directory service into a local replica.
//!
//! This crate provides:
//! - Sync loop state machine (idle → fetching → processing → persisting)
//! - Continuation token persistence
//! - Node and edge reconciliation with on-demand endpoint repair
//! - Bounded credential retry on expired tokens
//! - HTTP transport abstraction with a cached bearer token
//! - Optional change journal
//!
//! ## Architecture
//!
//! Each cycle fetches one batch of changes from the current continuation
//! token, applies every record to the replica independently, then persists
//! the token the batch returned:
//! 1. Fetch (re-acquiring the credential on expiry)
//! 2. Route each record to the node or edge reconciler
//! 3. Persist the new token, even if some records failed
//! 4. Loop immediately while the service has more data, else sleep
//!
//! ## Key Invariants
//!
//! - Tokens advance strictly in fetch order
//! - A failed fetch never advances the token
//! - Reconciliation is idempotent, so replaying a batch is harmless
//! - An edge is stored only once both endpoints exist in the replica

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod auth;
mod clock;
mod config;
mod continuation;
mod error;
mod http;
mod journal;
mod reconcile;
mod replica;
mod retry;
mod router;
mod state;
mod transport;

pub use auth::{
    AccessToken, ClientCredentialsProvider, CredentialProvider, StaticCredentials, TokenBroker,
};
pub use clock::{CancelHandle, RecordingSleeper, Sleeper, ThreadSleeper};
pub use config::{
    CredentialConfig, RetryConfig, ServiceEndpoint, SyncConfig, DEFAULT_API_VERSION,
    DEFAULT_POLL_INTERVAL,
};
pub use continuation::{ContinuationStore, FileContinuationStore, MemoryContinuationStore};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ACCEPT_MINIMAL_METADATA,
    HEADER_ACCEPT, HEADER_AUTHORIZATION, HEADER_CLIENT_REQUEST_ID,
};
pub use journal::{ChangeJournal, JsonLinesJournal, MemoryJournal};
pub use reconcile::{EdgeOutcome, EdgeReconciler, NodeReconciler, ReconcileAction};
pub use replica::{EdgeEntry, MemoryReplica, NodeEntry, Replica, ReplicaSnapshot, SnapshotEdge};
pub use retry::with_auth_retry;
pub use router::{ChangeRouter, RouteOutcome};
pub use state::{BatchReport, CycleOutcome, SyncLoop, SyncState, SyncStats};
pub use transport::{DirectoryTransport, MockTransport};
