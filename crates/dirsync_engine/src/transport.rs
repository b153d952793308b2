//! Transport layer abstraction for the differential query service.

use crate::error::{SyncError, SyncResult};
use dirsync_protocol::{Batch, DeltaQuery, ObjectQuery, RawRecord, RejectionKind};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// A directory transport issues requests against the remote service.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing, etc.).
pub trait DirectoryTransport: Send + Sync {
    /// Fetches the next batch of changes after `query.token`.
    ///
    /// Fails with [`SyncError::AuthExpired`] when the credential is stale,
    /// [`SyncError::Rejected`] for other service faults,
    /// [`SyncError::Transport`] for network failures and
    /// [`SyncError::MalformedResponse`] when the envelope is incomplete.
    fn fetch_changes(&self, query: &DeltaQuery) -> SyncResult<Batch>;

    /// Fetches a single directory object, bypassing the differential stream.
    fn fetch_object(&self, query: &ObjectQuery) -> SyncResult<RawRecord>;

    /// Drops any cached credential so the next request re-acquires one.
    fn invalidate_credentials(&self);
}

impl<T: DirectoryTransport + ?Sized> DirectoryTransport for std::sync::Arc<T> {
    fn fetch_changes(&self, query: &DeltaQuery) -> SyncResult<Batch> {
        (**self).fetch_changes(query)
    }

    fn fetch_object(&self, query: &ObjectQuery) -> SyncResult<RawRecord> {
        (**self).fetch_object(query)
    }

    fn invalidate_credentials(&self) {
        (**self).invalidate_credentials()
    }
}

/// A scripted transport for testing.
///
/// Batch responses are served in the order they were queued. Point fetches
/// are answered from an object table, after any queued failures for that
/// object have been served.
#[derive(Debug, Default)]
pub struct MockTransport {
    batches: Mutex<VecDeque<SyncResult<Batch>>>,
    objects: Mutex<HashMap<String, RawRecord>>,
    object_failures: Mutex<HashMap<String, VecDeque<SyncError>>>,
    queries: Mutex<Vec<DeltaQuery>>,
    object_fetches: Mutex<Vec<String>>,
    invalidations: AtomicU64,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a batch response.
    pub fn push_batch(&self, batch: Batch) {
        self.batches.lock().push_back(Ok(batch));
    }

    /// Queues a failed fetch.
    pub fn push_error(&self, error: SyncError) {
        self.batches.lock().push_back(Err(error));
    }

    /// Adds an object served by point fetches.
    pub fn insert_object(&self, object_id: impl Into<String>, object: RawRecord) {
        self.objects.lock().insert(object_id.into(), object);
    }

    /// Queues a failure for the next point fetch of `object_id`.
    pub fn push_object_error(&self, object_id: impl Into<String>, error: SyncError) {
        self.object_failures
            .lock()
            .entry(object_id.into())
            .or_default()
            .push_back(error);
    }

    /// Differential queries received so far.
    pub fn queries(&self) -> Vec<DeltaQuery> {
        self.queries.lock().clone()
    }

    /// Object IDs point-fetched so far, in order.
    pub fn object_fetches(&self) -> Vec<String> {
        self.object_fetches.lock().clone()
    }

    /// Number of credential invalidations.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }

    /// Number of queued batch responses not yet served.
    pub fn pending_batches(&self) -> usize {
        self.batches.lock().len()
    }
}

impl DirectoryTransport for MockTransport {
    fn fetch_changes(&self, query: &DeltaQuery) -> SyncResult<Batch> {
        self.queries.lock().push(query.clone());
        self.batches
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Transport("no mock batch queued".into())))
    }

    fn fetch_object(&self, query: &ObjectQuery) -> SyncResult<RawRecord> {
        self.object_fetches.lock().push(query.object_id.clone());

        if let Some(error) = self
            .object_failures
            .lock()
            .get_mut(&query.object_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        self.objects
            .lock()
            .get(&query.object_id)
            .cloned()
            .ok_or_else(|| {
                SyncError::rejected(
                    RejectionKind::Unknown,
                    "Request_ResourceNotFound",
                    format!("object {} does not exist", query.object_id),
                )
            })
    }

    fn invalidate_credentials(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}
