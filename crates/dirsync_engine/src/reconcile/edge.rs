//! Edge (link) reconciliation with on-demand endpoint repair.
//!
//! Links can arrive before the create changes of the objects they connect.
//! Before a link is stored, each endpoint missing from the replica is
//! point-fetched from the service and inserted as a node.

use super::ReconcileAction;
use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::replica::{EdgeEntry, NodeEntry, Replica};
use crate::retry::with_auth_retry;
use crate::transport::DirectoryTransport;
use dirsync_protocol::{EdgeChange, NodeChange, ObjectQuery};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Result of reconciling one edge change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeOutcome {
    /// Effect on the edge store.
    pub action: ReconcileAction,
    /// Endpoints fetched from the service and inserted, in fetch order.
    pub repaired: Vec<String>,
    /// Credential retries spent on point fetches.
    pub auth_retries: u32,
}

impl EdgeOutcome {
    fn new(action: ReconcileAction) -> Self {
        Self {
            action,
            repaired: Vec::new(),
            auth_retries: 0,
        }
    }
}

/// Applies edge changes to the replica.
#[derive(Debug, Default)]
pub struct EdgeReconciler {
    retry: RetryConfig,
    auth_retries: AtomicU64,
}

impl EdgeReconciler {
    /// Creates an edge reconciler whose point fetches follow `retry`.
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            retry,
            auth_retries: AtomicU64::new(0),
        }
    }

    /// Credential retries spent on point fetches so far, failed edges included.
    pub fn auth_retries(&self) -> u64 {
        self.auth_retries.load(Ordering::SeqCst)
    }

    /// Applies one edge change, repairing missing endpoints first.
    pub fn reconcile<R, T>(
        &self,
        change: &EdgeChange,
        replica: &mut R,
        transport: &T,
    ) -> SyncResult<EdgeOutcome>
    where
        R: Replica + ?Sized,
        T: DirectoryTransport + ?Sized,
    {
        let key = &change.key;

        if change.deleted {
            let action = if replica.remove_edge(key)? {
                info!(source = %key.source, target = %key.target, "Link removed from local store");
                ReconcileAction::Removed
            } else {
                ReconcileAction::AlreadyAbsent
            };
            return Ok(EdgeOutcome::new(action));
        }

        let mut outcome = EdgeOutcome::new(ReconcileAction::Created);
        for endpoint in [&key.source, &key.target] {
            // Re-checked per endpoint so a self-loop fetches once.
            if replica.node_exists(endpoint)? {
                continue;
            }
            outcome.auth_retries += self.repair_endpoint(endpoint, replica, transport)?;
            outcome.repaired.push(endpoint.clone());
        }

        let entry = EdgeEntry {
            attributes: change.attributes.clone(),
        };
        if replica.put_edge(key, entry)? {
            info!(source = %key.source, target = %key.target, "Link updated in local store");
            outcome.action = ReconcileAction::Updated;
        } else {
            info!(source = %key.source, target = %key.target, "Link added to local store");
        }

        Ok(outcome)
    }

    /// Point-fetches `object_id` and inserts it. Returns the retries spent.
    fn repair_endpoint<R, T>(&self, object_id: &str, replica: &mut R, transport: &T) -> SyncResult<u32>
    where
        R: Replica + ?Sized,
        T: DirectoryTransport + ?Sized,
    {
        let query = ObjectQuery::new(object_id);
        let (result, retries) = with_auth_retry(transport, &self.retry, "point fetch", || {
            transport.fetch_object(&query)
        });
        self.auth_retries.fetch_add(u64::from(retries), Ordering::SeqCst);

        let fetched = NodeChange::from_fetched(&result?)?;
        if fetched.object_id != object_id {
            return Err(SyncError::MalformedResponse(format!(
                "point fetch for {object_id} returned object {}",
                fetched.object_id
            )));
        }

        replica.put_node(
            object_id,
            NodeEntry {
                kind: fetched.kind,
                attributes: fetched.attributes,
            },
        )?;
        info!(object_id, "Manually retrieved object from directory");
        Ok(retries)
    }
}
