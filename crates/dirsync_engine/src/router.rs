//! Classification and dispatch of change records.

use crate::config::RetryConfig;
use crate::error::SyncResult;
use crate::journal::ChangeJournal;
use crate::reconcile::{EdgeOutcome, EdgeReconciler, NodeReconciler, ReconcileAction};
use crate::replica::Replica;
use crate::transport::DirectoryTransport;
use dirsync_protocol::{ChangeRecord, EdgeKey, RawRecord};
use tracing::{info, warn};

/// What routing one record did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A node change was applied.
    Node {
        /// Object ID.
        object_id: String,
        /// Effect on the node store.
        action: ReconcileAction,
    },
    /// An edge change was applied.
    Edge {
        /// Link identity.
        key: EdgeKey,
        /// Reconciliation details.
        outcome: EdgeOutcome,
    },
    /// The discriminator names a kind this client does not replicate.
    Skipped {
        /// The discriminator as received.
        kind: String,
    },
}

/// Routes each record to the node or edge reconciler.
pub struct ChangeRouter {
    nodes: NodeReconciler,
    edges: EdgeReconciler,
    journal: Option<Box<dyn ChangeJournal>>,
}

impl ChangeRouter {
    /// Creates a router whose endpoint fetches follow `retry`.
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            nodes: NodeReconciler::new(),
            edges: EdgeReconciler::new(retry),
            journal: None,
        }
    }

    /// Appends every node and link change to `journal` before applying it.
    pub fn with_journal(mut self, journal: impl ChangeJournal + 'static) -> Self {
        self.journal = Some(Box::new(journal));
        self
    }

    /// Credential retries spent on endpoint point fetches so far.
    pub fn auth_retries(&self) -> u64 {
        self.edges.auth_retries()
    }

    /// Classifies `record` and applies it.
    ///
    /// Fails with `InvalidRecord` when the discriminator or an identity field
    /// is missing. Unknown kinds are logged and skipped.
    pub fn route<R, T>(
        &self,
        record: &RawRecord,
        replica: &mut R,
        transport: &T,
    ) -> SyncResult<RouteOutcome>
    where
        R: Replica + ?Sized,
        T: DirectoryTransport + ?Sized,
    {
        match ChangeRecord::classify(record)? {
            ChangeRecord::Node(change) => {
                info!(
                    kind = change.kind.map(|kind| kind.as_str()).unwrap_or("unknown"),
                    object_id = %change.object_id,
                    deleted = change.deleted,
                    "Detected a change about a directory object"
                );
                self.journal(record);
                let action = self.nodes.reconcile(&change, replica)?;
                Ok(RouteOutcome::Node {
                    object_id: change.object_id,
                    action,
                })
            }
            ChangeRecord::Edge(change) => {
                info!(
                    source = %change.key.source,
                    target = %change.key.target,
                    deleted = change.deleted,
                    "Detected a change about a directory link"
                );
                self.journal(record);
                let outcome = self.edges.reconcile(&change, replica, transport)?;
                Ok(RouteOutcome::Edge {
                    key: change.key,
                    outcome,
                })
            }
            ChangeRecord::Unknown { kind } => {
                info!(kind = %kind, "Detected a change about unknown type");
                Ok(RouteOutcome::Skipped { kind })
            }
        }
    }

    fn journal(&self, record: &RawRecord) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(record) {
                warn!(error = %e, "Failed to append change to journal");
            }
        }
    }
}

impl Default for ChangeRouter {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl std::fmt::Debug for ChangeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeRouter")
            .field("edges", &self.edges)
            .field("journal", &self.journal.is_some())
            .finish()
    }
}
