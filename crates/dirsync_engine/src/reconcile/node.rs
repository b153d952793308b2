//! Node (directory object) reconciliation.

use super::ReconcileAction;
use crate::error::SyncResult;
use crate::replica::{NodeEntry, Replica};
use dirsync_protocol::NodeChange;
use tracing::info;

/// Applies node changes to the replica.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeReconciler;

impl NodeReconciler {
    /// Creates a node reconciler.
    pub fn new() -> Self {
        Self
    }

    /// Applies one node change.
    ///
    /// A hard or soft deletion removes the object; anything else inserts it
    /// or overwrites the existing entry.
    pub fn reconcile<R: Replica + ?Sized>(
        &self,
        change: &NodeChange,
        replica: &mut R,
    ) -> SyncResult<ReconcileAction> {
        let object_id = change.object_id.as_str();

        if change.deleted {
            return if replica.remove_node(object_id)? {
                info!(object_id, "Object removed from local store");
                Ok(ReconcileAction::Removed)
            } else {
                info!(object_id, "Deleted object was not in local store");
                Ok(ReconcileAction::AlreadyAbsent)
            };
        }

        let entry = NodeEntry {
            kind: change.kind,
            attributes: change.attributes.clone(),
        };

        if replica.put_node(object_id, entry)? {
            info!(object_id, "Object updated in local store");
            Ok(ReconcileAction::Updated)
        } else {
            info!(object_id, "Object added to local store");
            Ok(ReconcileAction::Created)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::MemoryReplica;
    use dirsync_protocol::{ChangeRecord, NodeKind};
    use serde_json::{json, Value};

    fn node_change(value: Value) -> NodeChange {
        match ChangeRecord::classify(value.as_object().unwrap()).unwrap() {
            ChangeRecord::Node(change) => change,
            other => panic!("expected node change, got {other:?}"),
        }
    }

    #[test]
    fn create_then_update() {
        let mut replica = MemoryReplica::new();
        let reconciler = NodeReconciler::new();

        let first = node_change(json!({ "odata.type": "User", "objectId": "a", "displayName": "Ada" }));
        let second =
            node_change(json!({ "odata.type": "User", "objectId": "a", "displayName": "Ada L." }));

        assert_eq!(
            reconciler.reconcile(&first, &mut replica).unwrap(),
            ReconcileAction::Created
        );
        assert_eq!(
            reconciler.reconcile(&second, &mut replica).unwrap(),
            ReconcileAction::Updated
        );

        let entry = replica.node("a").unwrap();
        assert_eq!(entry.kind, Some(NodeKind::User));
        assert_eq!(entry.attributes["displayName"], "Ada L.");
    }

    #[test]
    fn duplicate_create_is_idempotent() {
        let reconciler = NodeReconciler::new();
        let change = node_change(json!({ "odata.type": "Group", "objectId": "g", "mail": "g@x" }));

        let mut once = MemoryReplica::new();
        reconciler.reconcile(&change, &mut once).unwrap();

        let mut twice = MemoryReplica::new();
        reconciler.reconcile(&change, &mut twice).unwrap();
        reconciler.reconcile(&change, &mut twice).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn soft_delete_removes() {
        let mut replica = MemoryReplica::new();
        let reconciler = NodeReconciler::new();
        reconciler
            .reconcile(&node_change(json!({ "odata.type": "Contact", "objectId": "c" })), &mut replica)
            .unwrap();

        let delete = node_change(json!({
            "odata.type": "Contact",
            "objectId": "c",
            "aad.isSoftDeleted": true,
        }));
        assert_eq!(
            reconciler.reconcile(&delete, &mut replica).unwrap(),
            ReconcileAction::Removed
        );
        assert!(!replica.contains_node("c"));
    }

    #[test]
    fn delete_of_absent_object_is_noop() {
        let mut replica = MemoryReplica::new();
        let delete = node_change(json!({ "odata.type": "User", "objectId": "x", "aad.isDeleted": true }));
        assert_eq!(
            NodeReconciler::new().reconcile(&delete, &mut replica).unwrap(),
            ReconcileAction::AlreadyAbsent
        );
        assert_eq!(replica.node_count(), 0);
    }
}
