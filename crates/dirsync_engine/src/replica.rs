//! Local replica of the remote directory.
//!
//! The replica holds two keyed stores: nodes keyed by object ID and edges
//! keyed by the (source, target) pair. The [`Replica`] trait is the
//! create/update/exists/delete contract the reconcilers work against, so a
//! durable store can replace [`MemoryReplica`] without touching them.

use crate::error::SyncResult;
use dirsync_protocol::{EdgeKey, NodeKind, RawRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Latest known state of a directory object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeEntry {
    /// Object kind, when known.
    pub kind: Option<NodeKind>,
    /// Object attributes.
    pub attributes: RawRecord,
}

/// Latest known state of a link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeEntry {
    /// Link metadata.
    pub attributes: RawRecord,
}

/// Keyed storage for replicated nodes and edges.
pub trait Replica: Send {
    /// Returns true if the node exists.
    fn node_exists(&self, object_id: &str) -> SyncResult<bool>;

    /// Inserts or overwrites a node. Returns true if it already existed.
    fn put_node(&mut self, object_id: &str, entry: NodeEntry) -> SyncResult<bool>;

    /// Removes a node. Returns true if it existed.
    fn remove_node(&mut self, object_id: &str) -> SyncResult<bool>;

    /// Inserts or overwrites an edge. Returns true if it already existed.
    fn put_edge(&mut self, key: &EdgeKey, entry: EdgeEntry) -> SyncResult<bool>;

    /// Removes an edge. Returns true if it existed.
    fn remove_edge(&mut self, key: &EdgeKey) -> SyncResult<bool>;
}

/// In-memory replica.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryReplica {
    nodes: HashMap<String, NodeEntry>,
    edges: HashMap<EdgeKey, EdgeEntry>,
}

impl MemoryReplica {
    /// Creates an empty replica.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a node.
    pub fn node(&self, object_id: &str) -> Option<&NodeEntry> {
        self.nodes.get(object_id)
    }

    /// Returns an edge.
    pub fn edge(&self, source: &str, target: &str) -> Option<&EdgeEntry> {
        self.edges.get(&EdgeKey::new(source, target))
    }

    /// Returns true if the node exists.
    pub fn contains_node(&self, object_id: &str) -> bool {
        self.nodes.contains_key(object_id)
    }

    /// Returns true if the edge exists.
    pub fn contains_edge(&self, source: &str, target: &str) -> bool {
        self.edges.contains_key(&EdgeKey::new(source, target))
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges whose endpoints are missing from the node store.
    pub fn dangling_edges(&self) -> Vec<EdgeKey> {
        let mut dangling: Vec<_> = self
            .edges
            .keys()
            .filter(|key| {
                !self.nodes.contains_key(&key.source) || !self.nodes.contains_key(&key.target)
            })
            .cloned()
            .collect();
        dangling.sort();
        dangling
    }

    /// Ordered, serialisable copy of the replica.
    pub fn snapshot(&self) -> ReplicaSnapshot {
        ReplicaSnapshot {
            nodes: self
                .nodes
                .iter()
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect(),
            edges: {
                let mut edges: Vec<_> = self
                    .edges
                    .iter()
                    .map(|(key, entry)| SnapshotEdge {
                        source: key.source.clone(),
                        target: key.target.clone(),
                        attributes: entry.attributes.clone(),
                    })
                    .collect();
                edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
                edges
            },
        }
    }
}

impl Replica for MemoryReplica {
    fn node_exists(&self, object_id: &str) -> SyncResult<bool> {
        Ok(self.nodes.contains_key(object_id))
    }

    fn put_node(&mut self, object_id: &str, entry: NodeEntry) -> SyncResult<bool> {
        Ok(self.nodes.insert(object_id.to_string(), entry).is_some())
    }

    fn remove_node(&mut self, object_id: &str) -> SyncResult<bool> {
        Ok(self.nodes.remove(object_id).is_some())
    }

    fn put_edge(&mut self, key: &EdgeKey, entry: EdgeEntry) -> SyncResult<bool> {
        Ok(self.edges.insert(key.clone(), entry).is_some())
    }

    fn remove_edge(&mut self, key: &EdgeKey) -> SyncResult<bool> {
        Ok(self.edges.remove(key).is_some())
    }
}

/// Serialisable view of a replica.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicaSnapshot {
    /// Nodes by object ID.
    pub nodes: BTreeMap<String, NodeEntry>,
    /// Edges ordered by (source, target).
    pub edges: Vec<SnapshotEdge>,
}

/// One edge of a [`ReplicaSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEdge {
    /// Source object ID.
    pub source: String,
    /// Target object ID.
    pub target: String,
    /// Link metadata.
    pub attributes: RawRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: NodeKind) -> NodeEntry {
        NodeEntry {
            kind: Some(kind),
            attributes: RawRecord::new(),
        }
    }

    #[test]
    fn node_lifecycle() {
        let mut replica = MemoryReplica::new();
        assert!(!replica.put_node("a", node(NodeKind::User)).unwrap());
        assert!(replica.put_node("a", node(NodeKind::User)).unwrap());
        assert!(replica.node_exists("a").unwrap());
        assert!(replica.remove_node("a").unwrap());
        assert!(!replica.remove_node("a").unwrap());
        assert_eq!(replica.node_count(), 0);
    }

    #[test]
    fn edge_lifecycle() {
        let mut replica = MemoryReplica::new();
        let key = EdgeKey::new("a", "b");
        let entry = EdgeEntry {
            attributes: RawRecord::new(),
        };
        assert!(!replica.put_edge(&key, entry.clone()).unwrap());
        assert!(replica.put_edge(&key, entry).unwrap());
        assert!(replica.contains_edge("a", "b"));
        assert!(replica.remove_edge(&key).unwrap());
        assert!(!replica.remove_edge(&key).unwrap());
        assert!(!replica.contains_edge("a", "b"));
    }

    #[test]
    fn edge_keys_do_not_collide() {
        // "ab" + "c" and "a" + "bc" are distinct pairs.
        let mut replica = MemoryReplica::new();
        let entry = EdgeEntry {
            attributes: RawRecord::new(),
        };
        replica.put_edge(&EdgeKey::new("ab", "c"), entry.clone()).unwrap();
        assert!(!replica.put_edge(&EdgeKey::new("a", "bc"), entry).unwrap());
        assert_eq!(replica.edge_count(), 2);
    }

    #[test]
    fn dangling_edges_and_snapshot() {
        let mut replica = MemoryReplica::new();
        replica.put_node("a", node(NodeKind::Group)).unwrap();
        replica
            .put_edge(
                &EdgeKey::new("a", "b"),
                EdgeEntry {
                    attributes: RawRecord::new(),
                },
            )
            .unwrap();

        assert_eq!(replica.dangling_edges(), vec![EdgeKey::new("a", "b")]);

        let snapshot = replica.snapshot();
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.edges[0].target, "b");
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["nodes"]["a"]["kind"], "Group");
    }
}
