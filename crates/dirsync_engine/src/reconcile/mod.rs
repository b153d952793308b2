//! Reconciliation of classified changes against the replica.
//!
//! Both reconcilers are idempotent: replaying a create is an overwrite and
//! deleting an absent key is a no-op. This is what makes at-least-once
//! delivery after a crash between processing and persisting safe.

mod edge;
mod node;

pub use edge::{EdgeOutcome, EdgeReconciler};
pub use node::NodeReconciler;

/// Effect of reconciling one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// The key was not present and has been inserted.
    Created,
    /// The key was present and has been overwritten.
    Updated,
    /// The key was present and has been removed.
    Removed,
    /// A deletion targeted a key that was not present.
    AlreadyAbsent,
}
