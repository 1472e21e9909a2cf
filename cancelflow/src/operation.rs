//! Contract for trackable asynchronous operations.
//!
//! Cancelflow does not implement asynchronous operations itself; it consumes
//! them through this trait. An operation has observable settlement (pending /
//! fulfilled / rejected / cancelled), a forward cancel, a chain cancel that
//! walks to the operation's root producer first, and a completion hook that
//! fires exactly once when the operation leaves the pending state.

use std::sync::Arc;

/// Hook invoked exactly once when an operation settles, regardless of outcome.
pub type SettleHook = Box<dyn FnOnce() + Send>;

/// An external asynchronous unit of work with settlement state and a cancel
/// contract.
pub trait TrackableOperation: Send + Sync {
    /// Returns true once the operation has left the pending state
    /// (fulfilled, rejected, or cancelled).
    fn is_settled(&self) -> bool;

    /// Returns true if the operation settled by cancellation.
    fn is_cancelled(&self) -> bool;

    /// Cancels the operation and its descendants only (forward cancellation).
    fn cancel(&self) -> anyhow::Result<()>;

    /// Walks to the operation's root producer and cancels the entire
    /// dependency chain, root to descendants.
    ///
    /// If an ancestor is shared with code outside the caller's ownership,
    /// that code's operation is cancelled too. Only use this when the caller
    /// owns the full chain.
    fn cancel_chain(&self) -> anyhow::Result<()>;

    /// Registers a completion hook, invoked exactly once when the operation
    /// settles. Implementations invoke the hook immediately if the operation
    /// is already settled.
    fn on_settle(&self, hook: SettleHook);
}

/// Stable identity key for an operation instance: the address of its shared
/// allocation. Valid for as long as any `Arc` to the operation exists.
pub(crate) fn operation_identity(operation: &Arc<dyn TrackableOperation>) -> usize {
    Arc::as_ptr(operation).cast::<()>() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeOperation;

    #[test]
    fn test_identity_stable_across_clones() {
        let operation: Arc<dyn TrackableOperation> = FakeOperation::pending();
        let clone = operation.clone();

        assert_eq!(operation_identity(&operation), operation_identity(&clone));
    }

    #[test]
    fn test_identity_distinct_instances() {
        let a: Arc<dyn TrackableOperation> = FakeOperation::pending();
        let b: Arc<dyn TrackableOperation> = FakeOperation::pending();

        assert_ne!(operation_identity(&a), operation_identity(&b));
    }
}
