//! Read-mostly handle for observing and reacting to cancellation.

use std::sync::{Arc, OnceLock};
use tracing::warn;

use super::registration::CancellationRegistration;
use super::shared::{run_callback, SharedCancelState};
use crate::errors::OperationCancelledError;
use crate::operation::{operation_identity, TrackableOperation};

/// The handle operations consume to observe or react to cancellation.
///
/// Cloning a signal yields another handle over the same shared state. Signals
/// are read-mostly: they can register callbacks and track operations, but only
/// the `CancellationController` that constructed the state can cancel it.
#[derive(Clone)]
pub struct CancellationSignal {
    state: Arc<SharedCancelState>,
}

impl CancellationSignal {
    pub(crate) fn new(state: Arc<SharedCancelState>) -> Self {
        Self { state }
    }

    pub(crate) fn state(&self) -> &Arc<SharedCancelState> {
        &self.state
    }

    /// Returns the process-wide signal that can never become cancelled.
    ///
    /// Every call returns a handle over the same shared state, which no
    /// controller can reach. Useful as a default for optional-signal
    /// parameters.
    #[must_use]
    pub fn none() -> Self {
        static NONE: OnceLock<CancellationSignal> = OnceLock::new();
        NONE.get_or_init(|| Self::new(SharedCancelState::new()))
            .clone()
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Errors with [`OperationCancelledError`] when the signal is cancelled.
    ///
    /// Intended to be polled at safe checkpoints inside long operations.
    pub fn error_if_cancelled(&self) -> Result<(), OperationCancelledError> {
        if self.is_cancelled() {
            Err(OperationCancelledError)
        } else {
            Ok(())
        }
    }

    /// Registers a cleanup callback to run when the signal cancels.
    ///
    /// Callbacks fire in registration order, exactly once, synchronously on
    /// the thread that triggers cancellation. If the signal is already
    /// cancelled, the callback fires synchronously before this returns and
    /// the returned registration is pre-disposed; a failure on that fast path
    /// is logged rather than propagated.
    pub fn on_cancel<F>(&self, callback: F) -> CancellationRegistration
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        // Hold the lock across the cancelled check: a concurrent cancel flips
        // the flag before draining, so either we observe it and fire now, or
        // the drain picks up our entry.
        let mut registries = self.state.registries();
        if self.state.is_cancelled() {
            drop(registries);
            if let Err(error) = run_callback(Box::new(callback)) {
                warn!(
                    error = %format!("{error:#}"),
                    "cleanup callback failed on already-cancelled signal"
                );
            }
            return CancellationRegistration::pre_disposed();
        }
        let id = registries.callbacks.insert(Box::new(callback));
        CancellationRegistration::live(Arc::downgrade(&self.state), id)
    }

    /// Registers an operation for automatic cancellation when this signal
    /// cancels. Returns the operation unchanged so the call can be inlined
    /// into a chain.
    ///
    /// Settled operations pass through untracked. If the signal is already
    /// cancelled, the operation is cancelled immediately (unless it already
    /// is) and passes through untracked; a cancel failure on that path is
    /// logged. Otherwise the operation is stored under a fresh tracking id and
    /// a settle hook removes the entry when the operation leaves the pending
    /// state, so settled work never lingers in the registry. Tracking an
    /// already-tracked operation replaces its previous entry.
    pub fn track(&self, operation: Arc<dyn TrackableOperation>) -> Arc<dyn TrackableOperation> {
        if operation.is_settled() {
            return operation;
        }

        let mut registries = self.state.registries();
        if self.state.is_cancelled() {
            drop(registries);
            if !operation.is_cancelled() {
                if let Err(error) = operation.cancel() {
                    warn!(
                        error = %format!("{error:#}"),
                        "failed to cancel operation tracked after cancellation"
                    );
                }
            }
            return operation;
        }

        registries.tracked.insert(operation.clone());
        drop(registries);

        // The hook holds a weak back-reference so a pending operation never
        // keeps the shared state alive. If the state is already gone when the
        // operation settles, the removal is a no-op.
        let state = Arc::downgrade(&self.state);
        let identity = operation_identity(&operation);
        operation.on_settle(Box::new(move || {
            if let Some(state) = state.upgrade() {
                state.registries().tracked.remove_identity(identity);
            }
        }));

        operation
    }

    /// Removes an operation from the tracking registries without cancelling
    /// it. No-op if the operation is not tracked.
    pub fn untrack(&self, operation: &Arc<dyn TrackableOperation>) {
        let identity = operation_identity(operation);
        self.state.registries().tracked.remove_identity(identity);
    }

    /// Returns the number of currently tracked operations.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.state.registries().tracked.len()
    }

    /// Empties the tracking registries without cancelling any of the removed
    /// operations.
    pub fn clear_tracked(&self) {
        self.state.registries().tracked.clear();
    }
}

impl std::fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("cancelled", &self.is_cancelled())
            .field("tracked_count", &self.tracked_count())
            .finish()
    }
}
