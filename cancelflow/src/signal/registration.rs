//! Disposable handle for a registered cleanup callback.

use std::sync::Weak;

use super::shared::SharedCancelState;

/// Handle returned by `CancellationSignal::on_cancel`, allowing early
/// unregistration of the callback.
///
/// Dropping a registration without calling [`dispose`](Self::dispose) only
/// releases its internal reference to the shared state; the callback stays
/// registered and still fires on cancellation. Callers who want
/// unregistration-on-scope-exit must call `dispose` explicitly.
pub struct CancellationRegistration {
    /// Non-owning: a registration never extends the state's lifetime.
    state: Option<Weak<SharedCancelState>>,
    id: u64,
    disposed: bool,
}

impl CancellationRegistration {
    pub(crate) fn live(state: Weak<SharedCancelState>, id: u64) -> Self {
        Self {
            state: Some(state),
            id,
            disposed: false,
        }
    }

    /// A no-op registration for a callback that already fired at registration
    /// time.
    pub(crate) fn pre_disposed() -> Self {
        Self {
            state: None,
            id: 0,
            disposed: true,
        }
    }

    /// Unregisters the callback so it no longer fires on cancellation.
    ///
    /// Idempotent. Returns true only if the callback was still registered and
    /// was removed. Returns false if the registration was already disposed,
    /// was pre-disposed, or the callback already fired because cancellation
    /// drained the registry. The internal reference to the shared state is
    /// released regardless of outcome.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        match self.state.take().and_then(|state| state.upgrade()) {
            Some(state) => state.registries().callbacks.remove(self.id),
            None => false,
        }
    }

    /// Returns whether this registration has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl std::fmt::Debug for CancellationRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationRegistration")
            .field("id", &self.id)
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::controller::CancellationController;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_dispose_removes_callback() {
        let controller = CancellationController::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = counter.clone();
        let mut registration = controller.signal().on_cancel(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(registration.dispose());
        assert!(registration.is_disposed());

        controller.cancel().expect("cancel succeeds");
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispose_idempotent() {
        let controller = CancellationController::new();
        let mut registration = controller.signal().on_cancel(|| Ok(()));

        assert!(registration.dispose());
        assert!(!registration.dispose());
    }

    #[test]
    fn test_dispose_after_cancellation_returns_false() {
        let controller = CancellationController::new();
        let mut registration = controller.signal().on_cancel(|| Ok(()));

        controller.cancel().expect("cancel succeeds");

        // The callback already fired; there is nothing left to unregister.
        assert!(!registration.dispose());
        assert!(registration.is_disposed());
    }

    #[test]
    fn test_pre_disposed_registration_is_noop() {
        let controller = CancellationController::new();
        controller.cancel().expect("cancel succeeds");

        let mut registration = controller.signal().on_cancel(|| Ok(()));
        assert!(registration.is_disposed());
        assert!(!registration.dispose());
    }

    #[test]
    fn test_drop_without_dispose_keeps_callback_registered() {
        let controller = CancellationController::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = counter.clone();
        let registration = controller.signal().on_cancel(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        drop(registration);

        // The forgotten registration still fires.
        controller.cancel().expect("cancel succeeds");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_after_controller_drop_returns_false() {
        let controller = CancellationController::new();
        let signal = controller.signal().clone();
        let mut registration = signal.on_cancel(|| Ok(()));

        // Dropping the controller clears the registry without running it.
        drop(controller);
        assert!(!registration.dispose());
    }
}
