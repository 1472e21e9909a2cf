//! Any-of-N signal composition.

use std::sync::Arc;
use tracing::warn;

use super::controller::{CancelMode, CancellationController};
use crate::signal::CancellationSignal;

impl CancellationController {
    /// Builds a controller whose signal cancels when any of the input signals
    /// cancels.
    ///
    /// Propagation is one-directional, parent to child: cancelling the
    /// returned controller never cancels any input. Zero inputs yield an
    /// uncancelled controller. If any input is already cancelled, the new
    /// controller is cancelled immediately and no callbacks are attached to
    /// the remaining inputs. Compositions nest: the returned controller's
    /// signal can itself be an input to another linked controller.
    #[must_use]
    pub fn linked<'a, I>(signals: I) -> Self
    where
        I: IntoIterator<Item = &'a CancellationSignal>,
    {
        let controller = Self::new();

        let mut pending = Vec::new();
        for signal in signals {
            if signal.is_cancelled() {
                // Short-circuit. The fresh controller has no callbacks or
                // tracked operations, so this sweep cannot fail.
                if let Err(error) = controller.cancel() {
                    warn!(
                        error = %format!("{error:#}"),
                        "linked short-circuit cancellation failed"
                    );
                }
                return controller;
            }
            pending.push(signal.clone());
        }

        for signal in pending {
            // Weak back-reference: an input signal never keeps the linked
            // controller alive; once the controller is released the
            // propagation callback resolves to nothing.
            let weak = Arc::downgrade(&controller.inner);
            signal.on_cancel(move || {
                if let Some(inner) = weak.upgrade() {
                    if let Err(error) = inner.cancel(CancelMode::Forward) {
                        warn!(
                            error = %format!("{error:#}"),
                            "linked cancellation propagation failed"
                        );
                    }
                }
                Ok(())
            });
        }

        controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_linked_zero_inputs_uncancelled() {
        let none: [&CancellationSignal; 0] = [];
        let linked = CancellationController::linked(none);
        assert!(!linked.signal().is_cancelled());
    }

    #[test]
    fn test_linked_cancels_when_any_input_cancels() {
        let a = CancellationController::new();
        let b = CancellationController::new();
        let c = CancellationController::new();

        let linked = CancellationController::linked([a.signal(), b.signal(), c.signal()]);
        assert!(!linked.signal().is_cancelled());

        b.cancel().expect("cancel succeeds");
        assert!(linked.signal().is_cancelled());
        assert!(!a.signal().is_cancelled());
        assert!(!c.signal().is_cancelled());
    }

    #[test]
    fn test_linked_propagation_is_one_directional() {
        let a = CancellationController::new();
        let b = CancellationController::new();

        let linked = CancellationController::linked([a.signal(), b.signal()]);
        linked.cancel().expect("cancel succeeds");

        assert!(linked.signal().is_cancelled());
        assert!(!a.signal().is_cancelled());
        assert!(!b.signal().is_cancelled());
    }

    #[test]
    fn test_linked_precancelled_input_short_circuits() {
        let cancelled = CancellationController::new();
        cancelled.cancel().expect("cancel succeeds");
        let live = CancellationController::new();

        let linked = CancellationController::linked([cancelled.signal(), live.signal()]);

        assert!(linked.signal().is_cancelled());
        assert!(!live.signal().is_cancelled());

        // The live input got no propagation callback attached.
        live.cancel().expect("cancel succeeds");
    }

    #[test]
    fn test_linked_compositions_nest() {
        let a = CancellationController::new();
        let b = CancellationController::new();

        let inner = CancellationController::linked([a.signal()]);
        let outer = CancellationController::linked([inner.signal(), b.signal()]);

        a.cancel().expect("cancel succeeds");

        assert!(inner.signal().is_cancelled());
        assert!(outer.signal().is_cancelled());
        assert!(!b.signal().is_cancelled());
    }

    #[test]
    fn test_linked_fires_cleanup_once() {
        let a = CancellationController::new();
        let b = CancellationController::new();

        let linked = CancellationController::linked([a.signal(), b.signal()]);
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = counter.clone();
        linked.signal().on_cancel(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        a.cancel().expect("cancel succeeds");
        b.cancel().expect("cancel succeeds");

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_linked_controller_breaks_propagation() {
        let a = CancellationController::new();

        let linked = CancellationController::linked([a.signal()]);
        let linked_signal = linked.signal().clone();
        drop(linked);

        // The propagation callback's weak reference resolves to nothing.
        a.cancel().expect("cancel succeeds");
        assert!(!linked_signal.is_cancelled());
    }
}
