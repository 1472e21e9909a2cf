//! Privileged owner of a cancellation signal.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{AggregateCancelError, CancelFailure, FailureOrigin};
use crate::signal::{run_callback, CancellationSignal, SharedCancelState};

/// How tracked operations are cancelled during a sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CancelMode {
    /// `cancel()`: the operation and its descendants only.
    Forward,
    /// `cancel_chain()`: walk to the root producer and cancel the whole
    /// dependency chain.
    Chain,
}

/// An armed timeout. The generation lets a fired timer detect that it has
/// been superseded by a later `cancel_after` call.
struct TimerSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

pub(crate) struct ControllerInner {
    state: Arc<SharedCancelState>,
    timer: Mutex<Option<TimerSlot>>,
    timer_generation: AtomicU64,
}

impl ControllerInner {
    /// Runs the cancellation sweep. Idempotent: every call after the first
    /// returns Ok immediately.
    ///
    /// The sweep is exhaustive. Callbacks run first, in registration order,
    /// over a snapshot taken after the live registry is cleared; tracked
    /// operations are cancelled next, in tracking order, the same way.
    /// Failures are collected, never short-circuited: zero failures return
    /// Ok, exactly one is returned as-is, two or more are wrapped in
    /// [`AggregateCancelError`].
    pub(crate) fn cancel(&self, mode: CancelMode) -> anyhow::Result<()> {
        if !self.state.mark_cancelled() {
            return Ok(());
        }
        debug!(?mode, "cancellation triggered");
        self.disarm_timer();

        let mut failures: Vec<CancelFailure> = Vec::new();

        // Snapshot and clear before iterating, so callbacks registered
        // reentrantly during the sweep fire immediately (the signal is now
        // cancelled) instead of extending a registry mid-iteration.
        let callbacks = self.state.registries().callbacks.drain();
        for (id, callback) in callbacks {
            if let Err(error) = run_callback(callback) {
                failures.push(CancelFailure {
                    origin: FailureOrigin::Callback { id },
                    error,
                });
            }
        }

        let tracked = self.state.registries().tracked.drain();
        for (id, operation) in tracked {
            if operation.is_settled() || operation.is_cancelled() {
                continue;
            }
            let result = match mode {
                CancelMode::Forward => operation.cancel(),
                CancelMode::Chain => operation.cancel_chain(),
            };
            if let Err(error) = result {
                failures.push(CancelFailure {
                    origin: FailureOrigin::Operation { id },
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else if failures.len() == 1 {
            // A lone failure is passed through unwrapped, preserving its kind.
            Err(failures.remove(0).error)
        } else {
            Err(AggregateCancelError { failures }.into())
        }
    }

    fn disarm_timer(&self) {
        if let Some(slot) = self.timer.lock().take() {
            slot.handle.abort();
        }
    }

    /// Clears the timer slot if it still belongs to `generation`. Returns
    /// false when a later `cancel_after` call replaced the timer.
    fn claim_timer(&self, generation: u64) -> bool {
        let mut slot = self.timer.lock();
        match slot.as_ref() {
            Some(current) if current.generation == generation => {
                slot.take();
                true
            }
            _ => false,
        }
    }
}

/// The privileged owner that can trigger cancellation, arm a timeout, and
/// compose linked signals.
///
/// A controller owns exactly one shared state and constructs exactly one
/// [`CancellationSignal`] over it. Dropping the controller disarms any
/// pending timer and clears (does not cancel) both registries, breaking
/// retained references without running cleanup side effects.
pub struct CancellationController {
    pub(super) inner: Arc<ControllerInner>,
    signal: CancellationSignal,
}

impl CancellationController {
    /// Creates a controller with a fresh, uncancelled signal.
    #[must_use]
    pub fn new() -> Self {
        let state = SharedCancelState::new();
        let signal = CancellationSignal::new(state.clone());
        Self {
            inner: Arc::new(ControllerInner {
                state,
                timer: Mutex::new(None),
                timer_generation: AtomicU64::new(0),
            }),
            signal,
        }
    }

    /// Creates a controller whose signal cancels automatically after
    /// `timeout`. Must be called within a Tokio runtime.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let controller = Self::new();
        controller.cancel_after(timeout);
        controller
    }

    /// Returns the signal for this controller. Stable identity across the
    /// controller's lifetime; clone it to hand out to consumers.
    #[must_use]
    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// Cancels the signal, drains cleanup callbacks, and cancels tracked
    /// operations forward-only (each operation and its descendants, never
    /// its ancestors). Idempotent.
    pub fn cancel(&self) -> anyhow::Result<()> {
        self.inner.cancel(CancelMode::Forward)
    }

    /// Like [`cancel`](Self::cancel), but each tracked operation receives a
    /// chain cancel: the walk reaches the operation's root producer, so
    /// upstream cleanup hooks on ancestor operations fire too.
    ///
    /// If an ancestor is shared with code outside this controller's
    /// ownership, that code's operation is cancelled as well. Only use this
    /// when the caller owns the full chain.
    pub fn cancel_chain(&self) -> anyhow::Result<()> {
        self.inner.cancel(CancelMode::Chain)
    }

    /// Arms a timer that cancels the signal after `delay`. Re-armable: a
    /// later call before expiry replaces the pending timer, resetting the
    /// deadline. No-op when already cancelled. Must be called within a Tokio
    /// runtime.
    pub fn cancel_after(&self, delay: Duration) {
        if self.signal.is_cancelled() {
            return;
        }

        let generation = self.inner.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        // Weak back-reference: the timer task never keeps the controller
        // alive. A released controller makes the fire a no-op.
        let weak = Arc::downgrade(&self.inner);

        // The slot must be stored under the same guard the fired task takes
        // in claim_timer: a near-zero timer can fire on another worker before
        // this function returns, and it has to find its own slot rather than
        // a stale or absent one.
        let mut slot = self.inner.timer.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };
            if !inner.claim_timer(generation) {
                return;
            }
            if let Err(error) = inner.cancel(CancelMode::Forward) {
                warn!(
                    error = %format!("{error:#}"),
                    "cleanup failed during timeout cancellation"
                );
            }
        });
        if let Some(previous) = slot.replace(TimerSlot { generation, handle }) {
            previous.handle.abort();
        }
        drop(slot);
        debug!(?delay, "cancellation timer armed");
    }
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancellationController {
    fn drop(&mut self) {
        self.inner.disarm_timer();
        // Break retained references without running cleanup side effects.
        let mut registries = self.inner.state.registries();
        registries.callbacks.clear();
        registries.tracked.clear();
    }
}

impl std::fmt::Debug for CancellationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationController")
            .field("cancelled", &self.signal.is_cancelled())
            .field("timer_armed", &self.inner.timer.lock().is_some())
            .finish()
    }
}
