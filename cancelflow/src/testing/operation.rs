//! Controllable operation double for exercising tracking and cancellation.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::operation::{SettleHook, TrackableOperation};

/// How an operation left the pending state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// The operation completed successfully.
    Fulfilled,
    /// The operation failed.
    Rejected,
    /// The operation was cancelled.
    Cancelled,
}

struct FakeInner {
    settlement: Option<Settlement>,
    cancel_calls: usize,
    chain_calls: usize,
    hooks: Vec<SettleHook>,
}

/// A fake operation that settles on demand and records cancel calls.
///
/// A fake can optionally be derived from a root operation, modeling a
/// dependency chain: forward cancel touches only the fake itself, while chain
/// cancel first cancels the root.
pub struct FakeOperation {
    inner: Mutex<FakeInner>,
    root: Option<Arc<FakeOperation>>,
    cancel_failure: Option<String>,
}

impl FakeOperation {
    fn build(
        settlement: Option<Settlement>,
        root: Option<Arc<FakeOperation>>,
        cancel_failure: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(FakeInner {
                settlement,
                cancel_calls: 0,
                chain_calls: 0,
                hooks: Vec::new(),
            }),
            root,
            cancel_failure,
        })
    }

    /// Creates a pending operation.
    #[must_use]
    pub fn pending() -> Arc<Self> {
        Self::build(None, None, None)
    }

    /// Creates an operation that is already settled.
    #[must_use]
    pub fn settled(settlement: Settlement) -> Arc<Self> {
        Self::build(Some(settlement), None, None)
    }

    /// Creates a pending operation whose cancel routines fail with `message`.
    #[must_use]
    pub fn failing_cancel(message: impl Into<String>) -> Arc<Self> {
        Self::build(None, None, Some(message.into()))
    }

    /// Creates a pending operation derived from `root`, forming a two-level
    /// dependency chain.
    #[must_use]
    pub fn derived(root: &Arc<FakeOperation>) -> Arc<Self> {
        Self::build(None, Some(root.clone()), None)
    }

    /// Settles the operation and fires its completion hooks exactly once.
    /// No-op if already settled.
    pub fn settle(&self, settlement: Settlement) {
        let hooks = {
            let mut inner = self.inner.lock();
            if inner.settlement.is_some() {
                return;
            }
            inner.settlement = Some(settlement);
            std::mem::take(&mut inner.hooks)
        };
        for hook in hooks {
            hook();
        }
    }

    /// Returns how the operation settled, if it has.
    #[must_use]
    pub fn settlement(&self) -> Option<Settlement> {
        self.inner.lock().settlement
    }

    /// Returns how many times `cancel` was called.
    #[must_use]
    pub fn cancel_calls(&self) -> usize {
        self.inner.lock().cancel_calls
    }

    /// Returns how many times `cancel_chain` was called.
    #[must_use]
    pub fn chain_calls(&self) -> usize {
        self.inner.lock().chain_calls
    }
}

impl TrackableOperation for FakeOperation {
    fn is_settled(&self) -> bool {
        self.inner.lock().settlement.is_some()
    }

    fn is_cancelled(&self) -> bool {
        self.inner.lock().settlement == Some(Settlement::Cancelled)
    }

    fn cancel(&self) -> anyhow::Result<()> {
        self.inner.lock().cancel_calls += 1;
        if let Some(message) = &self.cancel_failure {
            return Err(anyhow::anyhow!("{message}"));
        }
        self.settle(Settlement::Cancelled);
        Ok(())
    }

    fn cancel_chain(&self) -> anyhow::Result<()> {
        self.inner.lock().chain_calls += 1;
        if let Some(message) = &self.cancel_failure {
            return Err(anyhow::anyhow!("{message}"));
        }
        if let Some(root) = &self.root {
            root.cancel()?;
        }
        self.settle(Settlement::Cancelled);
        Ok(())
    }

    fn on_settle(&self, hook: SettleHook) {
        let mut inner = self.inner.lock();
        if inner.settlement.is_some() {
            drop(inner);
            hook();
        } else {
            inner.hooks.push(hook);
        }
    }
}

impl std::fmt::Debug for FakeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("FakeOperation")
            .field("settlement", &inner.settlement)
            .field("cancel_calls", &inner.cancel_calls)
            .field("chain_calls", &inner.chain_calls)
            .finish()
    }
}
