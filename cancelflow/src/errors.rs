//! Error types for cancellation.
//!
//! Cancellation sweeps are exhaustive: every cleanup callback and every
//! tracked operation's cancel routine runs regardless of earlier failures.
//! Zero failures return normally, exactly one failure is passed through
//! unwrapped, and two or more are collected into [`AggregateCancelError`].

use std::fmt;
use thiserror::Error;

/// Error returned when a signal has already been cancelled.
///
/// This is an expected, recoverable condition, not a bug. It is produced by
/// `CancellationSignal::error_if_cancelled`, which is intended to be polled
/// at safe checkpoints inside long operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct OperationCancelledError;

/// Where a failure collected during a cancellation sweep came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    /// A cleanup callback registered through `on_cancel`.
    Callback {
        /// Registration id of the failing callback.
        id: u64,
    },
    /// A tracked operation's own cancel routine.
    Operation {
        /// Tracking id of the failing operation.
        id: u64,
    },
}

impl fmt::Display for FailureOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback { id } => write!(f, "callback #{id}"),
            Self::Operation { id } => write!(f, "operation #{id}"),
        }
    }
}

/// A single failure collected during a cancellation sweep.
#[derive(Debug)]
pub struct CancelFailure {
    /// Where the failure came from.
    pub origin: FailureOrigin,
    /// The underlying error.
    pub error: anyhow::Error,
}

impl fmt::Display for CancelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.origin, self.error)
    }
}

/// Two or more failures raised within a single cancellation sweep.
///
/// Carries the underlying failures in the order they occurred (callbacks in
/// registration order, then tracked operations in tracking order). A sweep
/// with exactly one failure returns that failure as-is instead of wrapping it.
#[derive(Debug)]
pub struct AggregateCancelError {
    /// The collected failures, in sweep order.
    pub failures: Vec<CancelFailure>,
}

impl fmt::Display for AggregateCancelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} failures during cancellation:", self.failures.len())?;
        for (index, failure) in self.failures.iter().enumerate() {
            writeln!(f, "  [{index}] {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateCancelError {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_operation_cancelled_display() {
        assert_eq!(OperationCancelledError.to_string(), "operation cancelled");
    }

    #[test]
    fn test_failure_origin_display() {
        assert_eq!(FailureOrigin::Callback { id: 3 }.to_string(), "callback #3");
        assert_eq!(
            FailureOrigin::Operation { id: 7 }.to_string(),
            "operation #7"
        );
    }

    #[test]
    fn test_aggregate_summary_lists_failures_in_order() {
        let aggregate = AggregateCancelError {
            failures: vec![
                CancelFailure {
                    origin: FailureOrigin::Callback { id: 0 },
                    error: anyhow::anyhow!("first"),
                },
                CancelFailure {
                    origin: FailureOrigin::Operation { id: 2 },
                    error: anyhow::anyhow!("second"),
                },
            ],
        };

        let summary = aggregate.to_string();
        assert!(summary.starts_with("2 failures during cancellation:"));

        let first = summary.find("[0] callback #0: first");
        let second = summary.find("[1] operation #2: second");
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(first < second);
    }
}
