//! Cancellation controllers: triggering, timeouts, and linked composition.
//!
//! This module provides:
//! - `CancellationController` as the privileged owner of a signal
//! - Timeout-based auto-cancellation (`cancel_after`)
//! - Any-of-N linked composition (`CancellationController::linked`)

mod controller;
mod linked;

pub use controller::CancellationController;
