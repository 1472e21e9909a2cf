//! # Cancelflow
//!
//! Cooperative cancellation primitives for asynchronous operations.
//!
//! Cancelflow models cancellation as a one-shot, monotonic signal that a
//! privileged controller raises and any number of handles observe:
//!
//! - **Signals**: read-mostly handles for polling or reacting to cancellation
//! - **Controllers**: the sole owners that trigger cancellation and arm timeouts
//! - **Registrations**: disposable handles for registered cleanup callbacks
//! - **Operation tracking**: auto-cancellation of in-flight dependent work
//! - **Linked composition**: any-of-N signals that cancel when any input does
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cancelflow::prelude::*;
//! use std::time::Duration;
//!
//! // Create a controller with a 5 second timeout
//! let controller = CancellationController::with_timeout(Duration::from_secs(5));
//! let signal = controller.signal().clone();
//!
//! // React to cancellation
//! let registration = signal.on_cancel(|| {
//!     println!("cleaning up");
//!     Ok(())
//! });
//!
//! // Poll at safe checkpoints inside long operations
//! signal.error_if_cancelled()?;
//!
//! // Trigger cancellation explicitly
//! controller.cancel()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod controller;
pub mod errors;
pub mod operation;
pub mod signal;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::controller::CancellationController;
    pub use crate::errors::{
        AggregateCancelError, CancelFailure, FailureOrigin, OperationCancelledError,
    };
    pub use crate::operation::{SettleHook, TrackableOperation};
    pub use crate::signal::{CancellationRegistration, CancellationSignal};
}
