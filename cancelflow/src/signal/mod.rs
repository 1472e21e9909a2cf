//! Cancellation signals, registrations, and their shared state.
//!
//! This module provides:
//! - `CancellationSignal` for observing and reacting to cancellation
//! - `CancellationRegistration` for unregistering cleanup callbacks early
//! - The shared state record a controller and its signals coordinate through

mod handle;
mod registration;
mod shared;

pub use handle::CancellationSignal;
pub use registration::CancellationRegistration;
pub use shared::CancelCallback;

pub(crate) use shared::{run_callback, SharedCancelState};
