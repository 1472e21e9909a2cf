//! Test doubles for the trackable-operation contract.

mod operation;

pub use operation::{FakeOperation, Settlement};
