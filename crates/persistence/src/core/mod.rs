//! Core storage traits and abstractions.
//!
//! - [`ResourceStorage`] - create, get, list, count, update and delete
//! - [`Cancellation`] - caller-driven cancellation of running operations

pub mod cancel;
pub mod storage;

pub use cancel::{CancelGuard, Cancellation};
pub use storage::ResourceStorage;
