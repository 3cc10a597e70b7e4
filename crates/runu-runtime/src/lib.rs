//! Instance state management for the runu runtime.
//!
//! Persists one record per instance under a root directory, serializes
//! writers through a per-instance advisory lock, resolves the reported
//! status from the recorded phase and live process facts, and renders the
//! OCI runtime state document.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cancel;
pub mod codec;
pub mod control;
pub mod lock;
pub mod probe;
pub mod record;
pub mod report;
pub mod state;
pub mod status;
