//! HTTP surface over the reduction engine.
//!
//! The binary in `main.rs` wires real collaborators; exposing the
//! router, state and metrics as a library lets integration tests drive
//! the API in-process with mock collaborators injected.

pub mod api;
pub mod metrics;
pub mod state;
