//! Testing utilities and mock implementations for engine tests.
//!
//! Provides mock implementations of the external collaborator traits so
//! the orchestration core can be exercised without real pixel work.

mod mock_stacker;

pub use mock_stacker::MockStacker;
