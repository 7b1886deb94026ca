//! Cooperative cancellation for publish runs.
//!
//! A single [`CancellationToken`] is shared by the orchestrator, every type
//! publisher and every batch dispatched during a run.

mod token;

pub use token::CancellationToken;
