//! Run-scoped context.
//!
//! This module provides:
//! - The run identity used to correlate messages
//! - The [`RunContext`] carrying configuration, collaborators, cancellation
//!   and the per-run shared caches

mod identity;
mod run;

pub use identity::RunIdentity;
pub use run::{LookupCache, RunContext};
