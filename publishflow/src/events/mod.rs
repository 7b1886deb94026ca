//! Message sinks for run progress and row-level outcomes.
//!
//! Every [`PublishMessage`](crate::core::PublishMessage) produced during a run
//! flows through a [`MessageSink`]. Hosts persist or broadcast them; the
//! default sink forwards them to `tracing`.

mod sink;

pub use sink::{CollectingMessageSink, FanoutMessageSink, LoggingMessageSink, MessageSink, NoOpMessageSink};
