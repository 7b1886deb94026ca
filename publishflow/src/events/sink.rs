//! Message sink trait and implementations.

use crate::core::{PublishMessage, Severity};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Trait for sinks that receive publish messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Accepts one message.
    ///
    /// Implementations must not fail the caller; delivery problems are
    /// logged and suppressed.
    async fn emit(&self, message: PublishMessage);
}

/// A sink that discards all messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMessageSink;

#[async_trait]
impl MessageSink for NoOpMessageSink {
    async fn emit(&self, _message: PublishMessage) {}
}

/// A sink that logs messages using the tracing framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMessageSink;

impl LoggingMessageSink {
    /// Creates a new logging sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn log_message(message: &PublishMessage) {
        match message.severity {
            Severity::Information => info!(
                type_name = %message.type_name,
                instance = %message.instance_name,
                row = message.row_number,
                "{}", message.text
            ),
            Severity::Warning => warn!(
                type_name = %message.type_name,
                instance = %message.instance_name,
                row = message.row_number,
                "{}", message.text
            ),
            Severity::Error => error!(
                type_name = %message.type_name,
                instance = %message.instance_name,
                row = message.row_number,
                "{}", message.text
            ),
        }
    }
}

#[async_trait]
impl MessageSink for LoggingMessageSink {
    async fn emit(&self, message: PublishMessage) {
        Self::log_message(&message);
    }
}

/// A sink that keeps every message in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingMessageSink {
    messages: RwLock<Vec<PublishMessage>>,
}

impl CollectingMessageSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected messages.
    #[must_use]
    pub fn messages(&self) -> Vec<PublishMessage> {
        self.messages.read().clone()
    }

    /// Returns the number of collected messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Returns true if no messages have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Returns messages of one severity.
    #[must_use]
    pub fn of_severity(&self, severity: Severity) -> Vec<PublishMessage> {
        self.messages
            .read()
            .iter()
            .filter(|m| m.severity == severity)
            .cloned()
            .collect()
    }

    /// Returns error messages.
    #[must_use]
    pub fn errors(&self) -> Vec<PublishMessage> {
        self.of_severity(Severity::Error)
    }

    /// Returns messages whose text contains `needle`.
    #[must_use]
    pub fn containing(&self, needle: &str) -> Vec<PublishMessage> {
        self.messages
            .read()
            .iter()
            .filter(|m| m.text.contains(needle))
            .cloned()
            .collect()
    }

    /// Returns the first message whose text contains `needle`.
    #[must_use]
    pub fn first_containing(&self, needle: &str) -> Option<PublishMessage> {
        self.messages
            .read()
            .iter()
            .find(|m| m.text.contains(needle))
            .cloned()
    }

    /// Clears all collected messages.
    pub fn clear(&self) {
        self.messages.write().clear();
    }
}

#[async_trait]
impl MessageSink for CollectingMessageSink {
    async fn emit(&self, message: PublishMessage) {
        self.messages.write().push(message);
    }
}

/// A sink that forwards every message to several downstream sinks.
#[derive(Default)]
pub struct FanoutMessageSink {
    sinks: Vec<Arc<dyn MessageSink>>,
}

impl FanoutMessageSink {
    /// Creates an empty fanout sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a downstream sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Returns the number of downstream sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true if there are no downstream sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutMessageSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutMessageSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[async_trait]
impl MessageSink for FanoutMessageSink {
    async fn emit(&self, message: PublishMessage) {
        for sink in &self.sinks {
            sink.emit(message.clone()).await;
        }
    }
}
