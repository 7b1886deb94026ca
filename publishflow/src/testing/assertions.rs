//! Assertions over collected run messages.

use crate::core::PublishMessage;
use crate::events::CollectingMessageSink;

/// Asserts that no Error message was emitted.
pub fn assert_no_errors(sink: &CollectingMessageSink) {
    let errors = sink.errors();
    assert!(
        errors.is_empty(),
        "Expected no errors, got: {:?}",
        errors.iter().map(|m| &m.text).collect::<Vec<_>>()
    );
}

/// Asserts that some message contains `needle`, and returns the first one.
pub fn assert_message(sink: &CollectingMessageSink, needle: &str) -> PublishMessage {
    match sink.first_containing(needle) {
        Some(message) => message,
        None => panic!(
            "Expected a message containing '{needle}', got: {:?}",
            sink.messages().iter().map(|m| &m.text).collect::<Vec<_>>()
        ),
    }
}

/// Asserts that no message contains `needle`.
pub fn assert_no_message(sink: &CollectingMessageSink, needle: &str) {
    let found = sink.containing(needle);
    assert!(
        found.is_empty(),
        "Expected no message containing '{needle}', got: {:?}",
        found.iter().map(|m| &m.text).collect::<Vec<_>>()
    );
}

/// Asserts that the first message containing `earlier` was emitted before
/// the first message containing `later`.
pub fn assert_emitted_before(sink: &CollectingMessageSink, earlier: &str, later: &str) {
    let first = assert_message(sink, earlier);
    let second = assert_message(sink, later);
    assert!(
        first.sequence < second.sequence,
        "Expected '{}' (#{}) before '{}' (#{})",
        first.text,
        first.sequence,
        second.text,
        second.sequence
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MessageSink;

    #[tokio::test]
    async fn test_emitted_before_uses_sequence() {
        let sink = CollectingMessageSink::new();
        sink.emit(PublishMessage::info("Party", "alpha").with_sequence(1)).await;
        sink.emit(PublishMessage::info("Party", "beta").with_sequence(2)).await;

        assert_emitted_before(&sink, "alpha", "beta");
        assert_no_message(&sink, "gamma");
        assert_eq!(assert_message(&sink, "beta").sequence, 2);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_panics_on_error() {
        let sink = CollectingMessageSink::new();
        tokio_test::block_on(sink.emit(PublishMessage::error("Party", "p", 1, "bad")));
        assert_no_errors(&sink);
    }
}
