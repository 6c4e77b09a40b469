//! Independent copies: each attempt starts from the message as received.

use super::harness::{contents, Prepend, ScriptedSink};
use crate::{FallbackOutput, FallbackTarget, ProcessorChain};
use std::sync::Arc;
use transaction_protocol::{Message, Part};

#[tokio::test]
async fn later_targets_see_the_original_message() {
    let a = Arc::new(ScriptedSink::failing("a"));
    let b = Arc::new(ScriptedSink::failing("b"));
    let c = Arc::new(ScriptedSink::accepting("c"));
    let output = FallbackOutput::new(vec![
        FallbackTarget::new(a.clone())
            .with_processors(ProcessorChain::new(vec![Arc::new(Prepend("a-"))])),
        FallbackTarget::new(b.clone())
            .with_processors(ProcessorChain::new(vec![Arc::new(Prepend("b-"))])),
        FallbackTarget::new(c.clone()),
    ])
    .unwrap();

    let original = Message::from_parts(vec![
        Part::new("one").with_metadata("origin", "test"),
        Part::new("two"),
    ]);
    output.route(&original).await.unwrap();

    assert_eq!(contents(&a.received()[0]), ["a-one", "a-two"]);
    assert_eq!(a.received()[0].get(0).unwrap().metadata("touched_by"), Some("a-"));
    assert_eq!(contents(&b.received()[0]), ["b-one", "b-two"]);

    let last = &c.received()[0];
    assert_eq!(contents(last), ["one", "two"]);
    assert_eq!(last.get(0).unwrap().metadata("origin"), Some("test"));
    assert_eq!(last.get(0).unwrap().metadata("touched_by"), None);

    // The caller's message is never modified either.
    assert_eq!(contents(&original), ["one", "two"]);
}
