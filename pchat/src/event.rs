//! Events surfaced to callers while a turn is running.

use std::pin::Pin;

use futures_core::Stream;

/// One observable step of an agent turn.
///
/// Invariants for consumers:
/// - `Text.content` is cumulative for the turn; `Text.delta` is the
///   increment that produced it.
/// - `ToolCall.arguments` is cumulative for that call; the event with
///   `finish` set carries the full argument text and precedes the
///   call's `ToolResponse`.
/// - Tool calls resolve in the order the model opened them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Text {
        content: String,
        delta: String,
    },
    ToolCall {
        name: String,
        arguments: String,
        finish: bool,
    },
    ToolResponse {
        name: String,
        arguments: String,
        response: String,
    },
}

pub type ChatEventStream<'a> =
    Pin<Box<dyn Stream<Item = Result<ChatEvent, crate::ChatError>> + Send + 'a>>;
