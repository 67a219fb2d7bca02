//! Streaming fragment contracts and in-memory stream utilities.
//!
//! ```rust
//! use pclient::{CompletionFragment, FragmentStream, VecFragmentStream};
//!
//! let stream: FragmentStream =
//!     VecFragmentStream::boxed(vec![Ok(CompletionFragment::text_delta("hello"))]);
//! drop(stream);
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::ClientError;

/// One streamed chunk of a completion.
///
/// Invariants for consumers:
/// - Fragments arrive in source order; text deltas concatenate into the
///   completion text.
/// - A fragment carries at most one tool-call delta. A delta with a
///   name opens a new tool call; deltas without a name extend the
///   arguments of the most recently opened one.
/// - `finish` is set on at most the final meaningful fragment.
/// - Once the stream yields `None`, it must not yield additional items.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionFragment {
    pub text: Option<String>,
    pub tool_call: Option<ToolCallFragment>,
    pub finish: Option<FinishReason>,
}

impl CompletionFragment {
    pub fn text_delta(delta: impl Into<String>) -> Self {
        Self {
            text: Some(delta.into()),
            ..Self::default()
        }
    }

    pub fn tool_call_delta(fragment: ToolCallFragment) -> Self {
        Self {
            tool_call: Some(fragment),
            ..Self::default()
        }
    }

    pub fn finished(reason: FinishReason) -> Self {
        Self {
            finish: Some(reason),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.tool_call.is_none() && self.finish.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    /// A delta that opens a new tool call.
    pub fn opening(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: None,
        }
    }

    /// A delta extending the arguments of the open tool call.
    pub fn arguments(arguments: impl Into<String>) -> Self {
        Self {
            id: None,
            name: None,
            arguments: Some(arguments.into()),
        }
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    pub fn parse(value: &str) -> Self {
        match value {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<CompletionFragment, ClientError>> + Send>>;

/// In-memory fragment stream for tests and canned replays.
#[derive(Debug)]
pub struct VecFragmentStream {
    fragments: VecDeque<Result<CompletionFragment, ClientError>>,
}

impl VecFragmentStream {
    pub fn new(fragments: Vec<Result<CompletionFragment, ClientError>>) -> Self {
        Self {
            fragments: fragments.into(),
        }
    }

    pub fn boxed(fragments: Vec<Result<CompletionFragment, ClientError>>) -> FragmentStream {
        Box::pin(Self::new(fragments))
    }
}

impl Stream for VecFragmentStream {
    type Item = Result<CompletionFragment, ClientError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<CompletionFragment, ClientError>>> {
        Poll::Ready(self.fragments.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn vec_fragment_stream_yields_fragments_in_order() {
        let mut stream = VecFragmentStream::boxed(vec![
            Ok(CompletionFragment::text_delta("one")),
            Ok(CompletionFragment::text_delta("two")),
            Ok(CompletionFragment::finished(FinishReason::Stop)),
        ]);

        assert_eq!(
            stream.next().await,
            Some(Ok(CompletionFragment::text_delta("one")))
        );
        assert_eq!(
            stream.next().await,
            Some(Ok(CompletionFragment::text_delta("two")))
        );
        assert_eq!(
            stream.next().await,
            Some(Ok(CompletionFragment::finished(FinishReason::Stop)))
        );
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn finish_reason_parses_known_and_unknown_values() {
        assert_eq!(FinishReason::parse("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("length"), FinishReason::Length);
        assert_eq!(FinishReason::parse("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(
            FinishReason::parse("content_filter"),
            FinishReason::ContentFilter
        );
        assert_eq!(
            FinishReason::parse("model_error"),
            FinishReason::Other("model_error".to_string())
        );
    }

    #[test]
    fn empty_fragment_is_detected() {
        assert!(CompletionFragment::default().is_empty());
        assert!(!CompletionFragment::text_delta("x").is_empty());
    }
}
