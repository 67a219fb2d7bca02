//! Streaming chat-completion client for OpenAI-compatible endpoints.

mod client;
mod error;
mod http;
mod model;
mod stream;

pub mod prelude {
    pub use crate::{
        ApiKey, ClientError, ClientErrorKind, ClientFuture, CompletionClient, CompletionFragment,
        CompletionRequest, FinishReason, FragmentStream, HttpCompletionClient, ResponseFormat,
        ToolCallFragment, ToolChoice, WireContent, WireMessage, WirePart, WireRole, WireToolCall,
    };
    pub use pschema::{StructuredOutput, ToolDeclaration};
}

pub use client::{ClientFuture, CompletionClient};
pub use error::{ClientError, ClientErrorKind};
pub use http::{ApiKey, HttpCompletionClient};
pub use model::{
    CompletionRequest, ResponseFormat, ToolChoice, WireContent, WireFunctionCall, WireImageUrl,
    WireMessage, WirePart, WireRole, WireToolCall,
};
pub use stream::{
    CompletionFragment, FinishReason, FragmentStream, ToolCallFragment, VecFragmentStream,
};
