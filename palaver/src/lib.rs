//! Unified facade over the palaver workspace crates.
//!
//! This crate is designed to be the single dependency for most applications.
//! It re-exports the core palaver crates and provides convenience helpers
//! and macros for common setup and message-building flows.

mod builder;
mod macros;

pub mod prelude;
pub mod util;

pub use pchat;
pub use pclient;
pub use pschema;

pub use pchat::{
    AssemblerSignal, ChatAgent, ChatError, ChatErrorKind, ChatEvent, ChatEventStream,
    ContentSegment, ConversationEntry, EntryContent, FragmentAssembler, FunctionTool, ImageSource,
    ModelPricing, Role, SessionConfig, Tool, ToolCallRecord, ToolError, ToolErrorKind, ToolFuture,
    ToolInvocation, Transcript, TurnRequest, Usage, UsageMeter, parse_arguments, pricing_for,
    repair_json,
};
pub use pclient::{
    ApiKey, ClientError, ClientErrorKind, ClientFuture, CompletionClient, CompletionFragment,
    CompletionRequest, FinishReason, FragmentStream, HttpCompletionClient, ResponseFormat,
    ToolCallFragment, ToolChoice, VecFragmentStream, WireContent, WireFunctionCall, WireImageUrl,
    WireMessage, WirePart, WireRole, WireToolCall,
};
pub use pschema::{
    SchemaFragment, StructuredOutput, ToolDeclaration, any_of, array, boolean, float, integer,
    nullable, object, string, structured_output, tool_declaration,
};

pub use builder::{AgentBuilder, agent};
pub use util::{assistant_message, system_message, tool_message, user_message};
