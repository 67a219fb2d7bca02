//! Common imports for most palaver applications.

pub use crate::{
    AgentBuilder, agent, assistant_message, system_message, tool_message, user_message,
};
pub use crate::{pv_messages, pv_msg};
pub use crate::{
    ApiKey, ChatAgent, ChatError, ChatErrorKind, ChatEvent, ChatEventStream, ClientError,
    ClientErrorKind, CompletionClient, CompletionFragment, CompletionRequest, ContentSegment,
    ConversationEntry, FinishReason, FunctionTool, HttpCompletionClient, ImageSource, Role,
    SchemaFragment, SessionConfig, StructuredOutput, Tool, ToolChoice, ToolDeclaration, ToolError,
    ToolErrorKind, Transcript, TurnRequest, Usage, WireContent, WireMessage, WireRole,
};
