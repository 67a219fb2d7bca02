//! Conversational agent loop over streaming chat completions.

mod agent;
mod assemble;
mod error;
mod event;
mod repair;
mod tool;
mod transcript;
mod usage;

pub mod prelude {
    pub use crate::{
        ChatAgent, ChatError, ChatErrorKind, ChatEvent, ChatEventStream, ContentSegment,
        ConversationEntry, FunctionTool, ImageSource, Role, SessionConfig, Tool, ToolError,
        ToolErrorKind, Transcript, TurnRequest, Usage,
    };
    pub use pclient::{CompletionClient, HttpCompletionClient, ToolChoice};
    pub use pschema::{StructuredOutput, ToolDeclaration};
}

pub use agent::{ChatAgent, SessionConfig, TurnRequest};
pub use assemble::{AssemblerSignal, FragmentAssembler, ToolInvocation};
pub use error::{ChatError, ChatErrorKind};
pub use event::{ChatEvent, ChatEventStream};
pub use repair::{parse_arguments, repair_json};
pub use tool::{FunctionTool, Tool, ToolError, ToolErrorKind, ToolFuture};
pub use transcript::{
    ContentSegment, ConversationEntry, EntryContent, ImageSource, Role, ToolCallRecord, Transcript,
};
pub use usage::{ModelPricing, Usage, UsageMeter, pricing_for};
