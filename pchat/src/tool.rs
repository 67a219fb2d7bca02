//! Tool trait contract for caller-supplied capabilities.
//!
//! ```rust
//! use pchat::{FunctionTool, Tool};
//! use pschema::{string, tool_declaration};
//!
//! let tool = FunctionTool::new(
//!     tool_declaration("echo", vec![string("text")]),
//!     |arguments| async move { Ok(arguments.to_string()) },
//! );
//!
//! assert_eq!(tool.declaration().name, "echo");
//! ```

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pschema::ToolDeclaration;
use serde_json::Value;

pub type ToolFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    NotFound,
    InvalidArguments,
    Execution,
}

/// A tool failure. The agent loop renders these as tool-response text
/// for the model to react to; they never abort a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
    pub tool_name: Option<String>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            tool_name: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, message)
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidArguments, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Execution, message)
    }

    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }
}

impl Display for ToolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.tool_name {
            Some(tool_name) => {
                write!(f, "{:?} [tool={}]: {}", self.kind, tool_name, self.message)
            }
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl Error for ToolError {}

/// A callable capability offered to the model.
///
/// The declaration is requested fresh before every request, so a tool
/// may change its advertised schema between turns.
pub trait Tool: Send + Sync {
    fn declaration(&self) -> ToolDeclaration;

    /// Runs the tool with parsed JSON-object arguments. The returned
    /// text becomes the tool response in the transcript.
    fn execute<'a>(&'a self, arguments: Value) -> ToolFuture<'a, Result<String, ToolError>>;
}

type ToolHandler = dyn Fn(Value) -> ToolFuture<'static, Result<String, ToolError>> + Send + Sync;

/// A [`Tool`] built from a declaration and an async closure.
pub struct FunctionTool {
    declaration: ToolDeclaration,
    handler: Arc<ToolHandler>,
}

impl FunctionTool {
    pub fn new<F, Fut>(declaration: ToolDeclaration, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let handler: Arc<ToolHandler> = Arc::new(move |arguments| Box::pin(handler(arguments)));

        Self {
            declaration,
            handler,
        }
    }
}

impl Tool for FunctionTool {
    fn declaration(&self) -> ToolDeclaration {
        self.declaration.clone()
    }

    fn execute<'a>(&'a self, arguments: Value) -> ToolFuture<'a, Result<String, ToolError>> {
        (self.handler)(arguments)
    }
}
