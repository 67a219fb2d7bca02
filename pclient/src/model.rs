//! Chat-completion wire messages and request model.
//!
//! ```rust
//! use pclient::{ClientErrorKind, CompletionRequest, WireMessage, WireRole};
//!
//! let ok = CompletionRequest::new(
//!     "gpt-4o-mini",
//!     vec![WireMessage::text(WireRole::User, "Summarize this diff")],
//! );
//! assert!(ok.validate().is_ok());
//!
//! let err = CompletionRequest::new("", vec![])
//!     .validate()
//!     .err()
//!     .expect("empty model should fail");
//! assert_eq!(err.kind, ClientErrorKind::InvalidRequest);
//! ```

use std::collections::BTreeMap;

use pschema::{StructuredOutput, ToolDeclaration};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Message content as the endpoint encodes it, either a plain string
/// or a list of typed parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunctionCall,
}

impl WireToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: WireFunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

/// One chat-completion message in endpoint form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl WireMessage {
    pub fn new(role: WireRole, content: Option<WireContent>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn text(role: WireRole, content: impl Into<String>) -> Self {
        Self::new(role, Some(WireContent::Text(content.into())))
    }

    /// A tool-role message answering the tool call with the given id.
    pub fn tool_response(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: WireRole::Tool,
            content: Some(WireContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

/// How the model may pick tools for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    Disabled,
    Required,
    Function(String),
}

impl ToolChoice {
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function(name.into())
    }

    /// Whether this choice compels a tool call on every completion it
    /// is sent with.
    pub fn is_forced(&self) -> bool {
        matches!(self, Self::Required | Self::Function(_))
    }

    pub fn to_wire(&self) -> Value {
        match self {
            Self::Auto => json!("auto"),
            Self::Disabled => json!("none"),
            Self::Required => json!("required"),
            Self::Function(name) => json!({
                "type": "function",
                "function": {"name": name},
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFormat {
    JsonObject,
    JsonSchema(StructuredOutput),
}

impl ResponseFormat {
    pub fn to_wire(&self) -> Value {
        match self {
            Self::JsonObject => json!({"type": "json_object"}),
            Self::JsonSchema(output) => json!({
                "type": "json_schema",
                "json_schema": output.to_wire(),
            }),
        }
    }
}

/// A single streaming chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub tools: Vec<ToolDeclaration>,
    pub tool_choice: Option<ToolChoice>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub response_format: Option<ResponseFormat>,
    pub extra: BTreeMap<String, Value>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            tool_choice: None,
            temperature: None,
            max_tokens: None,
            stop: None,
            response_format: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn with_response_format(mut self, response_format: ResponseFormat) -> Self {
        self.response_format = Some(response_format);
        self
    }

    /// Passes an extra request-body field through verbatim.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.model.trim().is_empty() {
            return Err(ClientError::invalid_request("model must not be empty"));
        }

        if self.messages.is_empty() {
            return Err(ClientError::invalid_request(
                "at least one message is required",
            ));
        }

        if let Some(max_tokens) = self.max_tokens
            && max_tokens == 0
        {
            return Err(ClientError::invalid_request(
                "max_tokens must be greater than zero",
            ));
        }

        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(ClientError::invalid_request(
                "temperature must be in the inclusive range 0.0..=2.0",
            ));
        }

        Ok(())
    }
}
