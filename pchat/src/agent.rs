//! The agent entry point and its turn state machine.
//!
//! A turn is one [`ChatAgent::chat`] call. It may span several
//! request/response cycles: a `tool_calls` finish resolves the batch
//! and resends, a `length` finish resends with the partial text
//! carried forward, anything else ends the turn.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use pclient::{
    CompletionClient, CompletionRequest, FinishReason, ResponseFormat, ToolChoice, WireContent,
    WireMessage, WirePart, WireRole,
};
use pschema::{StructuredOutput, ToolDeclaration};
use serde_json::Value;

use crate::ChatError;
use crate::assemble::{AssemblerSignal, FragmentAssembler, ToolInvocation};
use crate::event::{ChatEvent, ChatEventStream};
use crate::repair::parse_arguments;
use crate::tool::{Tool, ToolError};
use crate::transcript::{ConversationEntry, Role, Transcript};
use crate::usage::{Usage, UsageMeter};

/// Per-session settings, fixed at [`ChatAgent::setup`] time. Credentials
/// live in the completion client, not here.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_message: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub imported_history: Vec<WireMessage>,
    pub structured_output: Option<StructuredOutput>,
    pub strict_arguments: bool,
    pub environment: Vec<String>,
    pub extra_options: BTreeMap<String, Value>,
}

impl SessionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            system_message: None,
            model: model.into(),
            temperature: 1.0,
            max_tokens: 4096,
            imported_history: Vec::new(),
            structured_output: None,
            strict_arguments: false,
            environment: Vec::new(),
            extra_options: BTreeMap::new(),
        }
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Imports prior wire-format history into the new transcript.
    pub fn with_history(mut self, history: Vec<WireMessage>) -> Self {
        self.imported_history = history;
        self
    }

    pub fn with_structured_output(mut self, output: StructuredOutput) -> Self {
        self.structured_output = Some(output);
        self
    }

    /// Rejects malformed tool arguments instead of repairing them.
    pub fn with_strict_arguments(mut self, strict: bool) -> Self {
        self.strict_arguments = strict;
        self
    }

    pub fn with_environment(mut self, lines: Vec<String>) -> Self {
        self.environment = lines;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_options.insert(key.into(), value);
        self
    }
}

/// What one turn sends: the new user input plus the capabilities and
/// knobs active for that turn.
#[derive(Clone)]
pub struct TurnRequest {
    pub user_message: Option<String>,
    pub completion: Option<String>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub stop_words: Option<Vec<String>>,
    pub tool_choice: ToolChoice,
    pub json_mode: bool,
}

impl TurnRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: Some(user_message.into()),
            completion: None,
            tools: Vec::new(),
            stop_words: None,
            tool_choice: ToolChoice::default(),
            json_mode: false,
        }
    }

    /// A turn with no new user input, letting the model continue from
    /// the transcript as it stands.
    pub fn continuation() -> Self {
        Self {
            user_message: None,
            completion: None,
            tools: Vec::new(),
            stop_words: None,
            tool_choice: ToolChoice::default(),
            json_mode: false,
        }
    }

    /// Opens the assistant reply with pre-written text. The model sees
    /// the seed as its own words and continues from it.
    pub fn with_completion(mut self, completion: impl Into<String>) -> Self {
        self.completion = Some(completion.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_stop_words(mut self, stop_words: Vec<String>) -> Self {
        self.stop_words = Some(stop_words);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

impl std::fmt::Debug for TurnRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnRequest")
            .field("user_message", &self.user_message)
            .field("completion", &self.completion)
            .field("tools", &self.tools.len())
            .field("stop_words", &self.stop_words)
            .field("tool_choice", &self.tool_choice)
            .field("json_mode", &self.json_mode)
            .finish()
    }
}

#[derive(Debug)]
struct Session {
    config: SessionConfig,
    transcript: Transcript,
    meter: UsageMeter,
}

/// A conversational agent bound to one completion client.
///
/// The agent owns the transcript and usage totals. [`ChatAgent::chat`]
/// borrows the agent mutably for the life of the returned stream, so
/// only one turn can be in flight at a time.
pub struct ChatAgent {
    client: Arc<dyn CompletionClient>,
    session: Option<Session>,
}

impl ChatAgent {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            session: None,
        }
    }

    /// Initializes the session, replacing any existing transcript and
    /// usage totals.
    pub fn setup(&mut self, config: SessionConfig) -> Result<(), ChatError> {
        let transcript =
            Transcript::from_wire(config.system_message.as_deref(), &config.imported_history);
        let meter = UsageMeter::new(&config.model)?;

        self.session = Some(Session {
            config,
            transcript,
            meter,
        });
        Ok(())
    }

    /// Cumulative usage across every network call since setup.
    pub fn usage(&self) -> Usage {
        self.session
            .as_ref()
            .map(|session| session.meter.totals())
            .unwrap_or_default()
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.session.as_ref().map(|session| &session.transcript)
    }

    /// Exports the transcript in wire format.
    pub fn wire_messages(&self) -> Vec<WireMessage> {
        self.transcript()
            .map(Transcript::to_wire_messages)
            .unwrap_or_default()
    }

    /// Overrides the schema used by `json_mode` turns. `None` falls
    /// back to free-form JSON object mode.
    pub fn set_structured_output(&mut self, output: Option<StructuredOutput>) {
        if let Some(session) = &mut self.session {
            session.config.structured_output = output;
        }
    }

    /// Replaces the ephemeral environment lines injected into outbound
    /// requests. The transcript itself never records them.
    pub fn set_environment(&mut self, lines: Vec<String>) {
        if let Some(session) = &mut self.session {
            session.config.environment = lines;
        }
    }

    /// Runs one turn lazily. Nothing is sent until the returned stream
    /// is polled; dropping it mid-turn abandons the in-flight cycle and
    /// keeps every fully recorded row.
    pub fn chat(&mut self, request: TurnRequest) -> Result<ChatEventStream<'_>, ChatError> {
        let Some(session) = self.session.as_mut() else {
            return Err(ChatError::setup("chat called before setup"));
        };

        Ok(Box::pin(run_turn(
            Arc::clone(&self.client),
            session,
            request,
        )))
    }
}

fn run_turn<'a>(
    client: Arc<dyn CompletionClient>,
    session: &'a mut Session,
    request: TurnRequest,
) -> impl Stream<Item = Result<ChatEvent, ChatError>> + Send + 'a {
    try_stream! {
        if let Some(user_message) = &request.user_message {
            session
                .transcript
                .append(ConversationEntry::text(Role::User, user_message.clone()));
        }

        let forced = request.tool_choice.is_forced();
        let mut carried_text: Option<String> = None;

        // A pre-seeded completion becomes the opening of the assistant
        // row; the first cycle's deltas extend it rather than replace it.
        if let Some(completion) = &request.completion {
            session
                .transcript
                .append(ConversationEntry::text(Role::Assistant, completion.clone()));
            carried_text = Some(completion.clone());
        }

        loop {
            // Declarations are refreshed every cycle; a tool may change
            // its advertised schema between calls.
            let declarations: Vec<ToolDeclaration> = request
                .tools
                .iter()
                .map(|tool| tool.declaration())
                .collect();

            let outbound = build_request(
                &session.config,
                &session.transcript,
                &request,
                declarations.clone(),
            );
            let prompt_tokens = session.meter.count_messages(&outbound.messages);

            tracing::debug!(
                event = "completion_request",
                model = %outbound.model,
                messages = outbound.messages.len(),
                tools = outbound.tools.len()
            );

            let mut fragments = client.stream(outbound).await?;

            let carried_len = carried_text.as_ref().map_or(0, String::len);
            let mut assembler = FragmentAssembler::new(session.transcript.tool_row_count());
            if let Some(text) = carried_text.take() {
                assembler = assembler.with_text(text);
            }

            while let Some(item) = fragments.next().await {
                let fragment = item?;
                for signal in assembler.absorb(&fragment) {
                    match signal {
                        AssemblerSignal::TextDelta { delta } => {
                            session.transcript.update_last_assistant_text(assembler.text());
                            yield ChatEvent::Text {
                                content: assembler.text().to_string(),
                                delta,
                            };
                        }
                        AssemblerSignal::ToolCallDelta { index, opened } => {
                            if let Some(invocation) = assembler.invocation(index) {
                                if opened {
                                    // The row appears as soon as the call
                                    // opens so callers can show it in flight.
                                    session.transcript.append(ConversationEntry::tool_call(
                                        &invocation.invocation_id,
                                        &invocation.name,
                                    ));
                                } else {
                                    yield ChatEvent::ToolCall {
                                        name: invocation.name.clone(),
                                        arguments: invocation.arguments.clone(),
                                        finish: false,
                                    };
                                }
                            }
                        }
                    }
                }
            }

            let cycle_text = assembler.text().get(carried_len..).unwrap_or_default();
            let mut completion_tokens = session.meter.count_text(cycle_text);
            for invocation in assembler.invocations() {
                completion_tokens += session.meter.count_text(&invocation.name);
                completion_tokens += session.meter.count_text(&invocation.arguments);
            }
            session.meter.record_call(prompt_tokens, completion_tokens);

            match assembler.finish().cloned() {
                Some(FinishReason::ToolCalls) => {
                    for invocation in assembler.invocations().to_vec() {
                        session
                            .transcript
                            .complete_tool_call(&invocation.invocation_id, &invocation.arguments);
                        yield ChatEvent::ToolCall {
                            name: invocation.name.clone(),
                            arguments: invocation.arguments.clone(),
                            finish: true,
                        };

                        let response = resolve_invocation(
                            &request.tools,
                            &declarations,
                            &invocation,
                            session.config.strict_arguments,
                        )
                        .await;

                        session
                            .transcript
                            .record_tool_response(&invocation.invocation_id, &response);
                        yield ChatEvent::ToolResponse {
                            name: invocation.name,
                            arguments: invocation.arguments,
                            response,
                        };
                    }

                    // Forced tool use is single-shot: one batch, then done.
                    if forced {
                        break;
                    }
                }
                Some(FinishReason::Length) => {
                    tracing::warn!(
                        event = "length_continuation",
                        model = %session.config.model,
                        carried_chars = assembler.text().len()
                    );
                    carried_text = Some(assembler.text().to_string());
                }
                _ => break,
            }
        }
    }
}

/// Runs one invocation to its response text. Lookup, parse, and
/// execution failures all land here as error text; the model sees them
/// as ordinary tool output.
async fn resolve_invocation(
    tools: &[Arc<dyn Tool>],
    declarations: &[ToolDeclaration],
    invocation: &ToolInvocation,
    strict: bool,
) -> String {
    tracing::debug!(
        event = "tool_execution",
        tool = %invocation.name,
        invocation_id = %invocation.invocation_id
    );

    let Some(tool) = declarations
        .iter()
        .zip(tools)
        .find(|(declaration, _)| declaration.name == invocation.name)
        .map(|(_, tool)| tool)
    else {
        return ToolError::not_found("no tool with this name was offered")
            .with_tool_name(&invocation.name)
            .to_string();
    };

    let arguments = match parse_arguments(&invocation.arguments, strict) {
        Ok(arguments) => arguments,
        Err(err) => {
            return ToolError::invalid_arguments(format!("argument payload did not parse: {err}"))
                .with_tool_name(&invocation.name)
                .to_string();
        }
    };

    if !arguments.is_object() {
        return ToolError::invalid_arguments("argument payload must be a JSON object")
            .with_tool_name(&invocation.name)
            .to_string();
    }

    match tool.execute(arguments).await {
        Ok(response) => response,
        Err(err) => {
            let err = match err.tool_name {
                Some(_) => err,
                None => err.with_tool_name(&invocation.name),
            };
            err.to_string()
        }
    }
}

fn build_request(
    config: &SessionConfig,
    transcript: &Transcript,
    request: &TurnRequest,
    declarations: Vec<ToolDeclaration>,
) -> CompletionRequest {
    let mut messages = transcript.to_wire_messages();
    apply_environment(&mut messages, &config.environment);

    let mut outbound = CompletionRequest::new(config.model.clone(), messages)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);

    if !declarations.is_empty() {
        outbound = outbound
            .with_tools(declarations)
            .with_tool_choice(request.tool_choice.clone());
    }

    if let Some(stop_words) = &request.stop_words {
        outbound = outbound.with_stop(stop_words.clone());
    }

    if request.json_mode {
        outbound = outbound.with_response_format(match &config.structured_output {
            Some(output) => ResponseFormat::JsonSchema(output.clone()),
            None => ResponseFormat::JsonObject,
        });
    }

    for (key, value) in &config.extra_options {
        outbound = outbound.with_extra(key.clone(), value.clone());
    }

    outbound
}

/// Appends the environment lines to the last tool message of the
/// outbound copy, or to the first message when no tool message exists.
/// Only the serialized copy changes; the transcript never sees them.
fn apply_environment(messages: &mut [WireMessage], lines: &[String]) {
    if lines.is_empty() || messages.is_empty() {
        return;
    }

    let target = messages
        .iter()
        .rposition(|message| message.role == WireRole::Tool)
        .unwrap_or(0);

    for line in lines {
        push_line(&mut messages[target], line);
    }
}

fn push_line(message: &mut WireMessage, line: &str) {
    match &mut message.content {
        Some(WireContent::Text(text)) => {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(line);
        }
        Some(WireContent::Parts(parts)) => {
            parts.push(WirePart::Text {
                text: line.to_string(),
            });
        }
        None => {
            message.content = Some(WireContent::Text(line.to_string()));
        }
    }
}
