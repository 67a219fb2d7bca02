//! Ordered conversation transcript and wire-format conversion.
//!
//! The transcript stores tool calls as flat rows so they can be
//! mutated while streaming. The wire protocol nests them inside the
//! assistant message that issued them, so [`Transcript::to_wire_messages`]
//! folds tool rows back into the nearest preceding assistant message
//! not separated by a user message, inserting a synthetic assistant
//! message when none exists.

use std::collections::HashMap;

use pclient::{WireContent, WireImageUrl, WireMessage, WirePart, WireRole, WireToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl From<WireRole> for Role {
    fn from(value: WireRole) -> Self {
        match value {
            WireRole::System => Self::System,
            WireRole::User => Self::User,
            WireRole::Assistant => Self::Assistant,
            WireRole::Tool => Self::Tool,
        }
    }
}

impl From<Role> for WireRole {
    fn from(value: Role) -> Self {
        match value {
            Role::System => Self::System,
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
            Role::Tool => Self::Tool,
        }
    }
}

/// An image referenced by URL or carried inline as base64 data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Url(String),
    Encoded { media_type: String, data: String },
}

impl ImageSource {
    pub fn encoded(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Encoded {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn to_url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Encoded { media_type, data } => format!("data:{media_type};base64,{data}"),
        }
    }

    pub fn from_url(url: &str) -> Self {
        if let Some(rest) = url.strip_prefix("data:")
            && let Some((header, data)) = rest.split_once(',')
            && let Some(media_type) = header.strip_suffix(";base64")
        {
            return Self::Encoded {
                media_type: media_type.to_string(),
                data: data.to_string(),
            };
        }

        Self::Url(url.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSegment {
    Text(String),
    Image(ImageSource),
}

/// Content of a non-tool transcript row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryContent {
    Text(String),
    Segments(Vec<ContentSegment>),
    /// Named values rendered as one segment per value. Field names are
    /// not part of the wire format and are dropped on export.
    NamedFields(Vec<(String, ContentSegment)>),
}

impl EntryContent {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub(crate) fn to_wire(&self) -> WireContent {
        match self {
            Self::Text(text) => WireContent::Text(text.clone()),
            Self::Segments(segments) => {
                WireContent::Parts(segments.iter().map(segment_to_part).collect())
            }
            Self::NamedFields(fields) => WireContent::Parts(
                fields
                    .iter()
                    .map(|(_, segment)| segment_to_part(segment))
                    .collect(),
            ),
        }
    }

    pub(crate) fn from_wire(content: &WireContent) -> Self {
        match content {
            WireContent::Text(text) => Self::Text(text.clone()),
            WireContent::Parts(parts) => {
                Self::Segments(parts.iter().map(part_to_segment).collect())
            }
        }
    }
}

fn segment_to_part(segment: &ContentSegment) -> WirePart {
    match segment {
        ContentSegment::Text(text) => WirePart::Text { text: text.clone() },
        ContentSegment::Image(image) => WirePart::ImageUrl {
            image_url: WireImageUrl {
                url: image.to_url(),
            },
        },
    }
}

fn part_to_segment(part: &WirePart) -> ContentSegment {
    match part {
        WirePart::Text { text } => ContentSegment::Text(text.clone()),
        WirePart::ImageUrl { image_url } => {
            ContentSegment::Image(ImageSource::from_url(&image_url.url))
        }
    }
}

/// The tool-call state carried by a tool row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub invocation_id: String,
    pub tool_name: String,
    pub arguments: String,
    pub response: Option<String>,
}

/// One row of the transcript. Non-tool rows carry `content`; tool rows
/// carry `invocation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: EntryContent,
    pub invocation: Option<ToolCallRecord>,
}

impl ConversationEntry {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::content(role, EntryContent::Text(text.into()))
    }

    pub fn content(role: Role, content: EntryContent) -> Self {
        Self {
            role,
            content,
            invocation: None,
        }
    }

    /// A tool row for an invocation that has just been opened. The
    /// arguments are filled in when the invocation completes and the
    /// response when the tool runs.
    pub fn tool_call(invocation_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: EntryContent::Text(String::new()),
            invocation: Some(ToolCallRecord {
                invocation_id: invocation_id.into(),
                tool_name: tool_name.into(),
                arguments: String::new(),
                response: None,
            }),
        }
    }
}

/// Ordered conversation history with positional tool-call lookup.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<ConversationEntry>,
    positions: HashMap<String, usize>,
}

impl Transcript {
    pub fn new(seed_system_message: Option<&str>) -> Self {
        let mut transcript = Self::default();
        if let Some(seed) = seed_system_message {
            transcript.append(ConversationEntry::text(Role::System, seed));
        }
        transcript
    }

    /// Builds a transcript from wire-format history, expanding each
    /// assistant tool-call list into one tool row per invocation.
    pub fn from_wire(seed_system_message: Option<&str>, history: &[WireMessage]) -> Self {
        let mut transcript = Self::new(seed_system_message);

        for message in history {
            match message.role {
                WireRole::System | WireRole::User | WireRole::Assistant => {
                    let content = message
                        .content
                        .as_ref()
                        .map(EntryContent::from_wire)
                        .unwrap_or_else(|| EntryContent::Text(String::new()));
                    transcript.append(ConversationEntry::content(message.role.into(), content));

                    if let Some(calls) = &message.tool_calls {
                        for call in calls {
                            let mut row =
                                ConversationEntry::tool_call(&call.id, &call.function.name);
                            if let Some(record) = &mut row.invocation {
                                record.arguments = call.function.arguments.clone();
                            }
                            transcript.append(row);
                        }
                    }
                }
                WireRole::Tool => {
                    let response = wire_text(message.content.as_ref());
                    let id = message.tool_call_id.clone().unwrap_or_default();

                    if transcript.positions.contains_key(&id) {
                        transcript.record_tool_response(&id, &response);
                    } else {
                        // Tool message without a matching call: keep it
                        // as a standalone resolved row.
                        let mut row = ConversationEntry::tool_call(
                            id,
                            message.name.clone().unwrap_or_default(),
                        );
                        if let Some(record) = &mut row.invocation {
                            record.response = Some(response);
                        }
                        transcript.append(row);
                    }
                }
            }
        }

        transcript
    }

    pub fn append(&mut self, entry: ConversationEntry) {
        if let Some(record) = &entry.invocation {
            self.positions
                .entry(record.invocation_id.clone())
                .or_insert(self.entries.len());
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tool_row_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.role == Role::Tool)
            .count()
    }

    /// Overwrites the last assistant row's text, or appends a new
    /// assistant row when the last row is something else.
    pub fn update_last_assistant_text(&mut self, text: &str) {
        if let Some(last) = self.entries.last_mut()
            && last.role == Role::Assistant
        {
            last.content = EntryContent::Text(text.to_string());
            return;
        }

        self.append(ConversationEntry::text(Role::Assistant, text));
    }

    /// Fills in the final argument text of an opened tool row. With
    /// duplicate invocation ids the first row wins.
    pub fn complete_tool_call(&mut self, invocation_id: &str, arguments: &str) {
        if let Some(&index) = self.positions.get(invocation_id)
            && let Some(record) = self.entries[index].invocation.as_mut()
        {
            record.arguments = arguments.to_string();
        }
    }

    /// Records a tool's response. The response of a row is written at
    /// most once; later writes for the same id are ignored.
    pub fn record_tool_response(&mut self, invocation_id: &str, response: &str) {
        if let Some(&index) = self.positions.get(invocation_id)
            && let Some(record) = self.entries[index].invocation.as_mut()
            && record.response.is_none()
        {
            record.response = Some(response.to_string());
        }
    }

    pub fn to_wire_messages(&self) -> Vec<WireMessage> {
        let mut wire: Vec<WireMessage> = Vec::new();
        let mut open_assistant: Option<usize> = None;

        for entry in &self.entries {
            match entry.role {
                Role::System | Role::User => {
                    wire.push(WireMessage::new(
                        entry.role.into(),
                        Some(entry.content.to_wire()),
                    ));
                    if entry.role == Role::User {
                        open_assistant = None;
                    }
                }
                Role::Assistant => {
                    wire.push(WireMessage::new(
                        WireRole::Assistant,
                        Some(entry.content.to_wire()),
                    ));
                    open_assistant = Some(wire.len() - 1);
                }
                Role::Tool => {
                    let Some(record) = &entry.invocation else {
                        continue;
                    };

                    let index = match open_assistant {
                        Some(index) => index,
                        None => {
                            wire.push(WireMessage::new(WireRole::Assistant, None));
                            let index = wire.len() - 1;
                            open_assistant = Some(index);
                            index
                        }
                    };

                    wire[index]
                        .tool_calls
                        .get_or_insert_with(Vec::new)
                        .push(WireToolCall::function(
                            &record.invocation_id,
                            &record.tool_name,
                            &record.arguments,
                        ));

                    wire.push(WireMessage::tool_response(
                        &record.invocation_id,
                        &record.tool_name,
                        record.response.clone().unwrap_or_default(),
                    ));
                }
            }
        }

        // An assistant message whose only purpose is carrying tool
        // calls exports without a content field.
        for message in &mut wire {
            if message.role == WireRole::Assistant
                && message.tool_calls.is_some()
                && matches!(&message.content, Some(WireContent::Text(text)) if text.is_empty())
            {
                message.content = None;
            }
        }

        wire
    }
}

fn wire_text(content: Option<&WireContent>) -> String {
    match content {
        Some(WireContent::Text(text)) => text.clone(),
        Some(WireContent::Parts(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                WirePart::Text { text } => Some(text.as_str()),
                WirePart::ImageUrl { .. } => None,
            })
            .collect(),
        None => String::new(),
    }
}
