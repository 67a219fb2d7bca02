//! Small convenience constructors for common types.

use crate::{WireMessage, WireRole};

pub fn system_message(content: impl Into<String>) -> WireMessage {
    WireMessage::text(WireRole::System, content)
}

pub fn user_message(content: impl Into<String>) -> WireMessage {
    WireMessage::text(WireRole::User, content)
}

pub fn assistant_message(content: impl Into<String>) -> WireMessage {
    WireMessage::text(WireRole::Assistant, content)
}

/// A tool response message carrying the invocation id it answers.
pub fn tool_message(
    tool_call_id: impl Into<String>,
    name: impl Into<String>,
    content: impl Into<String>,
) -> WireMessage {
    WireMessage::tool_response(tool_call_id, name, content)
}

#[cfg(test)]
mod tests {
    use crate::{WireContent, WireRole};

    use super::{assistant_message, system_message, tool_message, user_message};

    #[test]
    fn message_helpers_apply_expected_roles() {
        assert_eq!(system_message("be brief").role, WireRole::System);
        assert_eq!(user_message("hello").role, WireRole::User);
        assert_eq!(assistant_message("hi").role, WireRole::Assistant);
    }

    #[test]
    fn tool_messages_carry_their_invocation_id() {
        let message = tool_message("call_0", "get_weather", "{\"temp_c\": 13}");
        assert_eq!(message.role, WireRole::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_0"));
        assert_eq!(message.name.as_deref(), Some("get_weather"));
        assert_eq!(
            message.content,
            Some(WireContent::Text("{\"temp_c\": 13}".to_string()))
        );
    }
}
