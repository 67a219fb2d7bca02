//! Agent-layer errors and classification.

use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    Setup,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatError {
    pub kind: ChatErrorKind,
    pub message: String,
}

impl ChatError {
    pub fn new(kind: ChatErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn setup(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Setup, message)
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Client, message)
    }
}

impl Display for ChatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for ChatError {}

impl From<pclient::ClientError> for ChatError {
    fn from(value: pclient::ClientError) -> Self {
        ChatError::client(value.to_string())
    }
}
