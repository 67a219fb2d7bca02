//! One-stop wiring from an API key to a ready [`ChatAgent`].

use std::sync::Arc;
use std::time::Duration;

use crate::{ChatAgent, ChatError, HttpCompletionClient, SessionConfig, WireMessage};

/// Starts building an agent for the given model.
///
/// ```rust
/// use palaver::agent;
///
/// let chat_agent = agent("gpt-4o-mini")
///     .api_key("sk-test")
///     .system_message("You are a helpful assistant.")
///     .build()
///     .expect("agent should build");
///
/// assert!(chat_agent.transcript().is_some());
/// ```
pub fn agent(model: impl Into<String>) -> AgentBuilder {
    AgentBuilder::new(model)
}

/// Builds an [`HttpCompletionClient`] from an explicit key or the
/// `OPENAI_API_KEY` environment variable, applies the session settings,
/// and returns an agent that is already set up.
#[derive(Debug, Clone)]
pub struct AgentBuilder {
    config: SessionConfig,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl AgentBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            config: SessionConfig::new(model),
            api_key: None,
            base_url: None,
            timeout: None,
        }
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Overall request timeout for the underlying HTTP client. Without
    /// one, requests wait indefinitely.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn system_message(mut self, message: impl Into<String>) -> Self {
        self.config = self.config.with_system_message(message);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config = self.config.with_temperature(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config = self.config.with_max_tokens(max_tokens);
        self
    }

    pub fn history(mut self, history: Vec<WireMessage>) -> Self {
        self.config = self.config.with_history(history);
        self
    }

    /// Replaces the whole session configuration, keeping the connection
    /// settings already given to the builder.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<ChatAgent, ChatError> {
        let mut client = match self.api_key {
            Some(api_key) => HttpCompletionClient::new(api_key),
            None => HttpCompletionClient::from_env()?,
        };

        if let Some(base_url) = self.base_url {
            client = client.with_base_url(base_url);
        }

        if let Some(timeout) = self.timeout {
            let http = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|err| ChatError::setup(format!("http client failed to build: {err}")))?;
            client = client.with_http_client(http);
        }

        let mut chat_agent = ChatAgent::new(Arc::new(client));
        chat_agent.setup(self.config)?;
        Ok(chat_agent)
    }
}
