//! Reqwest-based streaming client for OpenAI-compatible endpoints.

use std::collections::BTreeMap;

use async_stream::try_stream;
use futures_util::StreamExt;
use pschema::ToolDeclaration;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    ClientError, ClientFuture, CompletionClient, CompletionFragment, CompletionRequest,
    FinishReason, FragmentStream, ResponseFormat, ToolCallFragment, ToolChoice, WireMessage,
};

/// Bearer credential for the completion endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Streaming chat-completion client speaking the OpenAI HTTP protocol.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    http: Client,
    api_key: ApiKey,
    base_url: String,
}

impl HttpCompletionClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: ApiKey::new(api_key),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Reads the credential from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, ClientError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ClientError::authentication("OPENAI_API_KEY is not set"))?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn parse_error(response: Response) -> ClientError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body)
            .unwrap_or_else(|| format!("completion request failed with status {status}"));

        Self::classify_status(status, message)
    }

    fn classify_status(status: StatusCode, message: String) -> ClientError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ClientError::authentication(message)
            }
            StatusCode::TOO_MANY_REQUESTS => ClientError::rate_limited(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                ClientError::timeout(message)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ClientError::invalid_request(message)
            }
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                ClientError::unavailable(message)
            }
            _ => ClientError::transport(message),
        }
    }

    fn fragment_stream(response: Response) -> FragmentStream {
        let stream = try_stream! {
            let mut chunks = response.bytes_stream();
            let mut sse_buffer = String::new();
            let mut finished = false;

            while let Some(item) = chunks.next().await {
                let bytes = item.map_err(|err| ClientError::transport(err.to_string()))?;
                let text = std::str::from_utf8(&bytes)
                    .map_err(|err| ClientError::transport(err.to_string()))?;
                sse_buffer.push_str(text);

                while let Some(newline_index) = sse_buffer.find('\n') {
                    let line = sse_buffer.drain(..=newline_index).collect::<String>();
                    let line = line.trim();

                    if !line.starts_with("data:") {
                        continue;
                    }

                    let payload = line.trim_start_matches("data:").trim();
                    if payload == "[DONE]" {
                        finished = true;
                        break;
                    }

                    // Comment lines and unknown payloads are skipped, not fatal.
                    let Ok(parsed) = serde_json::from_str::<ApiStreamChunk>(payload) else {
                        continue;
                    };

                    for fragment in fragments_from_chunk(parsed) {
                        yield fragment;
                    }
                }

                if finished {
                    break;
                }
            }
        };

        Box::pin(stream)
    }
}

impl CompletionClient for HttpCompletionClient {
    fn stream<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> ClientFuture<'a, Result<FragmentStream, ClientError>> {
        Box::pin(async move {
            request.validate()?;

            let body = build_api_body(&request);
            let response = self
                .http
                .post(self.endpoint())
                .bearer_auth(self.api_key.expose())
                .json(&body)
                .send()
                .await
                .map_err(|err| {
                    if err.is_timeout() {
                        ClientError::timeout(err.to_string())
                    } else {
                        ClientError::transport(err.to_string())
                    }
                })?;

            if !response.status().is_success() {
                return Err(Self::parse_error(response).await);
            }

            Ok(Self::fragment_stream(response))
        })
    }
}

fn build_api_body(request: &CompletionRequest) -> ApiRequestBody<'_> {
    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(request.tools.iter().map(ToolDeclaration::to_wire).collect())
    };

    ApiRequestBody {
        model: &request.model,
        messages: &request.messages,
        tools,
        tool_choice: request.tool_choice.as_ref().map(ToolChoice::to_wire),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stop: request.stop.as_deref(),
        response_format: request
            .response_format
            .as_ref()
            .map(ResponseFormat::to_wire),
        stream: true,
        extra: &request.extra,
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body).ok()?;
    Some(parsed.error.message)
}

fn fragments_from_chunk(chunk: ApiStreamChunk) -> Vec<CompletionFragment> {
    let mut fragments = Vec::new();
    let Some(choice) = chunk.choices.into_iter().next() else {
        return fragments;
    };

    if let Some(content) = choice.delta.content
        && !content.is_empty()
    {
        fragments.push(CompletionFragment::text_delta(content));
    }

    if let Some(calls) = choice.delta.tool_calls {
        for call in calls {
            fragments.push(CompletionFragment::tool_call_delta(ToolCallFragment {
                id: call.id,
                name: call
                    .function
                    .as_ref()
                    .and_then(|function| function.name.clone()),
                arguments: call.function.and_then(|function| function.arguments),
            }));
        }
    }

    if let Some(reason) = choice.finish_reason.as_deref() {
        fragments.push(CompletionFragment::finished(FinishReason::parse(reason)));
    }

    fragments
}

#[derive(Debug, Serialize)]
struct ApiRequestBody<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    stream: bool,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    choices: Vec<ApiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    delta: ApiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ApiDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiDeltaToolCall {
    id: Option<String>,
    function: Option<ApiDeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct ApiDeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}
