use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use pchat::prelude::*;
use pchat::EntryContent;
use pclient::{
    ClientError, ClientFuture, CompletionFragment, CompletionRequest, FinishReason, FragmentStream,
    ResponseFormat, ToolCallFragment, VecFragmentStream, WireContent, WireRole,
};
use pschema::{string, structured_output, tool_declaration};

type ScriptedPass = Vec<Result<CompletionFragment, ClientError>>;

/// Serves one scripted fragment pass per request and records every
/// request it was asked to send.
struct ScriptedClient {
    passes: Mutex<VecDeque<ScriptedPass>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    fn new(passes: Vec<ScriptedPass>) -> Arc<Self> {
        Arc::new(Self {
            passes: Mutex::new(passes.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl CompletionClient for ScriptedClient {
    fn stream<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> ClientFuture<'a, Result<FragmentStream, ClientError>> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(request);
            let pass = self
                .passes
                .lock()
                .expect("passes lock")
                .pop_front()
                .unwrap_or_default();
            Ok(VecFragmentStream::boxed(pass))
        })
    }
}

fn text(delta: &str) -> Result<CompletionFragment, ClientError> {
    Ok(CompletionFragment::text_delta(delta))
}

fn opening(id: &str, name: &str) -> Result<CompletionFragment, ClientError> {
    Ok(CompletionFragment::tool_call_delta(
        ToolCallFragment::opening(id, name),
    ))
}

fn arguments(delta: &str) -> Result<CompletionFragment, ClientError> {
    Ok(CompletionFragment::tool_call_delta(
        ToolCallFragment::arguments(delta),
    ))
}

fn finished(reason: FinishReason) -> Result<CompletionFragment, ClientError> {
    Ok(CompletionFragment::finished(reason))
}

fn weather_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        tool_declaration("get_current_weather", vec![string("location")])
            .with_description("Get the current weather in a given location"),
        |arguments| async move {
            let location = arguments["location"].as_str().unwrap_or("unknown").to_string();
            Ok(format!("{{\"location\": \"{location}\", \"temp_c\": 13}}"))
        },
    ))
}

async fn collect(stream: ChatEventStream<'_>) -> Vec<ChatEvent> {
    stream
        .map(|item| item.expect("turn event"))
        .collect::<Vec<_>>()
        .await
}

#[tokio::test]
async fn weather_turn_runs_the_tool_then_answers() {
    let client = ScriptedClient::new(vec![
        vec![
            opening("call_0", "get_current_weather"),
            arguments("{\"location\""),
            arguments(": \"Paris\"}"),
            finished(FinishReason::ToolCalls),
        ],
        vec![
            text("It is "),
            text("13 degrees in Paris."),
            finished(FinishReason::Stop),
        ],
    ]);

    let mut agent = ChatAgent::new(client.clone());
    agent
        .setup(
            SessionConfig::new("gpt-4o-mini").with_system_message("You are a helpful assistant."),
        )
        .expect("setup");

    let request = TurnRequest::new("What's the weather in Paris?").with_tool(weather_tool());
    let events = collect(agent.chat(request).expect("turn")).await;

    assert_eq!(
        events,
        vec![
            ChatEvent::ToolCall {
                name: "get_current_weather".into(),
                arguments: "{\"location\"".into(),
                finish: false,
            },
            ChatEvent::ToolCall {
                name: "get_current_weather".into(),
                arguments: "{\"location\": \"Paris\"}".into(),
                finish: false,
            },
            ChatEvent::ToolCall {
                name: "get_current_weather".into(),
                arguments: "{\"location\": \"Paris\"}".into(),
                finish: true,
            },
            ChatEvent::ToolResponse {
                name: "get_current_weather".into(),
                arguments: "{\"location\": \"Paris\"}".into(),
                response: "{\"location\": \"Paris\", \"temp_c\": 13}".into(),
            },
            ChatEvent::Text {
                content: "It is ".into(),
                delta: "It is ".into(),
            },
            ChatEvent::Text {
                content: "It is 13 degrees in Paris.".into(),
                delta: "13 degrees in Paris.".into(),
            },
        ]
    );

    // The tool row gained its response between the two cycles.
    let transcript = agent.transcript().expect("transcript");
    assert_eq!(transcript.len(), 4);
    assert_eq!(transcript.entries()[2].role, Role::Tool);
    let record = transcript.entries()[2].invocation.as_ref().expect("record");
    assert_eq!(record.arguments, "{\"location\": \"Paris\"}");
    assert_eq!(
        record.response.as_deref(),
        Some("{\"location\": \"Paris\", \"temp_c\": 13}")
    );

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].messages.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tool_choice, Some(ToolChoice::Auto));

    // The second request folds the call into a synthetic assistant
    // message followed by the tool response.
    let second = &requests[1];
    assert_eq!(second.messages.len(), 4);
    assert_eq!(second.messages[2].role, WireRole::Assistant);
    assert!(second.messages[2].content.is_none());
    let calls = second.messages[2].tool_calls.as_ref().expect("calls");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_0");
    assert_eq!(second.messages[3].role, WireRole::Tool);
    assert_eq!(second.messages[3].tool_call_id.as_deref(), Some("call_0"));

    let usage = agent.usage();
    assert!(usage.prompt_tokens > 0);
    assert!(usage.completion_tokens > 0);
    assert!(usage.cost > 0.0);
}

#[tokio::test]
async fn streamed_text_converges_with_the_transcript() {
    let client = ScriptedClient::new(vec![vec![
        text("Hel"),
        text("lo"),
        text(" there"),
        finished(FinishReason::Stop),
    ]]);

    let mut agent = ChatAgent::new(client);
    agent
        .setup(SessionConfig::new("gpt-4o-mini"))
        .expect("setup");

    let events = collect(agent.chat(TurnRequest::new("hi")).expect("turn")).await;

    let mut concatenated = String::new();
    for event in &events {
        let ChatEvent::Text { content, delta } = event else {
            panic!("expected only text events");
        };
        concatenated.push_str(delta);
        assert_eq!(content, &concatenated);
    }
    assert_eq!(concatenated, "Hello there");

    let transcript = agent.transcript().expect("transcript");
    assert_eq!(
        transcript.entries()[1].content,
        EntryContent::Text("Hello there".to_string())
    );
}

#[tokio::test]
async fn tool_batches_resolve_in_creation_order() {
    let client = ScriptedClient::new(vec![
        vec![
            opening("call_a", "first_step"),
            arguments("{}"),
            opening("call_b", "second_step"),
            arguments("{}"),
            finished(FinishReason::ToolCalls),
        ],
        vec![text("done"), finished(FinishReason::Stop)],
    ]);

    let log = Arc::new(Mutex::new(Vec::new()));

    let first_log = Arc::clone(&log);
    let first: Arc<dyn Tool> = Arc::new(FunctionTool::new(
        tool_declaration("first_step", vec![]),
        move |_arguments| {
            let log = Arc::clone(&first_log);
            async move {
                log.lock().expect("log lock").push("first_step");
                Ok("first done".to_string())
            }
        },
    ));
    let second_log = Arc::clone(&log);
    let second: Arc<dyn Tool> = Arc::new(FunctionTool::new(
        tool_declaration("second_step", vec![]),
        move |_arguments| {
            let log = Arc::clone(&second_log);
            async move {
                log.lock().expect("log lock").push("second_step");
                Ok("second done".to_string())
            }
        },
    ));

    let mut agent = ChatAgent::new(client.clone());
    agent
        .setup(SessionConfig::new("gpt-4o-mini"))
        .expect("setup");

    let request = TurnRequest::new("run both").with_tools(vec![first, second]);
    let events = collect(agent.chat(request).expect("turn")).await;

    assert_eq!(*log.lock().expect("log lock"), vec!["first_step", "second_step"]);

    let responses: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            ChatEvent::ToolResponse { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(responses, vec!["first_step", "second_step"]);

    // Both calls and both responses are on the wire before the second
    // request goes out.
    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    let folded = &requests[1].messages[1];
    assert_eq!(folded.tool_calls.as_ref().map(Vec::len), Some(2));
    assert_eq!(requests[1].messages[2].role, WireRole::Tool);
    assert_eq!(requests[1].messages[3].role, WireRole::Tool);
    assert_eq!(
        requests[1].messages[2].tool_call_id.as_deref(),
        Some("call_a")
    );
    assert_eq!(
        requests[1].messages[3].tool_call_id.as_deref(),
        Some("call_b")
    );
}

#[tokio::test]
async fn forced_tool_choice_is_single_shot() {
    let client = ScriptedClient::new(vec![vec![
        opening("call_0", "get_current_weather"),
        arguments("{\"location\": \"Paris\"}"),
        finished(FinishReason::ToolCalls),
    ]]);

    let mut agent = ChatAgent::new(client.clone());
    agent
        .setup(SessionConfig::new("gpt-4o-mini"))
        .expect("setup");

    let request = TurnRequest::new("weather, via the tool")
        .with_tool(weather_tool())
        .with_tool_choice(ToolChoice::function("get_current_weather"));
    let events = collect(agent.chat(request).expect("turn")).await;

    assert_eq!(client.requests().len(), 1);
    assert!(matches!(
        events.last(),
        Some(ChatEvent::ToolResponse { .. })
    ));

    let transcript = agent.transcript().expect("transcript");
    let record = transcript.entries()[1].invocation.as_ref().expect("record");
    assert!(record.response.is_some());
}

#[tokio::test]
async fn tool_failures_become_responses_and_the_agent_survives() {
    let client = ScriptedClient::new(vec![
        vec![
            opening("call_0", "flaky"),
            arguments("{}"),
            finished(FinishReason::ToolCalls),
        ],
        vec![text("the tool failed"), finished(FinishReason::Stop)],
        vec![text("still here"), finished(FinishReason::Stop)],
    ]);

    let flaky: Arc<dyn Tool> = Arc::new(FunctionTool::new(
        tool_declaration("flaky", vec![]),
        |_arguments| async { Err(ToolError::execution("backing service offline")) },
    ));

    let mut agent = ChatAgent::new(client.clone());
    agent
        .setup(SessionConfig::new("gpt-4o-mini"))
        .expect("setup");

    let request = TurnRequest::new("try the tool").with_tool(flaky);
    let events = collect(agent.chat(request).expect("turn")).await;

    let response = events
        .iter()
        .find_map(|event| match event {
            ChatEvent::ToolResponse { response, .. } => Some(response.clone()),
            _ => None,
        })
        .expect("tool response");
    assert!(response.contains("Execution"));
    assert!(response.contains("backing service offline"));

    // The failure is data; the next turn proceeds normally.
    let events = collect(agent.chat(TurnRequest::new("go on")).expect("turn")).await;
    assert_eq!(
        events,
        vec![ChatEvent::Text {
            content: "still here".into(),
            delta: "still here".into(),
        }]
    );
    assert_eq!(client.requests().len(), 3);
}

#[tokio::test]
async fn usage_accumulates_across_turns() {
    let client = ScriptedClient::new(vec![
        vec![text("first reply"), finished(FinishReason::Stop)],
        vec![text("second reply"), finished(FinishReason::Stop)],
    ]);

    let mut agent = ChatAgent::new(client);
    agent
        .setup(SessionConfig::new("gpt-4o-mini"))
        .expect("setup");

    assert_eq!(agent.usage(), Usage::default());

    collect(agent.chat(TurnRequest::new("one")).expect("turn")).await;
    let after_first = agent.usage();
    assert!(after_first.prompt_tokens > 0);
    assert!(after_first.completion_tokens > 0);
    assert!(after_first.cost > 0.0);

    collect(agent.chat(TurnRequest::new("two")).expect("turn")).await;
    let after_second = agent.usage();
    assert!(after_second.prompt_tokens > after_first.prompt_tokens);
    assert!(after_second.completion_tokens > after_first.completion_tokens);
    assert!(after_second.cost > after_first.cost);
}

#[tokio::test]
async fn length_truncation_continues_into_one_assistant_row() {
    let client = ScriptedClient::new(vec![
        vec![text("Once upon"), finished(FinishReason::Length)],
        vec![text(" a time."), finished(FinishReason::Stop)],
    ]);

    let mut agent = ChatAgent::new(client.clone());
    agent
        .setup(SessionConfig::new("gpt-4o-mini").with_system_message("storyteller"))
        .expect("setup");

    let events = collect(agent.chat(TurnRequest::new("Tell me a story")).expect("turn")).await;

    assert_eq!(
        events,
        vec![
            ChatEvent::Text {
                content: "Once upon".into(),
                delta: "Once upon".into(),
            },
            ChatEvent::Text {
                content: "Once upon a time.".into(),
                delta: " a time.".into(),
            },
        ]
    );

    // One assistant row, not one per cycle.
    let transcript = agent.transcript().expect("transcript");
    assert_eq!(transcript.len(), 3);
    assert_eq!(
        transcript.entries()[2].content,
        EntryContent::Text("Once upon a time.".to_string())
    );

    // The resend carries the partial text back to the model.
    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].messages[2].content,
        Some(WireContent::Text("Once upon".to_string()))
    );
}

#[tokio::test]
async fn a_completion_preseed_opens_the_assistant_row() {
    let client = ScriptedClient::new(vec![vec![
        text(" an assistant."),
        finished(FinishReason::Stop),
    ]]);

    let mut agent = ChatAgent::new(client.clone());
    agent
        .setup(SessionConfig::new("gpt-4o-mini"))
        .expect("setup");

    let request = TurnRequest::new("Who are you?").with_completion("Hello. I am");
    let events = collect(agent.chat(request).expect("turn")).await;

    assert_eq!(
        events,
        vec![ChatEvent::Text {
            content: "Hello. I am an assistant.".into(),
            delta: " an assistant.".into(),
        }]
    );

    // The seed went out on the wire and the row absorbed the rest.
    let requests = client.requests();
    assert_eq!(requests[0].messages.len(), 2);
    assert_eq!(
        requests[0].messages[1].content,
        Some(WireContent::Text("Hello. I am".to_string()))
    );

    let transcript = agent.transcript().expect("transcript");
    assert_eq!(transcript.len(), 2);
    assert_eq!(
        transcript.entries()[1].content,
        EntryContent::Text("Hello. I am an assistant.".to_string())
    );
}

#[tokio::test]
async fn environment_lines_travel_without_entering_the_transcript() {
    let client = ScriptedClient::new(vec![vec![text("noted"), finished(FinishReason::Stop)]]);

    let mut agent = ChatAgent::new(client.clone());
    agent
        .setup(
            SessionConfig::new("gpt-4o-mini")
                .with_system_message("helper")
                .with_environment(vec!["battery: 80%".to_string()]),
        )
        .expect("setup");

    collect(agent.chat(TurnRequest::new("status?")).expect("turn")).await;

    let requests = client.requests();
    assert_eq!(
        requests[0].messages[0].content,
        Some(WireContent::Text("helper\nbattery: 80%".to_string()))
    );

    // The transcript and its wire export stay clean.
    let transcript = agent.transcript().expect("transcript");
    assert_eq!(
        transcript.entries()[0].content,
        EntryContent::Text("helper".to_string())
    );
    assert_eq!(
        agent.wire_messages()[0].content,
        Some(WireContent::Text("helper".to_string()))
    );
}

#[tokio::test]
async fn turn_options_propagate_to_the_request() {
    let client = ScriptedClient::new(vec![vec![
        text("{\"summary\": \"mild\"}"),
        finished(FinishReason::Stop),
    ]]);

    let mut agent = ChatAgent::new(client.clone());
    agent
        .setup(
            SessionConfig::new("gpt-4o-mini").with_structured_output(structured_output(
                "weather_report",
                vec![string("summary")],
            )),
        )
        .expect("setup");

    let request = TurnRequest::new("report, as JSON")
        .with_tool(weather_tool())
        .with_tool_choice(ToolChoice::Disabled)
        .with_stop_words(vec!["END".to_string()])
        .with_json_mode(true);
    collect(agent.chat(request).expect("turn")).await;

    let sent = &client.requests()[0];
    assert_eq!(sent.tool_choice, Some(ToolChoice::Disabled));
    assert_eq!(sent.stop, Some(vec!["END".to_string()]));
    let Some(ResponseFormat::JsonSchema(output)) = &sent.response_format else {
        panic!("expected the declared schema");
    };
    assert_eq!(output.name, "weather_report");
}

#[tokio::test]
async fn lenient_parsing_repairs_truncated_arguments() {
    let passes = || {
        vec![
            vec![
                opening("call_0", "get_current_weather"),
                arguments("{\"location\": \"Par"),
                finished(FinishReason::ToolCalls),
            ],
            vec![text("ok"), finished(FinishReason::Stop)],
        ]
    };

    let lenient_client = ScriptedClient::new(passes());
    let mut lenient = ChatAgent::new(lenient_client);
    lenient
        .setup(SessionConfig::new("gpt-4o-mini"))
        .expect("setup");
    let request = TurnRequest::new("weather").with_tool(weather_tool());
    let events = collect(lenient.chat(request.clone()).expect("turn")).await;

    let repaired = events
        .iter()
        .find_map(|event| match event {
            ChatEvent::ToolResponse { response, .. } => Some(response.clone()),
            _ => None,
        })
        .expect("tool response");
    assert_eq!(repaired, "{\"location\": \"Par\", \"temp_c\": 13}");

    let strict_client = ScriptedClient::new(passes());
    let mut strict = ChatAgent::new(strict_client);
    strict
        .setup(SessionConfig::new("gpt-4o-mini").with_strict_arguments(true))
        .expect("setup");
    let events = collect(strict.chat(request).expect("turn")).await;

    let rejected = events
        .iter()
        .find_map(|event| match event {
            ChatEvent::ToolResponse { response, .. } => Some(response.clone()),
            _ => None,
        })
        .expect("tool response");
    assert!(rejected.contains("InvalidArguments"));
    assert!(rejected.contains("did not parse"));
}

#[tokio::test]
async fn network_failures_surface_and_end_the_turn() {
    let client = ScriptedClient::new(vec![vec![
        text("par"),
        Err(ClientError::rate_limited("slow down")),
        text("never seen"),
    ]]);

    let mut agent = ChatAgent::new(client);
    agent
        .setup(SessionConfig::new("gpt-4o-mini"))
        .expect("setup");

    let mut stream = agent.chat(TurnRequest::new("hi")).expect("turn");
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item);
    }
    drop(stream);

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    let err = items[1].clone().expect_err("network error");
    assert_eq!(err.kind, ChatErrorKind::Client);
    assert!(err.message.contains("RateLimited"));

    // Rows written before the failure stay in place.
    let transcript = agent.transcript().expect("transcript");
    assert_eq!(
        transcript.entries()[1].content,
        EntryContent::Text("par".to_string())
    );
}
