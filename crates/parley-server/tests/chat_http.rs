use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use parley_agent_loop::contracts::testing::{CountingToolSource, FailingTool, HangingTool};
use parley_agent_loop::contracts::{Credential, StaticCredentialProvider, Tool};
use parley_agent_loop::testing::{ScriptedLlmExecutor, ScriptedResponse};
use parley_agent_loop::{RegistryError, ToolRegistry};
use parley_protocol_data_stream::{FinishReason, Frame, FrameDecoder};
use parley_server::http::router;
use parley_server::{AppState, LocalToolset, ServerConfig, ToolsetFactory};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

fn app_with(responses: Vec<ScriptedResponse>, toolset: Arc<dyn ToolsetFactory>) -> Router {
    let config = ServerConfig {
        max_steps: 3,
        ..ServerConfig::default()
    };
    let state = AppState::new(config, Arc::new(StaticCredentialProvider::new("sk-test")), toolset)
        .with_llm_executor(Arc::new(ScriptedLlmExecutor::new(responses)));
    router(state)
}

fn app(responses: Vec<ScriptedResponse>) -> Router {
    app_with(responses, Arc::new(LocalToolset::new(true)))
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn user_turn(text: &str) -> Value {
    json!({
        "messages": [
            {"role": "user", "parts": [{"type": "text", "text": text}]}
        ]
    })
}

async fn frames_of(app: Router, request: Request<Body>) -> Vec<Frame> {
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let mut decoder = FrameDecoder::new();
    let mut frames: Vec<Frame> = decoder
        .push(&body)
        .into_iter()
        .map(|frame| frame.unwrap())
        .collect();
    frames.extend(decoder.finish().into_iter().map(|frame| frame.unwrap()));
    frames
}

async fn json_of(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn health_reports_ok_with_timestamp() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = json_of(app(vec![]), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn root_greets() {
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = json_of(app(vec![]), request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("running"));
}

#[tokio::test]
async fn empty_messages_is_bad_request() {
    let (status, body) = json_of(app(vec![]), chat_request(json!({"messages": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("messages must not be empty"));
}

#[tokio::test]
async fn last_message_must_be_from_user() {
    let body = json!({
        "messages": [
            {"role": "user", "parts": [{"type": "text", "text": "hi"}]},
            {"role": "assistant", "parts": [{"type": "text", "text": "hello"}]}
        ]
    });
    let (status, body) = json_of(app(vec![]), chat_request(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("last message"));
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"messages\": ["))
        .unwrap();
    let (status, body) = json_of(app(vec![]), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn text_turn_streams_frames_and_done() {
    let frames = frames_of(
        app(vec![ScriptedResponse::text(["Hel", "lo"])]),
        chat_request(user_turn("hi")),
    )
    .await;

    assert!(matches!(frames.first(), Some(Frame::Start { .. })));
    let text: String = frames
        .iter()
        .filter_map(|frame| match frame {
            Frame::TextDelta { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Hello");
    assert!(matches!(
        frames.last(),
        Some(Frame::Done {
            finish_reason: FinishReason::Stop,
            ..
        })
    ));
}

#[tokio::test]
async fn collapsible_call_streams_in_order() {
    let responses = vec![
        ScriptedResponse::tools().with_tool_call(
            "call_1",
            "collapsible",
            json!({"type": "code", "summary": "Example", "content": "fn main() {}"}),
        ),
        ScriptedResponse::text(["Shown in the panel."]),
    ];
    let frames = frames_of(app(responses), chat_request(user_turn("show code"))).await;

    let positions: Vec<usize> = ["tool-call-partial", "tool-call", "tool-result"]
        .iter()
        .map(|kind| {
            frames
                .iter()
                .position(|frame| {
                    serde_json::to_value(frame).unwrap()["type"] == *kind
                        && frame.tool_call_id() == Some("call_1")
                })
                .unwrap()
        })
        .collect();
    assert!(positions[0] < positions[1] && positions[1] < positions[2]);

    let result = frames
        .iter()
        .find_map(|frame| match frame {
            Frame::ToolResult { result, .. } => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(result["summary"], "Example");
    assert!(result["id"].as_str().unwrap().starts_with("collapsible_"));
}

#[tokio::test]
async fn model_failure_emits_error_frame_only() {
    let frames = frames_of(
        app(vec![ScriptedResponse::fail("invalid api key")]),
        chat_request(user_turn("hi")),
    )
    .await;
    assert!(matches!(frames.last(), Some(Frame::Error { .. })));
    assert!(!frames.iter().any(|frame| matches!(frame, Frame::Done { .. })));
}

#[tokio::test]
async fn missing_credential_yields_single_error_frame() {
    let state = AppState::new(
        ServerConfig::default(),
        Arc::new(StaticCredentialProvider::missing()),
        Arc::new(LocalToolset::new(true)),
    );
    let frames = frames_of(router(state), chat_request(user_turn("hi"))).await;
    assert_eq!(frames.len(), 1);
    match &frames[0] {
        Frame::Error { error_text } => assert!(error_text.contains("missing credential")),
        other => panic!("unexpected frame: {other:?}"),
    }
}

struct SourceToolset {
    tool: Arc<dyn Tool>,
    closes: Mutex<Vec<Arc<AtomicUsize>>>,
}

impl SourceToolset {
    fn new(tool: Arc<dyn Tool>) -> Self {
        Self {
            tool,
            closes: Mutex::new(Vec::new()),
        }
    }

    fn total_closes(&self) -> usize {
        self.closes
            .lock()
            .unwrap()
            .iter()
            .map(|counter| counter.load(Ordering::SeqCst))
            .sum()
    }
}

impl ToolsetFactory for SourceToolset {
    fn build(&self, _credential: &Credential) -> Result<ToolRegistry, RegistryError> {
        let source = CountingToolSource::new("remote", vec![self.tool.clone()]);
        self.closes.lock().unwrap().push(source.close_counter());
        ToolRegistry::builder().source(Arc::new(source)).build()
    }
}

#[tokio::test]
async fn throwing_tool_result_is_streamed_and_sources_released() {
    let responses = vec![
        ScriptedResponse::tools().with_tool_call("call_1", "flaky", json!({})),
        ScriptedResponse::text(["Sorry, that failed."]),
    ];
    let toolset = Arc::new(SourceToolset::new(Arc::new(FailingTool::new("flaky"))));
    let frames = frames_of(
        app_with(responses, toolset.clone()),
        chat_request(user_turn("go")),
    )
    .await;

    let failed = frames.iter().any(|frame| {
        matches!(
            frame,
            Frame::ToolResult { is_error: true, tool_call_id, .. } if tool_call_id == "call_1"
        )
    });
    assert!(failed);
    assert!(matches!(
        frames.last(),
        Some(Frame::Done {
            finish_reason: FinishReason::Stop,
            ..
        })
    ));

    assert_eq!(toolset.total_closes(), 1);
}

#[tokio::test]
async fn disconnect_during_tool_call_releases_sources() {
    let responses = vec![ScriptedResponse::tools().with_tool_call("call_1", "stuck", json!({}))];
    let toolset = Arc::new(SourceToolset::new(Arc::new(HangingTool::new("stuck"))));
    let response = app_with(responses, toolset.clone())
        .oneshot(chat_request(user_turn("go")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let mut seen = String::new();
    while !seen.contains("\"type\":\"tool-call\"") {
        let chunk = body.next().await.unwrap().unwrap();
        seen.push_str(std::str::from_utf8(&chunk).unwrap());
    }
    assert_eq!(toolset.total_closes(), 0);

    // Client goes away while the tool is still running.
    drop(body);
    tokio::time::timeout(Duration::from_secs(2), async {
        while toolset.total_closes() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sources released after disconnect");
    assert_eq!(toolset.total_closes(), 1);
}
