use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use parley_agent_loop::{run_loop_stream, RunCancellationToken};
use parley_protocol_data_stream::{ChatRequest, DataStreamEncoder, Frame, PROTOCOL_NAME};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::service::{ApiError, AppState};
use crate::transport::{pump_encoded_stream, send_frame, sse_body_stream, sse_response};

/// Greeting endpoint path.
pub const ROOT_PATH: &str = "/";
/// Health endpoint path.
pub const HEALTH_PATH: &str = "/health";
/// Chat turn endpoint path.
pub const CHAT_PATH: &str = "/chat";

/// Frames buffered per response: the pump holds at most one frame ahead of
/// the client, so back-pressure reaches the loop immediately.
const OUTBOUND_BUFFER: usize = 1;

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route(ROOT_PATH, get(root))
        .route(HEALTH_PATH, get(health))
}

pub fn chat_routes() -> Router<AppState> {
    Router::new().route(CHAT_PATH, post(chat))
}

/// Every route, bound to `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(chat_routes())
        .with_state(state)
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "parley server is running",
        "protocol": PROTOCOL_NAME,
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn chat(
    State(st): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(raw) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let req: ChatRequest =
        serde_json::from_value(raw).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    for issue in req.attachment_issues() {
        warn!(%issue, "forwarding message with attachment issue");
    }

    let credential = match st.credentials.acquire().await {
        Ok(credential) => credential,
        Err(e) => {
            warn!(error = %e, "turn aborted before the first step");
            return Ok(single_frame_response(Frame::error(e.to_string())));
        }
    };

    let registry = st.toolset.build(&credential)?;
    let config = st.agent_config(&credential);
    info!(
        messages = req.messages.len(),
        tools = registry.len(),
        model = %config.model,
        "chat turn accepted"
    );

    let token = RunCancellationToken::new();
    let events = run_loop_stream(config, registry, req.messages, Some(token.clone()));
    let (tx, rx) = mpsc::channel::<Bytes>(OUTBOUND_BUFFER);

    tokio::spawn(async move {
        let closed = tx.clone();
        let pump = pump_encoded_stream(events, DataStreamEncoder::new(), |frame| {
            let tx = tx.clone();
            async move { send_frame(&tx, frame).await }
        });
        // The loop may sit in a tool or the model with nothing to send, so
        // watch the receiver directly instead of waiting for a failed send.
        tokio::select! {
            pumped = pump => {
                if let Err(e) = pumped {
                    debug!(error = %e, "client went away, cancelling run");
                    token.cancel();
                }
            }
            _ = closed.closed() => {
                debug!("client disconnected mid-run, cancelling run");
                token.cancel();
            }
        }
    });

    Ok(sse_response(sse_body_stream(rx)))
}

fn single_frame_response(frame: Frame) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(1);
    tokio::spawn(async move {
        if let Err(e) = send_frame(&tx, frame).await {
            debug!(error = %e, "client went away before the error frame");
        }
    });
    sse_response(sse_body_stream(rx))
}
