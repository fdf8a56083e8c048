//! SSE plumbing between an agent event stream and an HTTP response body.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parley_agent_loop::contracts::{AgentEvent, Transcoder};
use parley_protocol_data_stream::{encode_sse, Frame, CONTENT_TYPE};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("io error: {0}")]
    Io(String),
}

/// Drive `events` through `encoder`, handing each output item to `send`.
///
/// Returns as soon as `send` fails; the caller decides what a closed sink
/// means for the producer.
pub async fn pump_encoded_stream<E, SendFn, SendFut>(
    mut events: Pin<Box<dyn Stream<Item = AgentEvent> + Send>>,
    mut encoder: E,
    mut send: SendFn,
) -> Result<(), TransportError>
where
    E: Transcoder<Input = AgentEvent>,
    SendFn: FnMut(E::Output) -> SendFut,
    SendFut: Future<Output = Result<(), TransportError>>,
{
    for item in encoder.prologue() {
        send(item).await?;
    }

    while let Some(event) = events.next().await {
        for item in encoder.transcode(&event) {
            send(item).await?;
        }
    }

    for item in encoder.epilogue() {
        send(item).await?;
    }
    Ok(())
}

/// Serialize one frame and push it into the response channel.
pub async fn send_frame(tx: &mpsc::Sender<Bytes>, frame: Frame) -> Result<(), TransportError> {
    let chunk = encode_sse(&frame).map_err(|e| {
        tracing::warn!(error = %e, "failed to serialize SSE frame");
        TransportError::Io(format!("serialize frame failed: {e}"))
    })?;
    tx.send(chunk).await.map_err(|_| TransportError::Closed)
}

pub fn sse_body_stream(
    mut rx: mpsc::Receiver<Bytes>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(chunk);
        }
    }
}

pub fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    (headers, Body::from_stream(stream)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_agent_loop::contracts::{Identity, TerminationReason};
    use parley_protocol_data_stream::DataStreamEncoder;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn run_events() -> Vec<AgentEvent> {
        vec![
            AgentEvent::RunStart {
                run_id: "r1".into(),
                message_id: "m1".into(),
            },
            AgentEvent::StepStart {
                step: 1,
                message_id: "m1".into(),
            },
            AgentEvent::TextDelta {
                delta: "Hi".into(),
            },
            AgentEvent::StepFinish {
                step: 1,
                tool_calls: Vec::new(),
            },
            AgentEvent::RunFinish {
                run_id: "r1".into(),
                result: Some(json!({"response": "Hi"})),
                termination: TerminationReason::NaturalEnd,
            },
        ]
    }

    #[tokio::test]
    async fn pump_writes_sse_chunks_in_order() {
        let (tx, mut rx) = mpsc::channel::<Bytes>(16);
        let events = Box::pin(futures::stream::iter(run_events()));
        pump_encoded_stream(events, DataStreamEncoder::new(), |frame| {
            let tx = tx.clone();
            async move { send_frame(&tx, frame).await }
        })
        .await
        .unwrap();
        drop(tx);

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(String::from_utf8(chunk.to_vec()).unwrap());
        }
        assert_eq!(chunks.len(), 5);
        assert!(chunks[0].starts_with("data: {\"type\":\"start\""));
        assert!(chunks[2].contains("\"delta\":\"Hi\""));
        assert!(chunks[4].contains("\"type\":\"done\""));
        assert!(chunks.iter().all(|c| c.ends_with("\n\n")));
    }

    #[tokio::test]
    async fn pump_stops_at_first_failed_send() {
        let seen = Arc::new(Mutex::new(0usize));
        let events = Box::pin(futures::stream::iter(run_events()));
        let counter = seen.clone();
        let result = pump_encoded_stream(events, Identity::<AgentEvent>::default(), |_event| {
            let counter = counter.clone();
            async move {
                let mut n = counter.lock().unwrap();
                *n += 1;
                if *n == 2 {
                    Err(TransportError::Closed)
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert_eq!(result, Err(TransportError::Closed));
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn send_frame_reports_closed_channel() {
        let (tx, rx) = mpsc::channel::<Bytes>(1);
        drop(rx);
        let err = send_frame(&tx, Frame::text_delta("x")).await.unwrap_err();
        assert_eq!(err, TransportError::Closed);
    }

    #[tokio::test]
    async fn sse_body_stream_yields_all_chunks() {
        let (tx, rx) = mpsc::channel::<Bytes>(4);
        let stream = sse_body_stream(rx);
        tokio::pin!(stream);

        tx.send(Bytes::from("a")).await.unwrap();
        tx.send(Bytes::from("b")).await.unwrap();
        drop(tx);

        let items: Vec<Bytes> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![Bytes::from("a"), Bytes::from("b")]);
    }

    #[test]
    fn sse_response_sets_stream_headers() {
        let (_tx, rx) = mpsc::channel::<Bytes>(1);
        let response = sse_response(sse_body_stream(rx));
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    }
}
