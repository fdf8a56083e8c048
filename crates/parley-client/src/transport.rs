use crate::session::{Session, SessionError, SessionStatus};
use futures::{Stream, StreamExt};
use parley_contract::Message;
use parley_protocol_data_stream::{decode_frames, ChatRequest, DecodeError, Frame};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// HTTP client for `POST /chat`.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ChatClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/chat", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send the transcript and return the decoded frame stream.
    pub async fn send(
        &self,
        messages: Vec<Message>,
    ) -> Result<impl Stream<Item = Result<Frame, DecodeError>>, TransportError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, parley_protocol_data_stream::CONTENT_TYPE)
            .json(&ChatRequest::new(messages))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(decode_frames(response.bytes_stream()))
    }

    /// Run one turn: submit `message`, stream frames into `session` and call
    /// `on_update` after every applied frame.
    ///
    /// Transport failures close the turn with status `Error`; they are only
    /// returned as `Err` when the request could not be started.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        message: Message,
        mut on_update: impl FnMut(&Session),
    ) -> Result<SessionStatus, TransportError> {
        session.submit(message)?;

        let frames = match self.send(session.messages().to_vec()).await {
            Ok(frames) => frames,
            Err(e) => {
                session.fail_transport(&e);
                return Err(e);
            }
        };
        futures::pin_mut!(frames);

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(frame) => {
                    session.apply(&frame);
                    on_update(session);
                }
                Err(DecodeError::Transport(reason)) => {
                    session.fail_transport(reason);
                    on_update(session);
                    break;
                }
                Err(e) => tracing::warn!(error = %e, "skipping undecodable frame"),
            }
            if !session.status().is_busy() {
                break;
            }
        }

        if session.status().is_busy() {
            session.fail_transport("stream ended before the turn finished");
            on_update(session);
        }
        Ok(session.status())
    }
}
