/// Fragment relay between the generation backend and the caller
use crate::{
    error::ParlorError,
    llm::TokenStream,
};
use axum::response::sse::Event;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;

/// One frame of a turn's event stream
#[derive(Debug)]
pub enum Frame {
    /// A reply fragment, in generation order
    Token(String),
    /// Terminal failure frame
    Error(ParlorError),
    /// Terminal success marker
    Done,
}

impl Frame {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Frame::Token(_))
    }

    /// Server-sent event encoding
    pub fn to_event(&self) -> Event {
        match self {
            Frame::Token(token) => Event::default().data(json!({ "token": token }).to_string()),
            Frame::Error(e) => Event::default().data(format!("Error: {}", e.public_message())),
            Frame::Done => Event::default().data("[DONE]"),
        }
    }
}

/// What the relay saw before the stream ended
#[derive(Debug, Default)]
pub struct RelayOutcome {
    /// Every fragment received, concatenated
    pub reply: String,
    pub fragments: usize,
    /// Backend failure that ended the stream early
    pub upstream_error: Option<ParlorError>,
    /// The caller stopped listening
    pub caller_gone: bool,
}

impl RelayOutcome {
    /// Outcome of a generation request that never produced a stream
    pub fn failed(error: ParlorError) -> Self {
        Self {
            upstream_error: Some(error),
            ..Self::default()
        }
    }
}

/// Forward fragments to `frames` as they arrive while accumulating the reply.
///
/// Stops at the first backend error or when the receiver is dropped. Never
/// sends a terminal frame; that is left to whoever persists the turn.
pub async fn relay(mut stream: TokenStream, frames: &mpsc::Sender<Frame>) -> RelayOutcome {
    let mut outcome = RelayOutcome::default();

    while let Some(next) = stream.next().await {
        match next {
            Ok(fragment) => {
                outcome.reply.push_str(&fragment);
                outcome.fragments += 1;
                if frames.send(Frame::Token(fragment)).await.is_err() {
                    tracing::debug!(fragments = outcome.fragments, "caller disconnected mid-stream");
                    outcome.caller_gone = true;
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, fragments = outcome.fragments, "generation failed mid-stream");
                outcome.upstream_error = Some(e);
                break;
            }
        }
    }

    outcome
}
