/// Streaming chat endpoint
use crate::{
    chat::{ChatRequest, Frame},
    context::AppContext,
};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/chat", post(chat))
}

/// POST /chat
///
/// Replies with `text/event-stream`: one `{"token": ...}` frame per fragment,
/// then `[DONE]` or a single `Error: ...` frame. Validation failures are
/// reported in-stream too.
async fn chat(
    State(ctx): State<AppContext>,
    Json(req): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let frames = ctx
        .chat_service
        .clone()
        .stream_turn(req.username, req.message, req.chat_id);

    let events = frames.map(|frame: Frame| Ok(frame.to_event()));
    Sse::new(events).keep_alive(KeepAlive::default())
}
