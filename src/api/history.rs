/// Conversation history endpoints
use crate::{
    auth::AuthContext,
    context::AppContext,
    db::models::Turn,
    error::{ParlorError, ParlorResult},
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

const MAX_HISTORY_LIMIT: usize = 200;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/history", get(get_history))
        .route("/history/conversation", post(assign_conversation))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    turns: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
struct AssignConversationRequest {
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct AssignConversationResponse {
    updated: u64,
}

/// GET /history
async fn get_history(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<HistoryQuery>,
) -> ParlorResult<Json<HistoryResponse>> {
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_HISTORY_LIMIT);
    let turns = ctx.turn_store.recent(auth.account_id, limit).await?;
    Ok(Json(HistoryResponse { turns }))
}

/// POST /history/conversation
async fn assign_conversation(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<AssignConversationRequest>,
) -> ParlorResult<Json<AssignConversationResponse>> {
    let chat_id = req.chat_id.trim();
    if chat_id.is_empty() {
        return Err(ParlorError::InvalidInput("chat_id cannot be empty".to_string()));
    }

    let updated = ctx.turn_store.backfill_chat_id(auth.account_id, chat_id).await?;
    tracing::info!(account_id = auth.account_id, chat_id, updated, "conversation id assigned");

    Ok(Json(AssignConversationResponse { updated }))
}
