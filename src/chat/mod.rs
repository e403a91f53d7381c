/// Conversation turn pipeline
///
/// A turn runs in three stages:
/// 1. the context assembler builds the message list (system instruction,
///    recent turns, optional document snippets, the new message),
/// 2. the relay forwards reply fragments to the caller as they are generated,
/// 3. the finished turn pair is written once, after generation ends, and a
///    single terminal frame closes the stream.

mod context;
mod history;
mod relay;
mod service;

pub use context::{AssembledContext, ContextAssembler};
pub use history::{TurnPair, TurnStore};
pub use relay::{relay, Frame, RelayOutcome};
pub use service::ChatService;

use serde::{Deserialize, Serialize};

/// Streaming chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub message: String,
    /// Conversation grouping id stored with both turns
    #[serde(default)]
    pub chat_id: Option<String>,
}
