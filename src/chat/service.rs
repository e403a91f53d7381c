/// Turn orchestration: assemble, relay, persist
use crate::{
    account::AccountManager,
    chat::{relay, AssembledContext, ContextAssembler, Frame, RelayOutcome, TurnStore},
    config::RetrievalConfig,
    documents::DocumentService,
    error::{ParlorError, ParlorResult},
    llm::{ChatBackend, GenerationOptions},
    metrics,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;
use uuid::Uuid;

/// Frames buffered between the relay task and the HTTP response
const FRAME_BUFFER: usize = 64;

/// Runs conversation turns against the generation backend
pub struct ChatService {
    assembler: ContextAssembler,
    turns: Arc<TurnStore>,
    backend: Arc<dyn ChatBackend>,
    options: GenerationOptions,
}

impl ChatService {
    pub fn new(
        accounts: Arc<AccountManager>,
        turns: Arc<TurnStore>,
        documents: Arc<DocumentService>,
        backend: Arc<dyn ChatBackend>,
        retrieval: RetrievalConfig,
        options: GenerationOptions,
    ) -> Self {
        let assembler = ContextAssembler::new(
            accounts,
            turns.clone(),
            documents,
            backend.clone(),
            retrieval,
            options,
        );
        Self {
            assembler,
            turns,
            backend,
            options,
        }
    }

    /// Start a turn on its own task and return its frames.
    ///
    /// The stream always ends with exactly one terminal frame (`Done` or
    /// `Error`) unless the receiver is dropped first.
    pub fn stream_turn(
        self: Arc<Self>,
        username: String,
        message: String,
        chat_id: Option<String>,
    ) -> ReceiverStream<Frame> {
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let span = tracing::info_span!("turn", turn_id = %Uuid::new_v4(), username = %username);
        tokio::spawn(
            async move {
                self.run_turn(&username, &message, chat_id.as_deref(), &tx)
                    .await;
            }
            .instrument(span),
        );
        ReceiverStream::new(rx)
    }

    /// Run a turn to completion and return the full reply
    pub async fn complete_turn(
        self: Arc<Self>,
        username: String,
        message: String,
        chat_id: Option<String>,
    ) -> ParlorResult<String> {
        let mut frames = self.stream_turn(username, message, chat_id);
        let mut reply = String::new();

        while let Some(frame) = frames.next().await {
            match frame {
                Frame::Token(token) => reply.push_str(&token),
                Frame::Error(e) => return Err(e),
                Frame::Done => return Ok(reply),
            }
        }

        Err(ParlorError::Internal(
            "Turn ended without a terminal frame".to_string(),
        ))
    }

    async fn run_turn(
        &self,
        username: &str,
        message: &str,
        chat_id: Option<&str>,
        frames: &mpsc::Sender<Frame>,
    ) {
        let context = match self.assembler.assemble(username, message).await {
            Ok(context) => context,
            Err(e) => {
                tracing::info!(username, error = %e, "turn rejected");
                metrics::record_turn_rejected();
                let _ = frames.send(Frame::Error(e)).await;
                return;
            }
        };

        metrics::record_turn_started();
        let pending = PendingTurn::new(&self.turns, &context, chat_id);

        let outcome = match self
            .backend
            .stream_chat(&context.messages, &self.options)
            .await
        {
            Ok(stream) => relay(stream, frames).await,
            Err(e) => RelayOutcome::failed(e),
        };

        let terminal = pending.finish(outcome).await;
        // The caller may already be gone; the turn is saved either way.
        let _ = frames.send(terminal).await;
    }
}

/// A turn whose reply is being generated.
///
/// `finish` consumes the guard, so the pair is written at most once and only
/// after generation has ended.
struct PendingTurn<'a> {
    turns: &'a TurnStore,
    account_id: i64,
    username: &'a str,
    chat_id: Option<&'a str>,
    user_message: &'a str,
}

impl<'a> PendingTurn<'a> {
    fn new(turns: &'a TurnStore, context: &'a AssembledContext, chat_id: Option<&'a str>) -> Self {
        Self {
            turns,
            account_id: context.account.id,
            username: &context.account.username,
            chat_id,
            user_message: &context.message,
        }
    }

    /// Save whatever was generated and pick the terminal frame
    async fn finish(self, outcome: RelayOutcome) -> Frame {
        metrics::record_fragments(outcome.fragments);

        let saved = if outcome.reply.is_empty() {
            tracing::debug!(username = self.username, "no reply generated, nothing saved");
            Ok(())
        } else {
            self.turns
                .append_pair(self.account_id, self.chat_id, self.user_message, &outcome.reply)
                .await
                .map(|pair| {
                    tracing::debug!(
                        username = self.username,
                        user_turn_id = pair.user_turn_id,
                        assistant_turn_id = pair.assistant_turn_id,
                        partial = outcome.upstream_error.is_some() || outcome.caller_gone,
                        "turn saved"
                    );
                })
        };

        if let Err(e) = &saved {
            tracing::error!(username = self.username, error = %e, "failed to save turn");
            metrics::record_persistence_failure();
        }

        match (outcome.upstream_error, saved) {
            (Some(upstream), _) => {
                metrics::record_turn_finished("upstream_failure");
                Frame::Error(upstream)
            }
            (None, Err(storage)) => {
                metrics::record_turn_finished("storage_failure");
                Frame::Error(storage)
            }
            (None, Ok(())) => {
                metrics::record_turn_finished("completed");
                Frame::Done
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{DocumentConfig, ServerConfig},
        db::{self, models::Role},
        documents::tests::LetterEmbedder,
        llm::fakes::{ScriptedBackend, Step},
        vector::MemoryIndex,
    };
    use sqlx::SqlitePool;

    struct Fixture {
        service: Arc<ChatService>,
        backend: Arc<ScriptedBackend>,
        turns: Arc<TurnStore>,
        pool: SqlitePool,
        alice_id: i64,
    }

    async fn fixture(backend: ScriptedBackend) -> Fixture {
        let pool = db::create_memory_pool().await.unwrap();
        let accounts = Arc::new(AccountManager::new(
            pool.clone(),
            Arc::new(ServerConfig::default()),
        ));
        let alice_id = accounts.register("alice", "password123").await.unwrap().id;
        let turns = Arc::new(TurnStore::new(pool.clone()));
        let documents = Arc::new(DocumentService::new(
            Arc::new(LetterEmbedder),
            Arc::new(MemoryIndex::new()),
            DocumentConfig::default(),
        ));
        let backend = Arc::new(backend);
        let service = Arc::new(ChatService::new(
            accounts,
            turns.clone(),
            documents,
            backend.clone(),
            RetrievalConfig::default(),
            GenerationOptions {
                temperature: 0.7,
                max_tokens: 64,
            },
        ));
        Fixture {
            service,
            backend,
            turns,
            pool,
            alice_id,
        }
    }

    async fn run(f: &Fixture, username: &str, message: &str) -> Vec<Frame> {
        f.service
            .clone()
            .stream_turn(username.to_string(), message.to_string(), None)
            .collect()
            .await
    }

    fn tokens(frames: &[Frame]) -> Vec<&str> {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_successful_turn_is_saved() {
        let f = fixture(ScriptedBackend::tokens(&["Hello", ", how can I help?"])).await;

        let frames = run(&f, "alice", "Hi there!").await;
        assert_eq!(tokens(&frames), vec!["Hello", ", how can I help?"]);
        assert!(matches!(frames.last(), Some(Frame::Done)));
        assert_eq!(frames.iter().filter(|f| f.is_terminal()).count(), 1);

        let history = f.turns.recent(f.alice_id, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Hi there!");
        assert_eq!(history[1].content, "Hello, how can I help?");
    }

    #[tokio::test]
    async fn test_unknown_user_never_reaches_backend() {
        let f = fixture(ScriptedBackend::tokens(&["x"])).await;

        let frames = run(&f, "ghost", "hello").await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Frame::Error(ParlorError::NotFound(_))));
        assert_eq!(f.backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let f = fixture(ScriptedBackend::tokens(&["x"])).await;

        let frames = run(&f, "alice", "").await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Frame::Error(ParlorError::InvalidInput(_))));
        assert_eq!(f.backend.calls(), 0);
        assert!(f.turns.recent(f.alice_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_saves_partial_reply() {
        let f = fixture(ScriptedBackend::new(vec![
            Step::Token("Hel"),
            Step::Token("lo"),
            Step::Fail("model crashed"),
        ]))
        .await;

        let frames = run(&f, "alice", "Say hello").await;
        assert_eq!(frames.len(), 3);
        assert_eq!(tokens(&frames), vec!["Hel", "lo"]);
        assert!(matches!(frames[2], Frame::Error(ParlorError::Upstream(_))));

        let history = f.turns.recent(f.alice_id, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Say hello");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_storage_failure_reported_after_tokens() {
        let f = fixture(ScriptedBackend::tokens(&["Hi", " there"])).await;
        sqlx::query(
            "CREATE TRIGGER reject_reply BEFORE INSERT ON turn WHEN NEW.role = 'assistant'
             BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(&f.pool)
        .await
        .unwrap();

        let frames = run(&f, "alice", "Greet me").await;
        assert_eq!(tokens(&frames).concat(), "Hi there");
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[2], Frame::Error(ParlorError::Storage(_))));

        assert!(f.turns.recent(f.alice_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_before_any_output_saves_nothing() {
        let f = fixture(ScriptedBackend::new(vec![Step::Fail("connection refused")])).await;

        let frames = run(&f, "alice", "hello").await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Frame::Error(ParlorError::Upstream(_))));
        assert!(f.turns.recent(f.alice_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_still_saves_partial_reply() {
        let f = fixture(ScriptedBackend::tokens(&["Hel", "lo"])).await;
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        f.service.run_turn("alice", "hello", None, &tx).await;

        let history = f.turns.recent(f.alice_id, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hel");
    }

    #[tokio::test]
    async fn test_complete_turn_and_chat_id() {
        let f = fixture(ScriptedBackend::tokens(&["Hel", "lo"])).await;

        let reply = f
            .service
            .clone()
            .complete_turn("alice".into(), "hi".into(), Some("chat-7".into()))
            .await
            .unwrap();
        assert_eq!(reply, "Hello");

        let history = f.turns.recent(f.alice_id, 10).await.unwrap();
        assert!(history.iter().all(|t| t.chat_id.as_deref() == Some("chat-7")));
    }
}
