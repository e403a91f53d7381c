/// Context assembly for one conversation turn
use crate::{
    account::AccountManager,
    chat::TurnStore,
    config::RetrievalConfig,
    db::models::Account,
    documents::DocumentService,
    error::{ParlorError, ParlorResult},
    llm::{ChatBackend, ChatMessage, GenerationOptions},
    vector::Snippet,
};
use std::sync::Arc;

const SUMMARY_INSTRUCTION: &str =
    "Summarize the following document excerpts concisely, keeping facts that could answer a question.";

/// Message list ready to send to the generation backend
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub account: Account,
    /// The trimmed user message, also the last entry of `messages`
    pub message: String,
    pub messages: Vec<ChatMessage>,
    pub history_turns: usize,
    pub snippets: usize,
}

/// Builds bounded contexts from stored turns and document snippets
pub struct ContextAssembler {
    accounts: Arc<AccountManager>,
    turns: Arc<TurnStore>,
    documents: Arc<DocumentService>,
    backend: Arc<dyn ChatBackend>,
    config: RetrievalConfig,
    options: GenerationOptions,
}

impl ContextAssembler {
    pub fn new(
        accounts: Arc<AccountManager>,
        turns: Arc<TurnStore>,
        documents: Arc<DocumentService>,
        backend: Arc<dyn ChatBackend>,
        config: RetrievalConfig,
        options: GenerationOptions,
    ) -> Self {
        Self {
            accounts,
            turns,
            documents,
            backend,
            config,
            options,
        }
    }

    /// Validate the request and build the message list.
    ///
    /// Fails with `InvalidInput` or `NotFound` before any collaborator is called.
    pub async fn assemble(&self, username: &str, message: &str) -> ParlorResult<AssembledContext> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ParlorError::InvalidInput("Username is required".to_string()));
        }

        let message = message.trim();
        if message.is_empty() {
            return Err(ParlorError::InvalidInput("Message cannot be empty".to_string()));
        }

        let account = self.accounts.get_account_by_username(username).await?;
        let history = self.turns.recent(account.id, self.config.history_limit).await?;
        let history_turns = history.len();

        let mut messages = Vec::with_capacity(history_turns + 3);
        messages.push(ChatMessage::system(&self.config.system_prompt));
        messages.extend(history.into_iter().map(ChatMessage::from));

        let mut snippets = 0;
        if self.config.enabled {
            let found = self
                .documents
                .search(&account.username, message, self.config.snippet_top_k)
                .await?;
            snippets = found.len();
            if let Some(excerpts) = self.snippet_message(&found).await? {
                messages.push(ChatMessage::system(excerpts));
            }
        }

        messages.push(ChatMessage::user(message));

        tracing::debug!(
            username = %account.username,
            history_turns,
            snippets,
            "assembled context"
        );

        Ok(AssembledContext {
            account,
            message: message.to_string(),
            messages,
            history_turns,
            snippets,
        })
    }

    /// Snippets as one system message, summarized when they run long
    async fn snippet_message(&self, snippets: &[Snippet]) -> ParlorResult<Option<String>> {
        if snippets.is_empty() {
            return Ok(None);
        }

        let words: usize = snippets
            .iter()
            .map(|s| s.text.split_whitespace().count())
            .sum();
        let excerpts = format_snippets(snippets);

        if words <= self.config.summarize_word_threshold {
            return Ok(Some(format!("Relevant document excerpts:\n{}", excerpts)));
        }

        tracing::debug!(words, "summarizing document excerpts");
        let summary = self
            .backend
            .complete(
                &[ChatMessage::system(SUMMARY_INSTRUCTION), ChatMessage::user(excerpts)],
                &self.options,
            )
            .await?;

        Ok(Some(format!(
            "Summary of relevant documents:\n{}",
            summary.trim()
        )))
    }
}

fn format_snippets(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .map(|s| format!("[{} p.{}] {}", s.filename, s.page, s.text))
        .collect::<Vec<_>>()
        .join("\n")
}
