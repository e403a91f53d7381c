/// Scripted generation backend for unit tests
use crate::{
    error::{ParlorError, ParlorResult},
    llm::{ChatBackend, ChatMessage, GenerationOptions, TokenStream},
};
use async_trait::async_trait;
use futures::stream;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Token(&'static str),
    Fail(&'static str),
}

/// Replays the same fragments on every call and records what it was sent
pub(crate) struct ScriptedBackend {
    steps: Vec<Step>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedBackend {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn tokens(tokens: &[&'static str]) -> Self {
        Self::new(tokens.iter().map(|t| Step::Token(t)).collect())
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> ParlorResult<TokenStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());

        let items: Vec<ParlorResult<String>> = self
            .steps
            .iter()
            .map(|step| match step {
                Step::Token(t) => Ok(t.to_string()),
                Step::Fail(reason) => Err(ParlorError::Upstream(reason.to_string())),
            })
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }
}
