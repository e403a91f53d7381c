/// Ollama HTTP client
///
/// Chat replies arrive as newline-delimited JSON objects of the form
/// `{"message": {"content": "..."}, "done": false}`; the last object carries
/// `"done": true`. Failures mid-stream arrive as `{"error": "..."}`.
use crate::{
    config::LlmConfig,
    error::{ParlorError, ParlorResult},
    llm::{ChatBackend, ChatMessage, Embedder, GenerationOptions, TokenStream},
};
use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: RequestOptions,
}

#[derive(Debug, Serialize)]
struct RequestOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Client for a local Ollama server
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    idle_timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> ParlorResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ParlorError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        })
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> ParlorResult<TokenStream> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            stream: true,
            options: RequestOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        tracing::debug!(model = %self.chat_model, messages = messages.len(), "opening chat stream");

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ParlorError::Upstream(format!("Model server unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParlorError::Upstream(format!(
                "Model server returned {}: {}",
                status,
                body.trim()
            )));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| e.to_string()));

        Ok(ndjson_fragments(bytes, self.idle_timeout))
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> ParlorResult<Vec<f32>> {
        let response = self
            .http
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbeddingRequest {
                model: &self.embedding_model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| ParlorError::Search(format!("Embedding server unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParlorError::Search(format!(
                "Embedding request failed with {}: {}",
                status,
                body.trim()
            )));
        }

        let data: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ParlorError::Search(format!("Malformed embedding response: {}", e)))?;

        if data.embedding.is_empty() {
            return Err(ParlorError::Search("Embedding model returned an empty vector".to_string()));
        }

        Ok(data.embedding)
    }
}

/// Outcome of one NDJSON line
#[derive(Debug, PartialEq)]
struct ParsedLine {
    content: String,
    done: bool,
}

fn parse_line(line: &[u8]) -> ParlorResult<Option<ParsedLine>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let chunk: ChatChunk = serde_json::from_str(text)
        .map_err(|e| ParlorError::Upstream(format!("Malformed frame from model server: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(ParlorError::Upstream(error));
    }

    Ok(Some(ParsedLine {
        content: chunk.message.map(|m| m.content).unwrap_or_default(),
        done: chunk.done,
    }))
}

struct NdjsonState {
    inner: Pin<Box<dyn Stream<Item = Result<Vec<u8>, String>> + Send>>,
    buffer: Vec<u8>,
    pending: VecDeque<ParlorResult<String>>,
    finished: bool,
    idle_timeout: Duration,
}

impl NdjsonState {
    fn push_line(&mut self, line: &[u8]) {
        match parse_line(line) {
            Ok(Some(parsed)) => {
                if !parsed.content.is_empty() {
                    self.pending.push_back(Ok(parsed.content));
                }
                if parsed.done {
                    self.finished = true;
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }

    fn drain_lines(&mut self) {
        while !self.finished {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&line);
        }
    }
}

/// Turn a newline-delimited JSON byte stream into reply fragments.
///
/// The stream ends after the `done` frame, after the first error, or when no
/// bytes arrive within `idle_timeout`. Input that ends without a `done` frame
/// yields an `Upstream` error after the fragments received so far.
fn ndjson_fragments<S>(bytes: S, idle_timeout: Duration) -> TokenStream
where
    S: Stream<Item = Result<Vec<u8>, String>> + Send + 'static,
{
    let state = NdjsonState {
        inner: Box::pin(bytes),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
        idle_timeout,
    };

    let fragments = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }

            if state.finished {
                return None;
            }

            match tokio::time::timeout(state.idle_timeout, state.inner.next()).await {
                Err(_) => {
                    state.finished = true;
                    return Some((
                        Err(ParlorError::Upstream(
                            "Timed out waiting for model output".to_string(),
                        )),
                        state,
                    ));
                }
                Ok(None) => {
                    // Trailing line without a newline
                    let rest = std::mem::take(&mut state.buffer);
                    state.push_line(&rest);
                    if !state.finished {
                        state.pending.push_back(Err(ParlorError::Upstream(
                            "Model stream ended before completion".to_string(),
                        )));
                    }
                    state.finished = true;
                }
                Ok(Some(Err(e))) => {
                    state.finished = true;
                    return Some((
                        Err(ParlorError::Upstream(format!("Model stream interrupted: {}", e))),
                        state,
                    ));
                }
                Ok(Some(Ok(chunk))) => {
                    state.buffer.extend_from_slice(&chunk);
                    state.drain_lines();
                }
            }
        }
    });

    Box::pin(fragments)
}
