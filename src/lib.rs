/// Parlor - personal chatbot backend
///
/// Streams replies from a locally hosted language model, keeps per-account
/// conversation history, extracts and indexes PDF text for semantic search,
/// and forwards images to a style-transfer service.

pub mod account;
pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod context;
pub mod db;
pub mod documents;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod style;
pub mod vector;
