/// End-to-end tests driving the router with in-process collaborators
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use futures::stream;
use parlor::{
    account::{FederatedIdentity, IdentityVerifier},
    config::ServerConfig,
    context::{AppContext, Collaborators},
    db,
    error::{ParlorError, ParlorResult},
    llm::{ChatBackend, ChatMessage, Embedder, GenerationOptions, TokenStream},
    server::build_router,
    vector::MemoryIndex,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Always replies "Hello" in two fragments
struct GreetingBackend;

#[async_trait]
impl ChatBackend for GreetingBackend {
    async fn stream_chat(
        &self,
        _messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> ParlorResult<TokenStream> {
        Ok(Box::pin(stream::iter(vec![
            Ok("Hel".to_string()),
            Ok("lo".to_string()),
        ])))
    }
}

struct LengthEmbedder;

#[async_trait]
impl Embedder for LengthEmbedder {
    async fn embed(&self, text: &str) -> ParlorResult<Vec<f32>> {
        Ok(vec![text.len() as f32, 1.0])
    }
}

/// Accepts exactly one token
struct FixedVerifier;

#[async_trait]
impl IdentityVerifier for FixedVerifier {
    async fn verify(&self, id_token: &str) -> ParlorResult<FederatedIdentity> {
        if id_token != "good-token" {
            return Err(ParlorError::Authentication("Invalid id token".to_string()));
        }
        Ok(FederatedIdentity {
            subject: "google-123".to_string(),
            email: Some("carol@example.com".to_string()),
            name: Some("Carol".to_string()),
            picture: None,
        })
    }
}

async fn app() -> Router {
    let mut config = ServerConfig::default();
    config.authentication.jwt_secret = "integration-test-secret-that-is-long-enough".to_string();
    config.rate_limit.enabled = false;

    let pool = db::create_memory_pool().await.unwrap();
    let collaborators = Collaborators {
        chat_backend: Arc::new(GreetingBackend),
        embedder: Arc::new(LengthEmbedder),
        vector_index: Arc::new(MemoryIndex::new()),
        style_transfer: None,
        identity_verifier: Arc::new(FixedVerifier),
    };

    build_router(AppContext::with_collaborators(config, pool, collaborators))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn post_json(app: &Router, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

async fn get(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

async fn register_and_login(app: &Router, username: &str) -> String {
    let (status, _) = post_json(
        app,
        "/register",
        json!({"username": username, "password": "hunter22"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post_json(
        app,
        "/login",
        json!({"username": username, "password": "hunter22"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    json_body(&body)["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_register_and_login() {
    let app = app().await;
    let token = register_and_login(&app, "alice").await;
    assert!(!token.is_empty());

    let (status, body) = post_json(
        &app,
        "/register",
        json!({"username": "alice", "password": "other"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json_body(&body)["error"], "Conflict");

    let (status, _) = post_json(
        &app,
        "/login",
        json!({"username": "alice", "password": "wrong"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = get(&app, "/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["username"], "alice");

    let (status, _) = get(&app, "/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_federated_login_creates_account_once() {
    let app = app().await;

    let (status, body) =
        post_json(&app, "/auth/google", json!({"id_token": "good-token"}), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["username"], "carol");

    let (_, body) = post_json(&app, "/auth/google", json!({"id_token": "good-token"}), None).await;
    assert_eq!(json_body(&body)["username"], "carol");

    let (status, _) = post_json(&app, "/auth/google", json!({"id_token": "forged"}), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_chat_streams_tokens_then_done() {
    let app = app().await;
    let token = register_and_login(&app, "alice").await;

    let (status, body) = post_json(
        &app,
        "/chat",
        json!({"username": "alice", "message": "Hi there!"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    let frames: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    assert_eq!(
        frames,
        vec![r#"{"token":"Hel"}"#, r#"{"token":"lo"}"#, "[DONE]"]
    );

    let (status, body) = get(&app, "/history", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let turns = json_body(&body)["turns"].as_array().unwrap().clone();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[0]["content"], "Hi there!");
    assert_eq!(turns[1]["role"], "assistant");
    assert_eq!(turns[1]["content"], "Hello");
}

#[tokio::test]
async fn test_chat_unknown_user_reports_error_frame() {
    let app = app().await;

    let (status, body) = post_json(
        &app,
        "/chat",
        json!({"username": "ghost", "message": "hello"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    let frames: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].starts_with("Error: "));
}

#[tokio::test]
async fn test_history_backfill() {
    let app = app().await;
    let token = register_and_login(&app, "alice").await;
    post_json(&app, "/chat", json!({"username": "alice", "message": "one"}), None).await;

    let (status, body) = post_json(
        &app,
        "/history/conversation",
        json!({"chat_id": "chat-1"}),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["updated"], 2);

    let (_, body) = post_json(
        &app,
        "/history/conversation",
        json!({"chat_id": "chat-2"}),
        Some(&token),
    )
    .await;
    assert_eq!(json_body(&body)["updated"], 0);
}

#[tokio::test]
async fn test_graphql_operations() {
    let app = app().await;

    let (status, body) = post_json(
        &app,
        "/graphql",
        json!({"operationName": "register", "variables": {"username": "bob", "password": "pw123"}}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["data"]["register"]["success"], true);

    let (_, body) = post_json(
        &app,
        "/graphql",
        json!({"operationName": "login", "variables": {"username": "bob", "password": "nope"}}),
        None,
    )
    .await;
    assert_eq!(json_body(&body)["data"]["login"]["success"], false);

    let (_, body) = post_json(
        &app,
        "/graphql",
        json!({"operationName": "chat", "variables": {"username": "bob", "message": "hi"}}),
        None,
    )
    .await;
    assert_eq!(json_body(&body)["data"]["chat"]["reply"], "Hello");

    let (_, body) = post_json(
        &app,
        "/graphql",
        json!({"operationName": "getUser", "variables": {"username": "nobody"}}),
        None,
    )
    .await;
    assert!(json_body(&body)["data"]["getUser"].is_null());

    let (status, body) = post_json(
        &app,
        "/graphql",
        json!({"operationName": "dropTables", "variables": {}}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_body(&body)["errors"][0]["message"].is_string());

    let (status, body) = get(&app, "/graphql", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("graphiql"));
}

#[tokio::test]
async fn test_graphql_history_requires_own_token() {
    let app = app().await;
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;
    post_json(
        &app,
        "/chat",
        json!({"username": "alice", "message": "my secret diagnosis"}),
        None,
    )
    .await;

    let query = json!({"operationName": "history", "variables": {"username": "alice"}});

    let (status, body) = post_json(&app, "/graphql", query.clone(), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json_body(&body);
    assert!(body.get("data").is_none());
    assert!(!body.to_string().contains("secret"));

    let (status, body) = post_json(&app, "/graphql", query.clone(), Some(&bob)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!String::from_utf8(body).unwrap().contains("secret"));

    let (status, body) = post_json(&app, "/graphql", query, Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    let entries = json_body(&body)["data"]["history"].as_array().unwrap().clone();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["content"], "my secret diagnosis");
}

#[tokio::test]
async fn test_upload_rejects_non_pdf() {
    let app = app().await;
    let boundary = "parlor-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\nhello\r\n--{b}--\r\n",
        b = boundary
    );

    let request = Request::builder()
        .method("POST")
        .uri("/upload-pdf")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["message"], "Invalid input: Only PDF files are allowed");
}

#[tokio::test]
async fn test_style_transfer_unconfigured() {
    let app = app().await;

    let (status, body) = get(&app, "/styles", None).await;
    assert_eq!(status, StatusCode::OK);
    let styles = json_body(&body);
    assert_eq!(styles["styles"], json!(["mosaic", "candy", "udnie"]));
    assert_eq!(styles["available"], false);
}

#[tokio::test]
async fn test_health_and_fallback() {
    let app = app().await;

    let (status, body) = get(&app, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["status"], "ok");

    let (status, _) = get(&app, "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/no/such/route", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"], "NotFound");

    let (status, body) = get(&app, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("parlor_http_requests_total"));
}
