/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{ParlorError, ParlorResult},
    metrics::{metrics_handler, track_http_metrics},
    rate_limit::rate_limit_middleware,
};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::{Html, Json},
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(home))
        .route("/metrics", get(metrics_handler))
        .merge(crate::api::routes())
        .fallback(not_found)
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(middleware::from_fn(track_http_metrics))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Landing page listing the endpoints
async fn home() -> Html<&'static str> {
    Html(
        r#"<h2>Parlor is running</h2>
<p>Available endpoints:</p>
<ul>
  <li><strong>POST</strong> /register - register a new user</li>
  <li><strong>POST</strong> /login - log in and receive an access token</li>
  <li><strong>POST</strong> /auth/google - log in with a Google id token</li>
  <li><strong>POST</strong> /chat - stream a reply from the chatbot</li>
  <li><strong>GET</strong> /history - your recent conversation turns</li>
  <li><strong>POST</strong> /upload-pdf - extract text from a PDF</li>
  <li><strong>POST</strong> /documents - index a PDF for search</li>
  <li><strong>POST</strong> /documents/search - search your documents</li>
  <li><strong>POST</strong> /style-transfer - restyle an image</li>
  <li><strong>GET|POST</strong> /graphql - GraphQL-style API</li>
</ul>"#,
    )
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server and run until Ctrl-C or SIGTERM
pub async fn serve(ctx: AppContext) -> ParlorResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Parlor listening on {}", addr);
    info!("   Model server: {}", ctx.config.llm.base_url);
    info!("   Chat model:   {}", ctx.config.llm.chat_model);

    let app = build_router(ctx.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ParlorError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ParlorError::Internal(format!("Server error: {}", e)))?;

    ctx.shutdown().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
