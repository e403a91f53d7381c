/// Style transfer endpoints
use crate::{
    api::{read_form, take_part},
    context::AppContext,
    error::{ParlorError, ParlorResult},
    style::Style,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};

const IMAGE_BODY_LIMIT: usize = 32 * 1024 * 1024;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/style-transfer",
            post(style_transfer).route_layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT)),
        )
        .route("/styles", get(list_styles))
}

/// GET /styles
async fn list_styles(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "styles": Style::ALL.iter().map(Style::as_str).collect::<Vec<_>>(),
        "available": ctx.style_service.is_available(),
    }))
}

/// POST /style-transfer
///
/// Multipart form with an `image` file and a `style` name; replies with PNG.
async fn style_transfer(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> ParlorResult<impl IntoResponse> {
    let mut parts = read_form(multipart).await?;

    let style = take_part(&mut parts, "style")
        .map(|p| String::from_utf8_lossy(&p.bytes).trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParlorError::InvalidInput("No style given".to_string()))?;
    let image = take_part(&mut parts, "image")
        .ok_or_else(|| ParlorError::InvalidInput("No image uploaded".to_string()))?;

    let png = ctx.style_service.transfer(&style, &image.bytes).await?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}
