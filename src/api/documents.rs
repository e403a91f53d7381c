/// PDF upload and document search endpoints
use crate::{
    api::{read_form, take_part},
    auth::AuthContext,
    context::AppContext,
    documents::{self, ExtractedDocument, ExtractedPage, IndexedDocument},
    error::{ParlorError, ParlorResult},
    metrics,
    vector::Snippet,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Hard ceiling on upload bodies; the configured PDF limit is checked per file
const UPLOAD_BODY_LIMIT: usize = 32 * 1024 * 1024;
const MAX_TOP_K: usize = 20;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/upload-pdf",
            post(upload_pdf).route_layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/documents",
            post(index_document).route_layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/documents/search", post(search_documents))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    success: bool,
    filename: String,
    page_count: usize,
    pages: Vec<ExtractedPage>,
}

#[derive(Debug, Serialize)]
struct IndexResponse {
    success: bool,
    #[serde(flatten)]
    document: IndexedDocument,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    results: Vec<Snippet>,
}

/// Validate and extract the `file` part of an upload form
async fn extract_upload(
    ctx: &AppContext,
    multipart: Multipart,
) -> ParlorResult<(ExtractedDocument, axum::body::Bytes)> {
    let mut parts = read_form(multipart).await?;
    let file = take_part(&mut parts, "file")
        .ok_or_else(|| ParlorError::InvalidInput("No file part in the request".to_string()))?;

    let filename = file.filename.unwrap_or_default();
    let config = ctx.document_service.config();
    documents::validate_upload(&filename, file.bytes.len(), config.max_pdf_bytes)?;

    let extracted = documents::extract_pdf(&filename, &file.bytes, config.preview_chars)?;
    Ok((extracted, file.bytes))
}

/// POST /upload-pdf
async fn upload_pdf(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> ParlorResult<Json<UploadResponse>> {
    let (extracted, _) = extract_upload(&ctx, multipart).await?;

    Ok(Json(UploadResponse {
        success: true,
        filename: extracted.filename,
        page_count: extracted.page_count,
        pages: extracted.pages,
    }))
}

/// POST /documents
async fn index_document(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    multipart: Multipart,
) -> ParlorResult<Json<IndexResponse>> {
    let (extracted, bytes) = extract_upload(&ctx, multipart).await?;
    let doc_id = documents::document_id(&bytes);

    let result = ctx
        .document_service
        .index_document(&auth.username, &doc_id, &extracted)
        .await;
    metrics::record_document_indexed(result.is_ok());

    Ok(Json(IndexResponse {
        success: true,
        document: result?,
    }))
}

/// POST /documents/search
async fn search_documents(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<SearchRequest>,
) -> ParlorResult<Json<SearchResponse>> {
    let top_k = req
        .top_k
        .unwrap_or(ctx.config.retrieval.snippet_top_k)
        .clamp(1, MAX_TOP_K);

    let results = ctx
        .document_service
        .search(&auth.username, &req.query, top_k)
        .await?;

    Ok(Json(SearchResponse { results }))
}
