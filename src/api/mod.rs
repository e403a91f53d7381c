/// API routes and handlers
pub mod account;
pub mod chat;
pub mod documents;
pub mod graphql;
pub mod health;
pub mod history;
pub mod middleware;
pub mod style;

use crate::{
    context::AppContext,
    error::{ParlorError, ParlorResult},
};
use axum::Router;
use validator::Validate;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(account::routes())
        .merge(chat::routes())
        .merge(history::routes())
        .merge(documents::routes())
        .merge(style::routes())
        .merge(graphql::routes())
}

/// Run derive-based validation, reporting the first message as `InvalidInput`
pub(crate) fn validated<T: Validate>(request: T) -> ParlorResult<T> {
    request.validate().map_err(|errors| {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| errors.to_string());
        ParlorError::InvalidInput(message)
    })?;
    Ok(request)
}

/// One part of a multipart form
#[derive(Debug)]
pub(crate) struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub bytes: axum::body::Bytes,
}

/// Read every part of a multipart form into memory
pub(crate) async fn read_form(mut multipart: axum::extract::Multipart) -> ParlorResult<Vec<FormPart>> {
    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ParlorError::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ParlorError::InvalidInput(format!("Failed to read upload `{}`: {}", name, e)))?;
        parts.push(FormPart {
            name,
            filename,
            bytes,
        });
    }
    Ok(parts)
}

/// Take the named part out of a form
pub(crate) fn take_part(parts: &mut Vec<FormPart>, name: &str) -> Option<FormPart> {
    let index = parts.iter().position(|p| p.name == name)?;
    Some(parts.swap_remove(index))
}
