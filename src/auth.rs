/// Authentication extractors
use crate::{
    account::ValidatedToken,
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::ParlorError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated caller, taken from a bearer access token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: i64,
    pub username: String,
}

impl From<ValidatedToken> for AuthContext {
    fn from(token: ValidatedToken) -> Self {
        Self {
            account_id: token.account_id,
            username: token.username,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = ParlorError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            ParlorError::Authentication("Missing authorization header".to_string())
        })?;

        let validated = state.account_manager.validate_access_token(&token)?;
        Ok(validated.into())
    }
}
