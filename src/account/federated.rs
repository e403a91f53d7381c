/// Federated identity verification
use crate::error::{ParlorError, ParlorResult};
use async_trait::async_trait;
use serde::Deserialize;

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Identity asserted by an external provider after token verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl FederatedIdentity {
    /// Username derived from the email local part, or a generic fallback
    pub fn preferred_username(&self) -> String {
        let local = self
            .email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .unwrap_or_default();

        let cleaned: String = local
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
            .take(64)
            .collect();

        if cleaned.len() >= 3 {
            cleaned
        } else {
            "user".to_string()
        }
    }
}

/// Verifies provider-issued id tokens
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> ParlorResult<FederatedIdentity>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    iss: String,
    sub: String,
    aud: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// Google id token verifier backed by the token-info endpoint
pub struct GoogleTokenVerifier {
    http: reqwest::Client,
    tokeninfo_url: String,
    client_id: Option<String>,
}

impl GoogleTokenVerifier {
    pub fn new(tokeninfo_url: String, client_id: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokeninfo_url,
            client_id,
        }
    }
}

#[async_trait]
impl IdentityVerifier for GoogleTokenVerifier {
    async fn verify(&self, id_token: &str) -> ParlorResult<FederatedIdentity> {
        let client_id = self.client_id.as_deref().ok_or_else(|| {
            ParlorError::Authentication("Federated login is not configured".to_string())
        })?;

        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| ParlorError::Upstream(format!("Identity provider unreachable: {}", e)))?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "id token rejected by provider");
            return Err(ParlorError::Authentication("Invalid id token".to_string()));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| ParlorError::Upstream(format!("Malformed token info: {}", e)))?;

        if info.aud != client_id {
            return Err(ParlorError::Authentication(
                "Id token was issued for another client".to_string(),
            ));
        }

        if !GOOGLE_ISSUERS.contains(&info.iss.as_str()) {
            return Err(ParlorError::Authentication("Unexpected token issuer".to_string()));
        }

        Ok(FederatedIdentity {
            subject: info.sub,
            email: info.email,
            name: info.name,
            picture: info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_info(aud: &str) -> serde_json::Value {
        serde_json::json!({
            "iss": "https://accounts.google.com",
            "sub": "1234567890",
            "aud": aud,
            "email": "grace@example.com",
            "email_verified": "true",
            "name": "Grace Hopper",
            "picture": "https://example.com/grace.png"
        })
    }

    #[test]
    fn test_preferred_username() {
        let identity = FederatedIdentity {
            subject: "s".into(),
            email: Some("grace.hopper+x@example.com".into()),
            name: None,
            picture: None,
        };
        assert_eq!(identity.preferred_username(), "grace.hopperx");

        let no_email = FederatedIdentity { email: None, ..identity };
        assert_eq!(no_email.preferred_username(), "user");
    }

    #[tokio::test]
    async fn test_verify_accepts_matching_audience() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .and(query_param("id_token", "good-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_info("client-1")))
            .mount(&server)
            .await;

        let verifier = GoogleTokenVerifier::new(
            format!("{}/tokeninfo", server.uri()),
            Some("client-1".to_string()),
        );
        let identity = verifier.verify("good-token").await.unwrap();
        assert_eq!(identity.subject, "1234567890");
        assert_eq!(identity.name.as_deref(), Some("Grace Hopper"));
    }

    #[tokio::test]
    async fn test_verify_rejects_foreign_audience() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_info("someone-else")))
            .mount(&server)
            .await;

        let verifier = GoogleTokenVerifier::new(
            format!("{}/tokeninfo", server.uri()),
            Some("client-1".to_string()),
        );
        let err = verifier.verify("token").await.unwrap_err();
        assert!(matches!(err, ParlorError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_verify_rejects_invalid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let verifier = GoogleTokenVerifier::new(
            format!("{}/tokeninfo", server.uri()),
            Some("client-1".to_string()),
        );
        assert!(verifier.verify("bad").await.is_err());
    }
}
