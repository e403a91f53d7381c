/// HTTP client for the stylization inference service
///
/// Request: `POST {base}/stylize` with `{"style": "candy", "image": "<base64 PNG>"}`.
/// Response: `{"image": "<base64 image>"}`.
use crate::{
    error::{ParlorError, ParlorResult},
    style::{Style, StyleTransfer},
};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct StylizeRequest<'a> {
    style: &'a str,
    image: String,
}

#[derive(Debug, Deserialize)]
struct StylizeResponse {
    image: String,
}

pub struct HttpStyleTransfer {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStyleTransfer {
    pub fn new(base_url: &str, timeout: Duration) -> ParlorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParlorError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StyleTransfer for HttpStyleTransfer {
    async fn stylize(&self, style: Style, png: Vec<u8>) -> ParlorResult<Vec<u8>> {
        let engine = base64::engine::general_purpose::STANDARD;

        let response = self
            .http
            .post(format!("{}/stylize", self.base_url))
            .json(&StylizeRequest {
                style: style.as_str(),
                image: engine.encode(&png),
            })
            .send()
            .await
            .map_err(|e| ParlorError::Upstream(format!("Style service unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ParlorError::Upstream(format!(
                "Style service returned {}: {}",
                status,
                text.trim()
            )));
        }

        let body: StylizeResponse = response
            .json()
            .await
            .map_err(|e| ParlorError::Upstream(format!("Malformed style service response: {}", e)))?;

        engine
            .decode(body.image.as_bytes())
            .map_err(|e| ParlorError::Upstream(format!("Invalid base64 image: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_stylize_round_trip() {
        let server = MockServer::start().await;
        let engine = base64::engine::general_purpose::STANDARD;
        Mock::given(method("POST"))
            .and(path("/stylize"))
            .and(body_partial_json(serde_json::json!({
                "style": "mosaic",
                "image": engine.encode(b"input")
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "image": engine.encode(b"output")
            })))
            .mount(&server)
            .await;

        let client = HttpStyleTransfer::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let out = client.stylize(Style::Mosaic, b"input".to_vec()).await.unwrap();
        assert_eq!(out, b"output");
    }

    #[tokio::test]
    async fn test_service_error_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model missing"))
            .mount(&server)
            .await;

        let client = HttpStyleTransfer::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.stylize(Style::Candy, vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, ParlorError::Upstream(_)));
    }
}
