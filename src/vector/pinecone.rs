/// Pinecone data-plane REST client
use crate::{
    error::{ParlorError, ParlorResult},
    vector::{VectorIndex, VectorMatch, VectorRecord},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Records per upsert request
const UPSERT_BATCH_SIZE: usize = 100;

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}

pub struct PineconeIndex {
    http: reqwest::Client,
    index_host: String,
    api_key: String,
}

impl PineconeIndex {
    pub fn new(index_host: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            index_host: index_host.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> ParlorResult<R> {
        let response = self
            .http
            .post(format!("{}{}", self.index_host, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ParlorError::Search(format!("Vector index unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ParlorError::Search(format!(
                "Vector index returned {}: {}",
                status,
                text.trim()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ParlorError::Search(format!("Malformed vector index response: {}", e)))
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> ParlorResult<usize> {
        let mut total = 0;
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let response: UpsertResponse = self
                .post(
                    "/vectors/upsert",
                    &UpsertRequest {
                        vectors: batch,
                        namespace,
                    },
                )
                .await?;
            total += response.upserted_count;
        }

        tracing::debug!(namespace, upserted = total, "vectors upserted");
        Ok(total)
    }

    async fn search(
        &self,
        vector: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> ParlorResult<Vec<VectorMatch>> {
        let response: QueryResponse = self
            .post(
                "/query",
                &QueryRequest {
                    vector,
                    top_k,
                    include_metadata: true,
                    namespace,
                },
            )
            .await?;

        Ok(response.matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::ChunkMetadata;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_query_parses_matches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("Api-Key", "key-1"))
            .and(body_partial_json(serde_json::json!({
                "topK": 3,
                "includeMetadata": true,
                "namespace": "alice"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "matches": [{
                    "id": "doc-p1",
                    "score": 0.92,
                    "metadata": {"doc_id": "doc", "filename": "a.pdf", "page": 1, "text": "hello"}
                }],
                "namespace": "alice"
            })))
            .mount(&server)
            .await;

        let index = PineconeIndex::new(&server.uri(), "key-1");
        let hits = index.search(&[0.1, 0.2], "alice", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.as_ref().unwrap().text, "hello");
    }

    #[tokio::test]
    async fn test_upsert_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"upsertedCount": 1})),
            )
            .mount(&server)
            .await;

        let index = PineconeIndex::new(&server.uri(), "key-1");
        let written = index
            .upsert(
                "alice",
                vec![VectorRecord {
                    id: "doc-p1".into(),
                    values: vec![0.1, 0.2],
                    metadata: ChunkMetadata {
                        doc_id: "doc".into(),
                        filename: "a.pdf".into(),
                        page: 1,
                        text: "hello".into(),
                    },
                }],
            )
            .await
            .unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_query_failure_is_search_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let index = PineconeIndex::new(&server.uri(), "bad");
        let err = index.search(&[0.1], "alice", 3).await.unwrap_err();
        assert!(matches!(err, ParlorError::Search(_)));
    }
}
