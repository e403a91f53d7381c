/// PDF extraction and semantic document indexing
///
/// Uploaded PDFs are split into pages; each page with text becomes one vector
/// in the owner's namespace. The same service answers similarity searches for
/// the search endpoint and for chat context assembly.

mod pdf;

pub use pdf::{extract_pdf, ExtractedDocument, ExtractedPage};

use crate::{
    config::DocumentConfig,
    error::{ParlorError, ParlorResult},
    llm::Embedder,
    vector::{ChunkMetadata, Snippet, VectorIndex, VectorRecord},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Result of indexing one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub doc_id: String,
    pub filename: String,
    pub page_count: usize,
    pub pages_indexed: usize,
}

/// Check upload metadata before any parsing happens
pub fn validate_upload(filename: &str, size: usize, max_bytes: usize) -> ParlorResult<()> {
    if filename.trim().is_empty() {
        return Err(ParlorError::InvalidInput("No selected file".to_string()));
    }

    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(ParlorError::InvalidInput(
            "Only PDF files are allowed".to_string(),
        ));
    }

    if size > max_bytes {
        return Err(ParlorError::InvalidInput(format!(
            "File too large. Max {} KB allowed.",
            max_bytes / 1024
        )));
    }

    Ok(())
}

/// Content-addressed document id
pub fn document_id(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Embeds document pages and searches them
pub struct DocumentService {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: DocumentConfig,
}

impl DocumentService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: DocumentConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Embed every non-empty page and store it in `namespace`
    pub async fn index_document(
        &self,
        namespace: &str,
        doc_id: &str,
        document: &ExtractedDocument,
    ) -> ParlorResult<IndexedDocument> {
        let mut records = Vec::new();
        for page in document.pages.iter().filter(|p| !p.content.is_empty()) {
            let values = self.embedder.embed(&page.content).await?;
            records.push(VectorRecord {
                id: format!("{}-p{}", doc_id, page.page),
                values,
                metadata: ChunkMetadata {
                    doc_id: doc_id.to_string(),
                    filename: document.filename.clone(),
                    page: page.page,
                    text: page.content.clone(),
                },
            });
        }

        let pages_indexed = self.index.upsert(namespace, records).await?;

        tracing::info!(
            namespace,
            doc_id,
            filename = %document.filename,
            pages_indexed,
            "document indexed"
        );

        Ok(IndexedDocument {
            doc_id: doc_id.to_string(),
            filename: document.filename.clone(),
            page_count: document.page_count,
            pages_indexed,
        })
    }

    /// Up to `top_k` snippets from `namespace` most similar to `query`
    pub async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
    ) -> ParlorResult<Vec<Snippet>> {
        if query.trim().is_empty() {
            return Err(ParlorError::InvalidInput("Query cannot be empty".to_string()));
        }

        let vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&vector, namespace, top_k).await?;

        Ok(hits.into_iter().filter_map(Snippet::from_match).collect())
    }
}
