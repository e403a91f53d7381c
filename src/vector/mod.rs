/// Vector index collaborators for semantic document search
///
/// Each account owns one namespace; uploaded document pages are stored as
/// vectors with their text in the metadata so a search can be turned straight
/// into context snippets.

mod memory;
mod pinecone;

pub use memory::MemoryIndex;
pub use pinecone::PineconeIndex;

use crate::error::ParlorResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata stored alongside every page vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub filename: String,
    pub page: u32,
    pub text: String,
}

/// One vector to store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// One ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Option<ChunkMetadata>,
}

/// Document text retrieved for one turn's context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub doc_id: String,
    pub filename: String,
    pub page: u32,
    pub text: String,
    pub score: f32,
}

impl Snippet {
    /// Build a snippet from a match, skipping hits without stored text
    pub fn from_match(hit: VectorMatch) -> Option<Self> {
        let metadata = hit.metadata?;
        Some(Self {
            doc_id: metadata.doc_id,
            filename: metadata.filename,
            page: metadata.page,
            text: metadata.text,
            score: hit.score,
        })
    }
}

/// Vector-search collaborator
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records in a namespace, returning how many were written
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> ParlorResult<usize>;

    /// Rank stored vectors by similarity to `vector`
    async fn search(
        &self,
        vector: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> ParlorResult<Vec<VectorMatch>>;
}

/// Cosine similarity; zero for mismatched or degenerate vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (dot / denom) as f32
    }
}
