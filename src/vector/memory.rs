/// In-process vector index used when no hosted index is configured
use crate::{
    error::ParlorResult,
    vector::{cosine_similarity, VectorIndex, VectorMatch, VectorRecord},
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryIndex {
    namespaces: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> ParlorResult<usize> {
        let mut namespaces = self.namespaces.write().await;
        let entries = namespaces.entry(namespace.to_string()).or_default();
        let count = records.len();
        for record in records {
            entries.insert(record.id.clone(), record);
        }
        Ok(count)
    }

    async fn search(
        &self,
        vector: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> ParlorResult<Vec<VectorMatch>> {
        let namespaces = self.namespaces.read().await;
        let Some(entries) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<VectorMatch> = entries
            .values()
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: Some(record.metadata.clone()),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}
