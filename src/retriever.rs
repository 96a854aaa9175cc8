// SPDX-License-Identifier: MIT OR Apache-2.0

//! Question → passages.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::{IndexEntry, ScoredEntry, SharedEmbedder, VectorIndex};
use crate::errors::Result;

/// Number of retrieved passages echoed to the debug log.
const LOGGED_SOURCES: usize = 5;

/// Embeds questions and queries the vector index.
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<SharedEmbedder>,
    k: usize,
    fetch_k: usize,
    lambda: f32,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<SharedEmbedder>, config: &RetrievalConfig) -> Self {
        Self {
            index,
            embedder,
            k: config.k(),
            fetch_k: config.fetch_k(),
            lambda: config.lambda(),
        }
    }

    /// Diversified context passages for `question`, at most `k` of them.
    pub fn retrieve(&self, question: &str) -> Result<Vec<IndexEntry>> {
        let query = self.embedder.embed_query(question)?;
        let entries = self
            .index
            .diversified_query(&query, self.k, self.fetch_k, self.lambda)?;

        tracing::debug!("Retrieved {} passages", entries.len());
        for (i, entry) in entries.iter().take(LOGGED_SOURCES).enumerate() {
            let preview: String = entry.text.chars().take(200).collect();
            tracing::debug!(
                "[{}] src={} page={} | {}",
                i,
                entry.source_id,
                entry.page,
                preview.replace('\n', " ")
            );
        }

        Ok(entries)
    }

    /// Plain nearest neighbours with their scores, most similar first.
    pub fn search_with_scores(&self, question: &str, k: usize) -> Result<Vec<ScoredEntry>> {
        let query = self.embedder.embed_query(question)?;
        self.index.similarity_query(&query, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::{assign_chunk_ids, Chunk, HashProvider};
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn setup(texts: &[&str]) -> (TempDir, Arc<VectorIndex>, Arc<SharedEmbedder>) {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(VectorIndex::open(dir.path().join("index.sqlite")).unwrap());
        let embedder = Arc::new(SharedEmbedder::from_provider(Box::new(HashProvider::new(128))));
        let chunks = assign_chunk_ids(texts.iter().map(|t| Chunk::new("faq.txt", 0, *t)).collect());
        index.upsert_new(&chunks, &embedder).unwrap();
        (dir, index, embedder)
    }

    #[test]
    fn retrieve_caps_at_k_with_distinct_ids() {
        let texts: Vec<String> = (0..20)
            .map(|i| format!("enrollment deadline notice number {}", i))
            .collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let (_dir, index, embedder) = setup(&refs);

        let config = Config::default();
        let retriever = Retriever::new(index, embedder, &config.retrieval);
        let passages = retriever.retrieve("enrollment deadline").unwrap();

        assert_eq!(passages.len(), 12);
        let ids: HashSet<_> = passages.iter().map(|p| p.chunk_id.clone()).collect();
        assert_eq!(ids.len(), 12);
    }

    #[test]
    fn retrieve_on_empty_index_is_empty() {
        let (_dir, index, embedder) = setup(&[]);
        let retriever = Retriever::new(index, embedder, &RetrievalConfig::default());
        assert!(retriever.retrieve("anything").unwrap().is_empty());
    }

    #[test]
    fn search_with_scores_orders_by_similarity() {
        let (_dir, index, embedder) = setup(&[
            "parking permits are issued at the front desk",
            "the cafeteria serves lunch at noon",
            "lunch menu of the cafeteria",
        ]);
        let retriever = Retriever::new(index, embedder, &RetrievalConfig::default());

        let hits = retriever.search_with_scores("cafeteria lunch", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.entry.chunk_id != "faq.txt:0:0"));
    }
}
