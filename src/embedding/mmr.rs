// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maximal Marginal Relevance (MMR) re-ranking.
//!
//! MMR = λ × similarity(query, doc) - (1-λ) × max(similarity(doc, selected_docs))
//!
//! λ = 1.0: pure relevance (plain nearest neighbours)
//! λ = 0.0: pure diversity

use super::storage::ScoredEntry;

/// Default MMR weight, biased toward diversity.
pub const DEFAULT_LAMBDA: f32 = 0.25;

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 for empty, mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Picks `k` candidates by MMR.
///
/// `candidates` carry their relevance to the query in `score`. The first
/// pick is always the most relevant candidate; each later pick maximises
/// `λ·score − (1−λ)·max_sim(candidate, picked)`. Returns
/// `min(k, candidates.len())` entries in pick order; ties go to the
/// candidate that came first.
pub fn mmr_rerank(candidates: Vec<ScoredEntry>, k: usize, lambda: f32) -> Vec<ScoredEntry> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let k = k.min(candidates.len());

    let mut remaining = candidates;
    // Highest similarity of each remaining candidate to anything picked so far.
    let mut max_sim = vec![f32::NEG_INFINITY; remaining.len()];
    let mut selected: Vec<ScoredEntry> = Vec::with_capacity(k);

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_mmr = f32::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let redundancy = if selected.is_empty() { 0.0 } else { max_sim[idx] };
            let mmr = lambda * candidate.score - (1.0 - lambda) * redundancy;
            if mmr > best_mmr {
                best_mmr = mmr;
                best_idx = idx;
            }
        }

        let best = remaining.remove(best_idx);
        max_sim.remove(best_idx);

        for (idx, candidate) in remaining.iter().enumerate() {
            let sim = cosine_similarity(&candidate.entry.embedding, &best.entry.embedding);
            if sim > max_sim[idx] {
                max_sim[idx] = sim;
            }
        }

        selected.push(best);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::storage::IndexEntry;

    fn candidate(id: &str, embedding: Vec<f32>, query: &[f32]) -> ScoredEntry {
        let score = cosine_similarity(query, &embedding);
        ScoredEntry {
            entry: IndexEntry {
                chunk_id: id.to_string(),
                source_id: "doc".into(),
                page: 0,
                text: id.to_string(),
                content_hash: String::new(),
                embedding,
                created_at: 0,
            },
            score,
            distance: 1.0 - score,
        }
    }

    fn ids(entries: &[ScoredEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.entry.chunk_id.as_str()).collect()
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn empty_or_zero_k() {
        assert!(mmr_rerank(Vec::new(), 3, 0.5).is_empty());
        let query = [1.0, 0.0];
        let c = vec![candidate("a", vec![1.0, 0.0], &query)];
        assert!(mmr_rerank(c, 0, 0.5).is_empty());
    }

    #[test]
    fn diversity_skips_near_duplicates() {
        let query = [1.0, 0.0, 0.0];
        let candidates = vec![
            candidate("a", vec![1.0, 0.0, 0.0], &query),
            candidate("a-copy", vec![0.99, 0.01, 0.0], &query),
            candidate("b", vec![0.6, 0.8, 0.0], &query),
        ];

        let picked = mmr_rerank(candidates, 2, 0.25);
        assert_eq!(ids(&picked), vec!["a", "b"]);
    }

    #[test]
    fn pure_relevance_keeps_similarity_order() {
        let query = [1.0, 0.0, 0.0];
        let candidates = vec![
            candidate("a", vec![1.0, 0.0, 0.0], &query),
            candidate("a-copy", vec![0.99, 0.01, 0.0], &query),
            candidate("b", vec![0.6, 0.8, 0.0], &query),
        ];

        let picked = mmr_rerank(candidates, 2, 1.0);
        assert_eq!(ids(&picked), vec!["a", "a-copy"]);
    }

    #[test]
    fn returns_min_of_k_and_candidates_without_repeats() {
        let query = [1.0, 0.0];
        let candidates = vec![
            candidate("a", vec![1.0, 0.0], &query),
            candidate("b", vec![0.0, 1.0], &query),
            candidate("c", vec![0.7, 0.7], &query),
        ];

        let picked = mmr_rerank(candidates, 10, 0.25);
        let mut got = ids(&picked);
        assert_eq!(got.len(), 3);
        got.sort();
        got.dedup();
        assert_eq!(got.len(), 3);
    }
}
