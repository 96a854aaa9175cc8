// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - chunking, vector encoding and the persistent index
//!
//! Documents are split into overlapping windows with stable ids, encoded
//! into unit vectors by a lazily loaded provider, and stored in a SQLite
//! vector index that supports plain and MMR-diversified nearest-neighbour
//! queries.

pub mod chunker;
pub mod mmr;
pub mod provider;
pub mod storage;

pub use chunker::{assign_chunk_ids, Chunk, ChunkConfig, ChunkMetadata, EmbeddingChunker};
pub use mmr::{cosine_similarity, mmr_rerank, DEFAULT_LAMBDA};
pub use provider::{
    create_provider, CommandProvider, EmbeddingProvider, EmbeddingProviderConfig, FastEmbedder,
    HashProvider, SharedEmbedder,
};
pub use storage::{IndexEntry, ScoredEntry, UpsertReport, VectorIndex};
