// SPDX-License-Identifier: MIT OR Apache-2.0

//! docrag - Retrieval-augmented question answering over a document folder
//!
//! Shared modules for the docrag CLI tool: document loading, chunking,
//! embeddings, the SQLite vector index, MMR retrieval and answer
//! composition through a completion service.

pub mod composer;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod errors;
pub mod output;
pub mod pipeline;
pub mod retriever;
pub mod utils;

pub use errors::{Error, Result};
pub use pipeline::Pipeline;
