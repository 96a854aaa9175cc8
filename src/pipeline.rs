// SPDX-License-Identifier: MIT OR Apache-2.0

//! The retrieval-augmented pipeline as one façade.
//!
//! Ingestion: documents → chunks with stable ids → embeddings → index.
//! Query: question → diversified passages → prompt → completion → answer.

use once_cell::sync::OnceCell;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::composer::{
    error_answer, AnswerComposer, CompletionError, CompletionService, GeminiClient, PromptTemplate,
    DEFAULT_TEMPLATE,
};
use crate::config::Config;
use crate::documents::{Document, DocumentLoader};
use crate::embedding::{assign_chunk_ids, ChunkConfig, EmbeddingChunker, SharedEmbedder, VectorIndex};
use crate::errors::{Error, Result};
use crate::retriever::Retriever;
use crate::utils::truncate_chars;

/// Totals of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Documents processed successfully
    pub documents: usize,
    /// Documents whose chunks could not be embedded
    pub failed_documents: usize,
    pub chunks: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub collisions: usize,
}

/// One hit of [`Pipeline::debug_search`].
#[derive(Debug, Clone, Serialize)]
pub struct DebugMatch {
    pub score: f32,
    pub distance: f32,
    pub source: String,
    pub page: u32,
    pub chunk_id: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugSearch {
    pub query: String,
    pub match_count: usize,
    pub top: Vec<DebugMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub source: String,
    pub chunks: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub index_path: PathBuf,
    pub entries: u64,
    pub model: Option<String>,
    pub dimension: Option<usize>,
    pub sources: Vec<SourceStatus>,
}

/// Where the active prompt template comes from.
pub trait TemplateSource {
    /// `None` when no template is active.
    fn active_template(&self) -> Result<Option<String>>;
}

/// Template stored in a file; a missing file means no active template.
pub struct FileTemplateSource {
    path: PathBuf,
}

impl FileTemplateSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemplateSource for FileTemplateSource {
    fn active_template(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }
}

/// Template path that selects [`DEFAULT_TEMPLATE`] instead of a file.
pub const BUILTIN_TEMPLATE: &str = "builtin";

/// The prompt shipped with docrag, active only when asked for by name.
pub struct BuiltinTemplateSource;

impl TemplateSource for BuiltinTemplateSource {
    fn active_template(&self) -> Result<Option<String>> {
        Ok(Some(DEFAULT_TEMPLATE.to_string()))
    }
}

/// Source for a configured template path; [`BUILTIN_TEMPLATE`] names the
/// built-in prompt, anything else a template file.
pub fn template_source(path: &Path) -> Box<dyn TemplateSource> {
    if path.as_os_str() == BUILTIN_TEMPLATE {
        Box::new(BuiltinTemplateSource)
    } else {
        Box::new(FileTemplateSource::new(path))
    }
}

pub struct Pipeline {
    config: Config,
    loader: DocumentLoader,
    chunker: EmbeddingChunker,
    index: Arc<VectorIndex>,
    embedder: Arc<SharedEmbedder>,
    completion: OnceCell<Arc<dyn CompletionService>>,
}

impl Pipeline {
    /// Opens the configured index. The embedding model and the completion
    /// client are created on first use.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let chunk_config = ChunkConfig::new(config.chunking.chunk_size(), config.chunking.chunk_overlap())?;
        let index = VectorIndex::open(config.index.path())?;

        Ok(Self {
            loader: DocumentLoader::from_config(&config.documents),
            chunker: EmbeddingChunker::new(chunk_config),
            embedder: Arc::new(SharedEmbedder::from_config(&config.embeddings)),
            index: Arc::new(index),
            completion: OnceCell::new(),
            config,
        })
    }

    /// Replaces the embedder built from configuration.
    pub fn with_embedder(mut self, embedder: SharedEmbedder) -> Self {
        self.embedder = Arc::new(embedder);
        self
    }

    /// Replaces the Gemini client built from configuration.
    pub fn with_completion_service(self, service: Arc<dyn CompletionService>) -> Self {
        let completion = OnceCell::new();
        let _ = completion.set(service);
        Self { completion, ..self }
    }

    /// Points ingestion at another document folder.
    pub fn with_documents_root(mut self, root: impl AsRef<Path>) -> Self {
        let mut documents = self.config.documents.clone();
        documents.path = Some(root.as_ref().to_path_buf());
        self.loader = DocumentLoader::from_config(&documents);
        self.config.documents = documents;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn loader(&self) -> &DocumentLoader {
        &self.loader
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    fn retriever(&self) -> Retriever {
        Retriever::new(
            Arc::clone(&self.index),
            Arc::clone(&self.embedder),
            &self.config.retrieval,
        )
    }

    fn completion(&self) -> std::result::Result<Arc<dyn CompletionService>, CompletionError> {
        self.completion
            .get_or_try_init(|| {
                let client = GeminiClient::from_config(&self.config.llm)?;
                Ok(Arc::new(client) as Arc<dyn CompletionService>)
            })
            .cloned()
    }

    /// Indexes every chunk of the document folder that is not indexed yet.
    pub fn ingest_all(&self) -> Result<IngestReport> {
        let documents = self.loader.load_documents();
        self.ingest_documents(&documents, |_| {})
    }

    /// Indexes `documents`, calling `on_document` after each one.
    ///
    /// A document whose chunks cannot be embedded is logged and counted in
    /// `failed_documents`; storage and configuration errors abort the run.
    pub fn ingest_documents<F>(&self, documents: &[Document], mut on_document: F) -> Result<IngestReport>
    where
        F: FnMut(&Document),
    {
        let mut report = IngestReport::default();

        for document in documents {
            let chunks = assign_chunk_ids(self.chunker.split_documents(std::slice::from_ref(document)));
            match self.index.upsert_new(&chunks, &self.embedder) {
                Ok(upsert) => {
                    report.documents += 1;
                    report.chunks += chunks.len();
                    report.inserted += upsert.inserted;
                    report.skipped += upsert.skipped;
                    report.collisions += upsert.collisions;
                }
                Err(Error::Embedding(reason)) => {
                    tracing::warn!("Skipping {}: embedding failed: {}", document.source_id, reason);
                    report.failed_documents += 1;
                }
                Err(err) => return Err(err),
            }
            on_document(document);
        }

        tracing::info!(
            "Ingested {} documents: {} new chunks, {} already indexed",
            report.documents,
            report.inserted,
            report.skipped
        );
        if report.collisions > 0 {
            tracing::warn!(
                "{} chunk ids changed content since they were indexed; run rebuild to refresh them",
                report.collisions
            );
        }
        Ok(report)
    }

    /// Drops every indexed entry.
    pub fn reset_index(&self) -> Result<()> {
        self.index.clear()?;
        tracing::info!("Index reset at {}", self.index.path().display());
        Ok(())
    }

    /// Reset followed by a full ingest.
    pub fn rebuild(&self) -> Result<IngestReport> {
        self.reset_index()?;
        self.ingest_all()
    }

    /// Answers `question` with the given template text.
    ///
    /// Only an invalid template and storage failures are errors; every other
    /// failure is returned as a marker-prefixed answer.
    pub fn answer(&self, question: &str, template: &str) -> Result<String> {
        let template = PromptTemplate::parse(template)?;

        let passages = match self.retriever().retrieve(question) {
            Ok(passages) => passages,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::error!("Retrieval failed: {}", err);
                return Ok(error_answer(err));
            }
        };

        let service = match self.completion() {
            Ok(service) => service,
            Err(err) => {
                tracing::error!("Completion service unavailable: {}", err);
                return Ok(error_answer(err));
            }
        };

        let composer = AnswerComposer::new(service, self.config.llm.clone());
        Ok(composer.compose(&passages, question, &template))
    }

    /// Answers with the template currently active in `source`.
    pub fn answer_with(&self, question: &str, source: &dyn TemplateSource) -> Result<String> {
        let template = source.active_template()?.ok_or(Error::NoActiveTemplate)?;
        self.answer(question, &template)
    }

    /// Nearest chunks for `question` with scores, for inspecting retrieval.
    ///
    /// Blank input, or input the embedder rejects, yields no matches.
    pub fn debug_search(&self, question: &str) -> Result<DebugSearch> {
        let query = question.trim().to_string();
        if query.is_empty() {
            return Ok(DebugSearch {
                query,
                match_count: 0,
                top: Vec::new(),
            });
        }

        let hits = match self
            .retriever()
            .search_with_scores(&query, self.config.retrieval.debug_k())
        {
            Ok(hits) => hits,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!("Debug search for {:?} failed: {}", query, err);
                Vec::new()
            }
        };

        let snippet_chars = self.config.retrieval.snippet_chars();
        let top: Vec<DebugMatch> = hits
            .into_iter()
            .map(|hit| DebugMatch {
                score: hit.score,
                distance: hit.distance,
                snippet: truncate_chars(&hit.entry.text, snippet_chars).into_owned(),
                source: hit.entry.source_id,
                page: hit.entry.page,
                chunk_id: hit.entry.chunk_id,
            })
            .collect();

        Ok(DebugSearch {
            query,
            match_count: top.len(),
            top,
        })
    }

    pub fn status(&self) -> Result<IndexStatus> {
        let sources = self
            .index
            .list_sources()?
            .into_iter()
            .map(|(source, chunks)| SourceStatus { source, chunks })
            .collect();
        Ok(IndexStatus {
            index_path: self.index.path().to_path_buf(),
            entries: self.index.count()?,
            model: self.index.get_meta("model")?,
            dimension: self
                .index
                .get_meta("dimension")?
                .and_then(|d| d.parse().ok()),
            sources,
        })
    }
}
