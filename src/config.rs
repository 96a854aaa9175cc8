// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for docrag
//!
//! Loads configuration from .docragrc.toml in current directory or ~/.config/docrag/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Local fastembed model
    #[default]
    Builtin,
    /// External command speaking JSON over stdin/stdout
    Command,
    /// Deterministic feature-hashing embedder (offline, tests)
    Hash,
}

/// Document source configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Folder holding the uploaded documents
    pub path: Option<PathBuf>,
    /// File extensions picked up by the loader
    pub extensions: Option<Vec<String>>,
    /// Whether sub-folders are scanned too
    pub recursive: Option<bool>,
}

impl DocumentsConfig {
    /// Get document folder (defaults to "data")
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Get supported extensions (defaults to pdf, txt, md)
    pub fn extensions(&self) -> Vec<String> {
        self.extensions
            .clone()
            .unwrap_or_else(|| vec!["pdf".into(), "txt".into(), "md".into()])
    }

    /// Get recursive flag (defaults to false)
    pub fn recursive(&self) -> bool {
        self.recursive.unwrap_or(false)
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub chunk_size: Option<usize>,
    /// Characters shared with the previous window
    pub chunk_overlap: Option<usize>,
}

impl ChunkingConfig {
    /// Get chunk size (defaults to 800)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(800)
    }

    /// Get chunk overlap (defaults to 80)
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap.unwrap_or(80)
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hash)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Texts per encode call
    pub batch_size: Option<usize>,
    /// Texts are truncated to this many characters before encoding
    pub max_chars: Option<usize>,
    /// Vector dimension of the hash provider
    pub dimension: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "minilm")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("minilm")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get batch size (defaults to 64)
    pub fn batch_size(&self) -> usize {
        self.batch_size.filter(|&n| n > 0).unwrap_or(64)
    }

    /// Get max chars (defaults to 2000)
    pub fn max_chars(&self) -> usize {
        self.max_chars.filter(|&n| n > 0).unwrap_or(2000)
    }

    /// Get hash provider dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.filter(|&n| n > 0).unwrap_or(384)
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Location of the SQLite index file
    pub path: Option<PathBuf>,
}

impl IndexConfig {
    /// Get index path (defaults to .docrag/index.sqlite)
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| crate::utils::default_index_path("."))
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages handed to the composer
    pub k: Option<usize>,
    /// Nearest-neighbour candidates considered by MMR
    pub fetch_k: Option<usize>,
    /// MMR relevance weight (0.0 = diversity, 1.0 = relevance)
    pub lambda: Option<f32>,
    /// Matches returned by debug search
    pub debug_k: Option<usize>,
    /// Snippet length in debug search output
    pub snippet_chars: Option<usize>,
}

impl RetrievalConfig {
    /// Get k (defaults to 12)
    pub fn k(&self) -> usize {
        self.k.unwrap_or(12)
    }

    /// Get candidate pool size (defaults to 4 * k)
    pub fn fetch_k(&self) -> usize {
        self.fetch_k.unwrap_or_else(|| self.k() * 4).max(self.k())
    }

    /// Get MMR lambda (defaults to 0.25, clamped to 0.0-1.0)
    pub fn lambda(&self) -> f32 {
        self.lambda.unwrap_or(0.25).clamp(0.0, 1.0)
    }

    /// Get debug k (defaults to 5)
    pub fn debug_k(&self) -> usize {
        self.debug_k.unwrap_or(5)
    }

    /// Get snippet length (defaults to 300)
    pub fn snippet_chars(&self) -> usize {
        self.snippet_chars.unwrap_or(300)
    }
}

/// Completion service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model id sent to the completion service
    pub model: Option<String>,
    /// Base URL of the generative language API
    pub endpoint: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Retries after a retryable failure
    pub max_retries: Option<u32>,
}

impl LlmConfig {
    /// Get model (defaults to "gemini-2.5-flash-lite")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("gemini-2.5-flash-lite")
    }

    /// Get endpoint (defaults to the public v1beta API)
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or("https://generativelanguage.googleapis.com/v1beta")
    }

    /// Get API key env var name (defaults to GEMINI_API_KEY)
    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or("GEMINI_API_KEY")
    }

    /// Get temperature (defaults to 0.2)
    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(0.2)
    }

    /// Get max output tokens (defaults to 800)
    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens.unwrap_or(800)
    }

    /// Get timeout (defaults to 60 seconds)
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.filter(|&n| n > 0).unwrap_or(60)
    }

    /// Get retry count (defaults to 1)
    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(1)
    }
}

/// Prompt configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// File holding the active prompt template
    pub template_path: Option<PathBuf>,
}

impl PromptConfig {
    pub fn template_path(&self) -> Option<&Path> {
        self.template_path.as_deref()
    }
}

/// Configuration loaded from .docragrc.toml or ~/.config/docrag/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Document source configuration
    #[serde(default)]
    pub documents: DocumentsConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Completion service configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Prompt configuration
    #[serde(default)]
    pub prompt: PromptConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .docragrc.toml in current directory
    /// 2. ~/.config/docrag/config.toml
    pub fn load() -> Self {
        // Try current directory first
        if let Some(config) = Self::try_load(&PathBuf::from(".docragrc.toml")) {
            return config;
        }

        // Try home directory config
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("docrag").join("config.toml");
            if let Some(config) = Self::try_load(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Load an explicitly named configuration file. Unlike [`Config::load`],
    /// a missing or malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn try_load(path: &PathBuf) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::parse(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Check invariants that the accessors cannot repair on their own.
    pub fn validate(&self) -> Result<()> {
        let size = self.chunking.chunk_size();
        let overlap = self.chunking.chunk_overlap();
        if size == 0 {
            return Err(Error::Config("chunking.chunk_size must be greater than 0".into()));
        }
        if overlap >= size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be less than chunking.chunk_size ({})",
                overlap, size
            )));
        }
        if self.retrieval.k() == 0 {
            return Err(Error::Config("retrieval.k must be greater than 0".into()));
        }
        Ok(())
    }
}
