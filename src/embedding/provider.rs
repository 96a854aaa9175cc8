// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers turn text into raw vectors. [`SharedEmbedder`] sits in front of
//! them: it loads the provider once, on first use, and L2-normalizes every
//! vector it hands out so that cosine similarity reduces to a dot product.

use anyhow::{bail, Context};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::borrow::Cow;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use crate::config::{EmbeddingConfig, EmbeddingProviderType};
use crate::errors::{Error, Result};
use crate::utils::truncate_chars;

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 64;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 2000;
const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;

/// Added to the norm before dividing so all-zero vectors stay finite.
pub const NORM_EPSILON: f32 = 1e-12;

/// Configuration for the fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
}

impl EmbeddingProviderConfig {
    /// Builds the provider config from the `[embeddings]` section, letting
    /// `FASTEMBED_*` environment variables override it.
    pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = env::var("FASTEMBED_MODEL").unwrap_or_else(|_| config.model().to_string());
        let model = parse_model(&model_name)?;

        let mut batch_size = parse_usize_env("FASTEMBED_BATCH_SIZE", config.batch_size())?;
        if batch_size == 0 {
            batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
        }
        if batch_size > MAX_FASTEMBED_BATCH_SIZE {
            tracing::warn!(
                "FASTEMBED_BATCH_SIZE={} exceeds max {}; clamping.",
                batch_size,
                MAX_FASTEMBED_BATCH_SIZE
            );
            batch_size = MAX_FASTEMBED_BATCH_SIZE;
        }

        let mut max_chars = parse_usize_env("FASTEMBED_MAX_CHARS", config.max_chars())?;
        if max_chars == 0 {
            max_chars = DEFAULT_FASTEMBED_MAX_CHARS;
        }

        Ok(Self {
            model,
            batch_size,
            max_chars,
        })
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
        }
    }
}

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates embeddings for the given texts.
    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// FastEmbed provider running a sentence-transformers model locally.
pub struct FastEmbedder {
    embedder: TextEmbedding,
    config: EmbeddingProviderConfig,
    model_id: String,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> anyhow::Result<Self> {
        let model = config.model.clone();
        let model_id = model.to_string();
        let init = InitOptions::new(model);
        let embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

        tracing::info!("Loaded embedding model {}", model_id);
        Ok(Self {
            embedder,
            config,
            model_id,
        })
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.config.max_chars);
        let embeddings = self
            .embedder
            .embed(&prepared, Some(self.config.batch_size))?;

        Ok(embeddings)
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": ..., "texts": [...]}` on stdin and must
/// print a JSON array of vectors, or an object carrying one under
/// `embeddings`, `vectors` or `data`.
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
    max_chars: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn run_command(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let prepared = truncate_texts(texts, self.max_chars);
        let payload = serde_json::json!({
            "model": self.model,
            "texts": prepared,
        });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload_str = payload.to_string();
            stdin
                .write_all(payload_str.as_bytes())
                .context("Failed to write embeddings payload to stdin")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to read embeddings command output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Embedding command failed (status {}): {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_command_output(stdout.trim())
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run_command(texts)
    }
}

fn parse_command_output(raw: &str) -> anyhow::Result<Vec<Vec<f32>>> {
    let parsed: Value = serde_json::from_str(raw)
        .with_context(|| "Failed to parse embeddings command output as JSON")?;

    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(ref obj) => {
            if let Some(value) = obj.get("embeddings") {
                value.clone()
            } else if let Some(value) = obj.get("vectors") {
                value.clone()
            } else if let Some(value) = obj.get("data") {
                value.clone()
            } else {
                bail!("Embeddings command output missing 'embeddings' field");
            }
        }
        _ => bail!("Embeddings command output must be JSON array or object"),
    };

    embeddings_value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Embeddings output must be a JSON array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow::anyhow!("Embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .ok_or_else(|| anyhow::anyhow!("Embedding value must be a number"))
                        .map(|v| v as f32)
                })
                .collect::<anyhow::Result<Vec<f32>>>()
        })
        .collect()
}

/// Feature-hashing provider: each lowercase word is hashed with blake3 into
/// one signed bucket. Deterministic and model-free, so texts sharing words
/// land close together without any download.
pub struct HashProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HashProvider {
    /// Creates a new hash provider with specified dimension.
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model: format!("hash-{}", dimension),
            dimension,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    /// Text without words (or whose buckets cancel out) is hashed whole, so
    /// no input maps to the zero vector.
    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            self.add_token(&mut vector, &token.to_lowercase());
        }
        if vector.iter().all(|v| *v == 0.0) {
            self.add_token(&mut vector, text);
        }
        vector
    }

    fn add_token(&self, vector: &mut [f32], token: &str) {
        let hash = blake3::hash(token.as_bytes());
        let bytes = hash.as_bytes();
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&bytes[..8]);
        let idx = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[idx] += sign;
    }
}

impl EmbeddingProvider for HashProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Creates the provider selected by the `[embeddings]` section.
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match config.provider() {
        EmbeddingProviderType::Builtin => {
            let provider_config = EmbeddingProviderConfig::from_config(config)?;
            Ok(Box::new(FastEmbedder::new(provider_config)?))
        }
        EmbeddingProviderType::Command => Ok(Box::new(
            CommandProvider::new(config.command().to_string(), config.model().to_string())
                .with_batch_size(config.batch_size())
                .with_max_chars(config.max_chars()),
        )),
        EmbeddingProviderType::Hash => Ok(Box::new(HashProvider::new(config.dimension()))),
    }
}

type ProviderFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn EmbeddingProvider>> + Send + Sync>;

/// Lazily-initialised, thread-safe handle to one embedding provider.
///
/// The provider is built by the factory on the first encode call and reused
/// for every later call. Share the handle with `Arc` rather than creating
/// one per request.
pub struct SharedEmbedder {
    factory: ProviderFactory,
    provider: OnceCell<Mutex<Box<dyn EmbeddingProvider>>>,
}

impl SharedEmbedder {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn EmbeddingProvider>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            provider: OnceCell::new(),
        }
    }

    /// Handle whose provider comes from the `[embeddings]` configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let config = config.clone();
        Self::new(move || create_provider(&config))
    }

    /// Handle around an already constructed provider.
    pub fn from_provider(provider: Box<dyn EmbeddingProvider>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Mutex::new(provider));
        Self {
            factory: Box::new(|| -> anyhow::Result<Box<dyn EmbeddingProvider>> {
                bail!("embedding provider already initialised")
            }),
            provider: cell,
        }
    }

    /// Whether the underlying model has been loaded yet.
    pub fn is_loaded(&self) -> bool {
        self.provider.get().is_some()
    }

    fn provider(&self) -> Result<&Mutex<Box<dyn EmbeddingProvider>>> {
        self.provider
            .get_or_try_init(|| {
                tracing::debug!("Initialising embedding provider");
                (self.factory)().map(Mutex::new)
            })
            .map_err(Error::embedding)
    }

    /// Returns the model identifier, loading the provider if needed.
    pub fn model_id(&self) -> Result<String> {
        let guard = self
            .provider()?
            .lock()
            .map_err(|_| Error::Embedding("embedding provider lock poisoned".into()))?;
        Ok(guard.model_id().to_string())
    }

    /// Embeds document texts, batched by the provider batch size.
    /// Output order matches input order; every vector is unit length.
    pub fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self
            .provider()?
            .lock()
            .map_err(|_| Error::Embedding("embedding provider lock poisoned".into()))?;
        let batch_size = guard.batch_size().max(1);

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let embedded = guard.embed_texts(batch).map_err(Error::embedding)?;
            if embedded.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded.into_iter().map(normalize));
        }

        Ok(vectors)
    }

    /// Embeds a single query text into a unit vector.
    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::Embedding("No embedding returned".into()))
    }
}

/// Scales `vector` by `1 / (||vector|| + NORM_EPSILON)`.
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    let scale = 1.0 / (norm + NORM_EPSILON);
    for value in vector.iter_mut() {
        *value *= scale;
    }
    vector
}

fn truncate_texts(texts: &[String], max_chars: usize) -> Vec<Cow<'_, str>> {
    texts
        .iter()
        .map(|text| truncate_chars(text.as_str(), max_chars))
        .collect()
}

fn parse_model(raw: &str) -> anyhow::Result<EmbeddingModel> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small" | "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => {
            Ok(EmbeddingModel::BGESmallENV15)
        }
        "e5-small" | "multilingual-e5-small" | "intfloat/multilingual-e5-small" => {
            Ok(EmbeddingModel::MultilingualE5Small)
        }
        "paraphrase-multilingual"
        | "paraphrase-multilingual-minilm-l12-v2"
        | "sentence-transformers/paraphrase-multilingual-minilm-l12-v2" => {
            Ok(EmbeddingModel::ParaphraseMLMiniLML12V2)
        }
        other => bail!(
            "Unsupported embedding model '{}'. Supported values: {}, bge-small, e5-small, paraphrase-multilingual",
            other,
            DEFAULT_FASTEMBED_MODEL
        ),
    }
}

fn parse_usize_env(name: &str, default: usize) -> anyhow::Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .with_context(|| format!("Invalid {} value: {}", name, value))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}
