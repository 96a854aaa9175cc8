// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-based vector index for document chunks.
//!
//! Every entry is keyed by its chunk id. Writes are insert-if-absent: an id
//! that is already stored is never touched again, which makes re-ingesting
//! an unchanged corpus a no-op. Queries are brute-force cosine similarity
//! over all stored vectors, optionally re-ranked with MMR.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::chunker::Chunk;
use super::mmr::{cosine_similarity, mmr_rerank};
use super::provider::SharedEmbedder;
use crate::errors::{Error, Result};

const SCHEMA_VERSION: &str = "1";

/// A stored chunk with its vector.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// `source:page:index`
    pub chunk_id: String,
    /// Document the chunk came from
    pub source_id: String,
    /// Zero-based page number
    pub page: u32,
    /// Chunk text
    pub text: String,
    /// blake3 hash of the text at insertion time
    pub content_hash: String,
    /// Unit-length embedding vector
    pub embedding: Vec<f32>,
    /// Unix timestamp when this entry was created
    pub created_at: i64,
}

/// A query hit.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    /// Cosine similarity to the query
    pub score: f32,
    /// Cosine distance, `1 - score`
    pub distance: f32,
}

/// Outcome of [`VectorIndex::upsert_new`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub inserted: usize,
    pub skipped: usize,
    /// Existing ids whose stored text differs from the incoming chunk.
    pub collisions: usize,
}

/// Persistent chunk index.
///
/// The connection sits behind a mutex so the index can be shared across
/// threads. `upsert_new` additionally holds a writer lock for its whole
/// duration so concurrent ingestions never interleave, while embedding
/// happens without the connection lock and queries keep running.
pub struct VectorIndex {
    conn: Mutex<Connection>,
    writer: Mutex<()>,
    path: PathBuf,
}

impl VectorIndex {
    /// Opens or creates an index at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            writer: Mutex::new(()),
            path,
        })
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Corrupt("index connection lock poisoned".into()))
    }

    fn writer(&self) -> Result<MutexGuard<'_, ()>> {
        self.writer
            .lock()
            .map_err(|_| Error::Corrupt("index writer lock poisoned".into()))
    }

    /// Counts stored entries.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Returns every stored chunk id.
    pub fn existing_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT chunk_id FROM chunks")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(ids)
    }

    /// Checks whether an id is stored.
    pub fn contains(&self, chunk_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM chunks WHERE chunk_id = ?1",
                params![chunk_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Retrieves one entry by id.
    pub fn get(&self, chunk_id: &str) -> Result<Option<IndexEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT chunk_id, source_id, page, text, content_hash, embedding, created_at
            FROM chunks
            WHERE chunk_id = ?1
            "#,
        )?;
        let raw = stmt.query_row(params![chunk_id], read_row).optional()?;
        raw.map(RawEntry::decode).transpose()
    }

    /// Lists sources with their chunk counts, ordered by source.
    pub fn list_sources(&self) -> Result<Vec<(String, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT source_id, COUNT(*)
            FROM chunks
            GROUP BY source_id
            ORDER BY source_id
            "#,
        )?;
        let sources = stmt
            .query_map([], |row| {
                let source: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((source, count as u64))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    /// Gets metadata value by key.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        get_meta(&conn, key)
    }

    /// Inserts the chunks whose id is not stored yet.
    ///
    /// Chunks with an id already in the index are skipped without comparing
    /// or updating anything, except that a differing content hash is
    /// reported as a collision. Duplicate ids within `chunks` keep the first
    /// occurrence. New texts are embedded in batches through `embedder`.
    pub fn upsert_new(&self, chunks: &[Chunk], embedder: &SharedEmbedder) -> Result<UpsertReport> {
        let _writer = self.writer()?;
        let mut report = UpsertReport::default();

        let sources: HashSet<&str> = chunks
            .iter()
            .map(|c| c.metadata.source_id.as_str())
            .collect();
        let existing = self.stored_hashes(sources)?;

        let mut seen: HashSet<&str> = HashSet::new();
        let mut pending: Vec<(&Chunk, &str, String)> = Vec::new();
        for chunk in chunks {
            let id = chunk.id().ok_or_else(|| {
                Error::Config(format!(
                    "chunk from {} page {} has no id",
                    chunk.metadata.source_id, chunk.metadata.page
                ))
            })?;
            let hash = content_hash(&chunk.text);

            if let Some(stored_hash) = existing.get(id) {
                report.skipped += 1;
                if *stored_hash != hash {
                    report.collisions += 1;
                    tracing::warn!(
                        "Chunk id {} already indexed with different text; keeping stored entry",
                        id
                    );
                }
                continue;
            }
            if !seen.insert(id) {
                report.skipped += 1;
                continue;
            }
            pending.push((chunk, id, hash));
        }

        if pending.is_empty() {
            return Ok(report);
        }

        let model_id = embedder.model_id()?;
        if let Some(stored) = self.get_meta("model")? {
            if stored != model_id {
                return Err(Error::Config(format!(
                    "index was built with embedding model '{}' but '{}' is configured; rebuild the index",
                    stored, model_id
                )));
            }
        }

        let texts: Vec<String> = pending.iter().map(|(c, _, _)| c.text.clone()).collect();
        let vectors = embedder.embed_documents(&texts)?;
        let dimension = self.check_dimension(&vectors)?;

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO chunks (
                    chunk_id, source_id, page, text, content_hash, embedding, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(chunk_id) DO NOTHING
                "#,
            )?;

            for ((chunk, id, hash), vector) in pending.iter().zip(vectors.iter()) {
                let inserted = stmt.execute(params![
                    id,
                    chunk.metadata.source_id,
                    chunk.metadata.page,
                    chunk.text,
                    hash,
                    embedding_to_blob(vector),
                    created_at
                ])?;
                if inserted == 0 {
                    report.skipped += 1;
                } else {
                    report.inserted += inserted;
                }
            }
        }
        set_meta(&tx, "model", &model_id)?;
        if let Some(dimension) = dimension {
            set_meta(&tx, "dimension", &dimension.to_string())?;
        }
        tx.commit()?;

        tracing::debug!(
            "Upserted {} new chunks ({} skipped, {} collisions)",
            report.inserted,
            report.skipped,
            report.collisions
        );
        Ok(report)
    }

    fn stored_hashes<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a str>,
    ) -> Result<HashMap<String, String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT chunk_id, content_hash FROM chunks WHERE source_id = ?1")?;
        let mut hashes = HashMap::new();
        for source in sources {
            let rows = stmt.query_map(params![source], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (id, hash) = row?;
                hashes.insert(id, hash);
            }
        }
        Ok(hashes)
    }

    /// All vectors must share one dimension, and it must match what the index already holds.
    fn check_dimension(&self, vectors: &[Vec<f32>]) -> Result<Option<usize>> {
        let Some(first) = vectors.first() else {
            return Ok(None);
        };
        let dimension = first.len();
        if vectors.iter().any(|v| v.len() != dimension) {
            return Err(Error::Embedding(
                "embedding provider returned vectors of differing dimensions".into(),
            ));
        }
        if let Some(stored) = self.get_meta("dimension")? {
            if stored != dimension.to_string() {
                return Err(Error::Config(format!(
                    "index stores {}-dimensional vectors but the provider produced {}; rebuild the index",
                    stored, dimension
                )));
            }
        }
        Ok(Some(dimension))
    }

    fn all_entries(&self) -> Result<Vec<IndexEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT chunk_id, source_id, page, text, content_hash, embedding, created_at
            FROM chunks
            "#,
        )?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);
        rows.into_iter().map(RawEntry::decode).collect()
    }

    /// Nearest neighbours by cosine similarity, most similar first.
    ///
    /// An empty index yields an empty result.
    pub fn similarity_query(&self, query: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for entry in self.all_entries()? {
            if entry.embedding.len() != query.len() {
                return Err(Error::Corrupt(format!(
                    "entry {} has {} dimensions but the query has {}",
                    entry.chunk_id,
                    entry.embedding.len(),
                    query.len()
                )));
            }
            let score = cosine_similarity(query, &entry.embedding);
            results.push(ScoredEntry {
                entry,
                score,
                distance: 1.0 - score,
            });
        }

        // Sort by score (descending), ties by id for a stable order
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entry.chunk_id.cmp(&b.entry.chunk_id))
        });
        results.truncate(k);

        Ok(results)
    }

    /// MMR-diversified query: takes the `max(fetch_k, k)` nearest entries
    /// and picks `k` of them trading relevance (`lambda`) against redundancy.
    pub fn diversified_query(
        &self,
        query: &[f32],
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Result<Vec<IndexEntry>> {
        let candidates = self.similarity_query(query, fetch_k.max(k))?;
        Ok(mmr_rerank(candidates, k, lambda)
            .into_iter()
            .map(|scored| scored.entry)
            .collect())
    }

    /// Drops every entry and all metadata, leaving an empty index.
    pub fn clear(&self) -> Result<()> {
        let _writer = self.writer()?;
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            DROP TABLE IF EXISTS chunks;
            DROP TABLE IF EXISTS meta;
            "#,
        )?;
        init_schema(&conn)?;
        conn.execute_batch("VACUUM")?;
        Ok(())
    }
}

/// Initializes the database schema if it does not exist.
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            page INTEGER NOT NULL,
            text TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_source_page
            ON chunks(source_id, page);
        "#,
    )?;

    match get_meta(conn, "schema_version")? {
        None => {
            set_meta(conn, "schema_version", SCHEMA_VERSION)?;
            set_meta(conn, "space", "cosine")?;
        }
        Some(version) if version != SCHEMA_VERSION => {
            return Err(Error::Corrupt(format!(
                "unsupported index schema version {}",
                version
            )));
        }
        Some(_) => {}
    }

    Ok(())
}

fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO meta (key, value)
        VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
        params![key, value],
    )?;
    Ok(())
}

/// Row as read from SQLite, before the vector blob is decoded.
struct RawEntry {
    chunk_id: String,
    source_id: String,
    page: u32,
    text: String,
    content_hash: String,
    embedding: Vec<u8>,
    created_at: i64,
}

impl RawEntry {
    fn decode(self) -> Result<IndexEntry> {
        let embedding = blob_to_embedding(&self.embedding).ok_or_else(|| {
            Error::Corrupt(format!(
                "embedding blob of {} has invalid length {}",
                self.chunk_id,
                self.embedding.len()
            ))
        })?;
        Ok(IndexEntry {
            chunk_id: self.chunk_id,
            source_id: self.source_id,
            page: self.page,
            text: self.text,
            content_hash: self.content_hash,
            embedding,
            created_at: self.created_at,
        })
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        chunk_id: row.get(0)?,
        source_id: row.get(1)?,
        page: row.get(2)?,
        text: row.get(3)?,
        content_hash: row.get(4)?,
        embedding: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Hash of chunk text used to spot id collisions.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Converts an embedding vector to a compact blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Converts a blob back to an embedding vector.
fn blob_to_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}
