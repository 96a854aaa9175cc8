// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared across the docrag library.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used by every library module.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any failure reported by the SQLite layer backing the vector index.
    #[error("vector index storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The index holds data that cannot be interpreted.
    #[error("vector index is corrupt: {0}")]
    Corrupt(String),

    #[error("embedding model failed: {0}")]
    Embedding(String),

    #[error("failed to load document {path}: {reason}")]
    Document { path: PathBuf, reason: String },

    #[error("invalid prompt template: {0}")]
    Template(String),

    #[error("no active prompt template is configured (set [prompt] template_path or pass --template)")]
    NoActiveTemplate,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn embedding(err: impl std::fmt::Display) -> Self {
        Error::Embedding(err.to_string())
    }

    /// Errors that propagate out of `Pipeline::answer` instead of being
    /// folded into the answer text.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io { .. }
                | Error::Storage(_)
                | Error::Corrupt(_)
                | Error::Template(_)
                | Error::NoActiveTemplate
                | Error::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_and_config_errors_are_fatal() {
        assert!(Error::Corrupt("bad blob".into()).is_fatal());
        assert!(Error::NoActiveTemplate.is_fatal());
        assert!(Error::Template("missing {question}".into()).is_fatal());
        assert!(!Error::Embedding("oom".into()).is_fatal());
    }
}
