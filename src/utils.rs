// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for docrag

use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// The name of the directory holding docrag state
pub const INDEX_DIR: &str = ".docrag";

/// File name of the vector index inside [`INDEX_DIR`]
pub const INDEX_FILE: &str = "index.sqlite";

/// Find the nearest directory containing a .docrag folder by walking up from the given path.
/// Returns None if no .docrag directory is found.
pub fn find_index_root(start: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start.as_ref().to_path_buf();

    // Canonicalize to handle relative paths
    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    loop {
        let index_path = current.join(INDEX_DIR);
        if index_path.is_dir() {
            return Some(current);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Get the index file path for a directory, walking up to find parent indexes.
/// Falls back to `<path>/.docrag/index.sqlite` if no index is found anywhere.
pub fn default_index_path(path: impl AsRef<Path>) -> PathBuf {
    let root = find_index_root(&path).unwrap_or_else(|| path.as_ref().to_path_buf());
    root.join(INDEX_DIR).join(INDEX_FILE)
}

/// Truncates to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_index_root_in_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INDEX_DIR)).unwrap();

        let subdir = dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();

        let root = find_index_root(&subdir).unwrap();
        assert_eq!(root, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn default_index_path_fallback() {
        let dir = TempDir::new().unwrap();
        let path = default_index_path(dir.path());
        assert_eq!(path, dir.path().join(INDEX_DIR).join(INDEX_FILE));
    }

    #[test]
    fn truncate_chars_is_utf8_safe() {
        assert_eq!(truncate_chars("hello", 2), Cow::<str>::Owned("he".to_string()));
        assert_eq!(truncate_chars("hello", 5), Cow::Borrowed("hello"));
        assert_eq!(truncate_chars("ñandú", 2), "ña");
    }
}
