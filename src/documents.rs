// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document loading.
//!
//! Scans the document folder with the `ignore` walker (sorted, so chunk ids
//! come out identical on every run), extracts text per physical page and
//! skips files that cannot be read.

use ignore::WalkBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::DocumentsConfig;
use crate::errors::{Error, Result};
use crate::utils::INDEX_DIR;

/// Page separator emitted by pdftotext, also honoured in plain-text files.
const FORM_FEED: char = '\u{000C}';

/// One physical page of a document. Page numbers are zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

/// A loaded source document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the document folder, `/`-separated
    pub source_id: String,
    /// Absolute or caller-relative path the text was read from
    pub path: PathBuf,
    /// Full extracted text
    pub text: String,
    /// Pages in physical order
    pub pages: Vec<Page>,
}

impl Document {
    /// Builds a document from already extracted text, splitting pages on form feeds.
    pub fn from_text(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        let source_id = source_id.into();
        let text = text.into();
        let pages = split_pages(&text);
        Self {
            path: PathBuf::from(&source_id),
            source_id,
            text,
            pages,
        }
    }
}

/// Loads every supported document under a folder.
pub struct DocumentLoader {
    root: PathBuf,
    extensions: Vec<String>,
    recursive: bool,
}

impl DocumentLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions: vec!["pdf".into(), "txt".into(), "md".into()],
            recursive: false,
        }
    }

    pub fn from_config(config: &DocumentsConfig) -> Self {
        Self::new(config.path())
            .with_extensions(config.extensions())
            .recursive(config.recursive())
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists supported files, sorted by path.
    pub fn list_files(&self) -> Vec<PathBuf> {
        if !self.root.is_dir() {
            tracing::debug!("Document folder {} does not exist", self.root.display());
            return Vec::new();
        }

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .hidden(false)
            .max_depth(if self.recursive { None } else { Some(1) })
            .filter_entry(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| name != INDEX_DIR)
                    .unwrap_or(true)
            })
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        let mut files: Vec<PathBuf> = walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
            .map(|entry| entry.into_path())
            .filter(|path| self.is_supported(path))
            .collect();
        files.sort();
        files
    }

    /// Whether `path` has one of the loader's extensions.
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Loads every supported document. Files that fail to load are logged
    /// and skipped; an empty or missing folder yields an empty list.
    pub fn load_documents(&self) -> Vec<Document> {
        let files = self.list_files();

        let loaded: Vec<(PathBuf, Result<Document>)> = files
            .into_par_iter()
            .map(|path| {
                let result = self.load_file(&path);
                (path, result)
            })
            .collect();

        let mut documents = Vec::with_capacity(loaded.len());
        for (path, result) in loaded {
            match result {
                Ok(doc) => documents.push(doc),
                Err(err) => tracing::warn!("Skipping {}: {}", path.display(), err),
            }
        }

        documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        tracing::debug!("Loaded {} documents from {}", documents.len(), self.root.display());
        documents
    }

    /// Loads a single file.
    pub fn load_file(&self, path: &Path) -> Result<Document> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let text = match ext.as_str() {
            "pdf" => extract_pdf_text(path)?,
            _ => read_text_file(path)?,
        };

        Ok(Document {
            source_id: self.source_id(path),
            path: path.to_path_buf(),
            pages: split_pages(&text),
            text,
        })
    }

    fn source_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn read_text_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    if bytes.contains(&0) {
        return Err(Error::Document {
            path: path.to_path_buf(),
            reason: "binary content".into(),
        });
    }
    String::from_utf8(bytes).map_err(|_| Error::Document {
        path: path.to_path_buf(),
        reason: "not valid UTF-8".into(),
    })
}

/// Extracts PDF text with poppler's `pdftotext`, which separates pages with form feeds.
fn extract_pdf_text(path: &Path) -> Result<String> {
    let binary = which::which("pdftotext").map_err(|_| Error::Document {
        path: path.to_path_buf(),
        reason: "pdftotext not found (is poppler installed?)".into(),
    })?;

    let output = Command::new(binary)
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output()
        .map_err(|e| Error::io(path, e))?;

    if !output.status.success() {
        return Err(Error::Document {
            path: path.to_path_buf(),
            reason: format!(
                "pdftotext failed (status {}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Splits extracted text into pages on form feeds. Numbering follows the
/// physical position; blank pages are dropped without renumbering the rest.
pub fn split_pages(text: &str) -> Vec<Page> {
    text.split(FORM_FEED)
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(number, page)| Page {
            number: number as u32,
            text: page.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn split_pages_keeps_physical_numbers() {
        let pages = split_pages("first\u{000C}\u{000C}third\u{000C}");
        assert_eq!(
            pages,
            vec![
                Page { number: 0, text: "first".into() },
                Page { number: 2, text: "third".into() },
            ]
        );
    }

    #[test]
    fn missing_folder_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let loader = DocumentLoader::new(dir.path().join("absent"));
        assert!(loader.load_documents().is_empty());
    }

    #[test]
    fn loads_sorted_and_skips_unreadable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "bravo").unwrap();
        fs::write(dir.path().join("a.md"), "alpha").unwrap();
        fs::write(dir.path().join("c.txt"), b"bin\0ary").unwrap();
        fs::write(dir.path().join("ignored.csv"), "x,y").unwrap();

        let docs = DocumentLoader::new(dir.path()).load_documents();
        let ids: Vec<&str> = docs.iter().map(|d| d.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a.md", "b.txt"]);
        assert_eq!(docs[0].pages.len(), 1);
        assert_eq!(docs[0].pages[0].number, 0);
    }

    #[test]
    fn recursive_scan_uses_relative_source_ids() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::create_dir_all(dir.path().join(INDEX_DIR)).unwrap();
        fs::write(dir.path().join("sub").join("deep.txt"), "deep").unwrap();
        fs::write(dir.path().join(INDEX_DIR).join("notes.txt"), "state").unwrap();

        let flat = DocumentLoader::new(dir.path()).load_documents();
        assert!(flat.is_empty());

        let deep = DocumentLoader::new(dir.path()).recursive(true).load_documents();
        assert_eq!(deep.len(), 1);
        assert_eq!(deep[0].source_id, "sub/deep.txt");
    }
}
