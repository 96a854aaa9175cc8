// SPDX-License-Identifier: MIT OR Apache-2.0

use docrag::composer::{CompletionError, CompletionRequest, CompletionService, ANSWER_ERROR_MARKER};
use docrag::config::Config;
use docrag::documents::Document;
use docrag::embedding::{assign_chunk_ids, ChunkConfig, EmbeddingChunker, HashProvider, SharedEmbedder};
use docrag::pipeline::{FileTemplateSource, Pipeline};
use docrag::Error;
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

struct Unreachable;

impl CompletionService for Unreachable {
    fn generate(&self, _: &CompletionRequest) -> Result<String, CompletionError> {
        Err(CompletionError::Timeout)
    }
}

struct Canned(&'static str);

impl CompletionService for Canned {
    fn generate(&self, _: &CompletionRequest) -> Result<String, CompletionError> {
        Ok(self.0.to_string())
    }
}

fn pipeline(dir: &TempDir) -> Pipeline {
    let mut config = Config::default();
    config.documents.path = Some(dir.path().join("data"));
    config.index.path = Some(dir.path().join(".docrag/index.sqlite"));
    Pipeline::open(config)
        .expect("open pipeline")
        .with_embedder(SharedEmbedder::from_provider(Box::new(HashProvider::new(96))))
}

#[test]
fn multi_page_chunk_ids_restart_per_page() {
    let page = "Paragraph about admissions. ".repeat(20);
    let text = format!("cover\u{000C}{}\n\n{}\u{000C}{}", page, page, page);
    let doc = Document::from_text("A.pdf", text);

    let chunker = EmbeddingChunker::new(ChunkConfig::new(300, 30).expect("chunk config"));
    let chunks = assign_chunk_ids(chunker.split_documents(&[doc]));

    let ids: Vec<&str> = chunks.iter().filter_map(|c| c.id()).collect();
    assert_eq!(ids[0], "A.pdf:0:0");
    assert_eq!(ids[1], "A.pdf:1:0");
    assert!(ids.contains(&"A.pdf:1:1"));
    assert!(ids.contains(&"A.pdf:2:0"));
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());

    // same input, same ids
    let again = assign_chunk_ids(chunker.split_documents(&[Document::from_text(
        "A.pdf",
        format!("cover\u{000C}{}\n\n{}\u{000C}{}", page, page, page),
    )]));
    let again_ids: Vec<&str> = again.iter().filter_map(|c| c.id()).collect();
    assert_eq!(ids, again_ids);
}

#[test]
fn answer_flows_from_documents_to_cleaned_text() {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join("data")).expect("mkdir");
    fs::write(dir.path().join("data/geo.txt"), "Paris is the capital of France.").expect("write");

    let pipeline = pipeline(&dir).with_completion_service(Arc::new(Canned("1. **Paris**")));
    pipeline.ingest_all().expect("ingest");

    let answer = pipeline
        .answer("What is the capital of France?", "Ctx:{context} Q:{question}")
        .expect("answer");
    assert_eq!(answer, "Paris");
}

#[test]
fn unreachable_service_yields_marker() {
    let dir = TempDir::new().expect("tempdir");
    let pipeline = pipeline(&dir).with_completion_service(Arc::new(Unreachable));

    let answer = pipeline.answer("anything", "{context}{question}").expect("answer");
    assert!(answer.contains(ANSWER_ERROR_MARKER));
}

#[test]
fn template_source_file_is_read() {
    let dir = TempDir::new().expect("tempdir");
    let pipeline = pipeline(&dir).with_completion_service(Arc::new(Canned("ok")));
    let template = dir.path().join("prompt.txt");

    let err = pipeline
        .answer_with("q", &FileTemplateSource::new(&template))
        .expect_err("no template yet");
    assert!(matches!(err, Error::NoActiveTemplate));

    fs::write(&template, "{context}\n{question}").expect("write template");
    let answer = pipeline
        .answer_with("q", &FileTemplateSource::new(&template))
        .expect("answer");
    assert_eq!(answer, "ok");
}
