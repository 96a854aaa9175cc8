// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer composition: prompt rendering, the completion call and cleanup.

pub mod clean;
pub mod llm;
pub mod template;

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::embedding::IndexEntry;

pub use clean::clean_response;
pub use llm::{CompletionError, CompletionRequest, CompletionService, GeminiClient};
pub use template::{join_context, PromptTemplate, CONTEXT_SEPARATOR, DEFAULT_TEMPLATE};

/// Prefix of every answer produced from a failed completion.
pub const ANSWER_ERROR_MARKER: &str = "Error calling the language model";

/// Builds the prompt, asks the completion service and cleans the reply.
pub struct AnswerComposer {
    service: Arc<dyn CompletionService>,
    config: LlmConfig,
}

impl AnswerComposer {
    pub fn new(service: Arc<dyn CompletionService>, config: LlmConfig) -> Self {
        Self { service, config }
    }

    /// Renders the prompt for `passages` and `question`.
    pub fn prompt(&self, passages: &[IndexEntry], question: &str, template: &PromptTemplate) -> String {
        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        template.render(&join_context(&texts), question)
    }

    /// Always yields an answer; completion failures become a
    /// [`ANSWER_ERROR_MARKER`]-prefixed message.
    pub fn compose(&self, passages: &[IndexEntry], question: &str, template: &PromptTemplate) -> String {
        let request = CompletionRequest::new(&self.config, self.prompt(passages, question, template));

        match self.service.generate(&request) {
            Ok(raw) => {
                let cleaned = clean_response(raw.trim());
                if cleaned.is_empty() {
                    tracing::error!("Completion service returned an empty answer");
                    error_answer("empty response")
                } else {
                    cleaned
                }
            }
            Err(err) => {
                tracing::error!("Completion failed: {}", err);
                error_answer(&err)
            }
        }
    }
}

/// Formats a failure as answer text.
pub fn error_answer(reason: impl std::fmt::Display) -> String {
    format!("{}: {}", ANSWER_ERROR_MARKER, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        reply: Result<String, u16>,
        prompts: Mutex<Vec<String>>,
    }

    impl CompletionService for Recording {
        fn generate(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(CompletionError::Http {
                    status: *status,
                    body: "unavailable".into(),
                }),
            }
        }
    }

    fn passage(text: &str) -> IndexEntry {
        IndexEntry {
            chunk_id: "doc.txt:0:0".into(),
            source_id: "doc.txt".into(),
            page: 0,
            text: text.into(),
            content_hash: String::new(),
            embedding: Vec::new(),
            created_at: 0,
        }
    }

    fn composer(reply: Result<String, u16>) -> (Arc<Recording>, AnswerComposer) {
        let service = Arc::new(Recording {
            reply,
            prompts: Mutex::new(Vec::new()),
        });
        let composer = AnswerComposer::new(service.clone(), LlmConfig::default());
        (service, composer)
    }

    #[test]
    fn compose_renders_prompt_and_cleans_reply() {
        let (service, composer) = composer(Ok("**Paris**\n- capital".into()));
        let template = PromptTemplate::parse("C:{context}|Q:{question}").unwrap();

        let answer = composer.compose(&[passage("one"), passage("two")], "Where?", &template);

        assert_eq!(answer, "Paris\ncapital");
        let prompts = service.prompts.lock().unwrap();
        assert_eq!(prompts[0], "C:one\n\n---\n\ntwo|Q:Where?");
    }

    #[test]
    fn failure_becomes_marked_answer() {
        let (_, composer) = composer(Err(503));
        let template = PromptTemplate::parse(DEFAULT_TEMPLATE).unwrap();
        let answer = composer.compose(&[], "Where?", &template);
        assert!(answer.starts_with(ANSWER_ERROR_MARKER));
        assert!(answer.contains("503"));
    }

    #[test]
    fn empty_reply_becomes_marked_answer() {
        let (_, composer) = composer(Ok("  \n ".into()));
        let template = PromptTemplate::parse(DEFAULT_TEMPLATE).unwrap();
        assert!(composer
            .compose(&[passage("x")], "q", &template)
            .starts_with(ANSWER_ERROR_MARKER));
    }
}
