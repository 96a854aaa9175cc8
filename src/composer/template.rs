// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt templates with `{context}` and `{question}` slots.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{Error, Result};

/// Separator placed between retrieved passages.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

static SLOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid slot regex"));

/// Prompt used when no template is configured.
pub const DEFAULT_TEMPLATE: &str = "You are a friendly and precise academic assistant. \
Answer the question using only the information inside <CONTEXT>. \
If the context does not contain the answer, say that you do not know.\n\
<CONTEXT>\n{context}\n</CONTEXT>\nQuestion: {question}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Context,
    Question,
}

/// A validated template: exactly one `{context}`, exactly one `{question}`
/// and no other `{identifier}` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut contexts = 0;
        let mut questions = 0;
        let mut last = 0;

        for caps in SLOT.captures_iter(raw) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let slot = match name.as_str() {
                "context" => {
                    contexts += 1;
                    Segment::Context
                }
                "question" => {
                    questions += 1;
                    Segment::Question
                }
                other => {
                    return Err(Error::Template(format!("unknown placeholder {{{}}}", other)));
                }
            };
            if whole.start() > last {
                segments.push(Segment::Literal(raw[last..whole.start()].to_string()));
            }
            segments.push(slot);
            last = whole.end();
        }
        if last < raw.len() {
            segments.push(Segment::Literal(raw[last..].to_string()));
        }

        match (contexts, questions) {
            (1, 1) => Ok(Self { segments }),
            (c, q) => Err(Error::Template(format!(
                "expected exactly one {{context}} and one {{question}}, found {} and {}",
                c, q
            ))),
        }
    }

    /// Substitutes both slots in a single pass; placeholders inside the
    /// values are left as they are.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Context => out.push_str(context),
                Segment::Question => out.push_str(question),
            }
        }
        out
    }
}

/// Joins passage texts with [`CONTEXT_SEPARATOR`].
pub fn join_context<S: AsRef<str>>(passages: &[S]) -> String {
    passages
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
