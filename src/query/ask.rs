// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer a question through the full pipeline

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use docrag::composer::ANSWER_ERROR_MARKER;
use docrag::output::{colorize_error, print_json, use_colors};
use docrag::pipeline::{template_source, Pipeline};
use docrag::Error;

#[derive(Debug, Serialize)]
struct AskResult<'a> {
    question: &'a str,
    answer: &'a str,
    error: bool,
}

/// Run the ask command
///
/// Template precedence: `--template`, then `prompt.template_path`. Either may
/// be `builtin` for the shipped prompt; with neither set the command fails.
pub fn run(
    pipeline: &Pipeline,
    question: &str,
    template: Option<&Path>,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let configured = pipeline.config().prompt.template_path().map(Path::to_path_buf);
    let path = template
        .map(Path::to_path_buf)
        .or(configured)
        .ok_or(Error::NoActiveTemplate)?;
    let answer = pipeline.answer_with(question, &*template_source(&path))?;
    let failed = answer.starts_with(ANSWER_ERROR_MARKER);

    match format {
        OutputFormat::Json => print_json(
            &AskResult {
                question,
                answer: &answer,
                error: failed,
            },
            compact,
        )?,
        OutputFormat::Text => {
            if failed {
                println!("{}", colorize_error(&answer, use_colors()));
            } else {
                println!("{}", answer);
            }
        }
    }

    Ok(())
}
