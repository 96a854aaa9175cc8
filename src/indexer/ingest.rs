// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingest, reset and rebuild commands

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

use crate::cli::OutputFormat;
use docrag::output::print_json;
use docrag::pipeline::{IngestReport, Pipeline};

/// Ingests the document folder, optionally with a progress bar.
pub fn ingest(pipeline: &Pipeline, show_progress: bool) -> Result<IngestReport> {
    let documents = pipeline.loader().load_documents();

    let pb = if show_progress {
        ProgressBar::new(documents.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} documents | {msg}")
            .expect("valid progress bar template")
            .progress_chars("##."),
    );

    let report = pipeline.ingest_documents(&documents, |doc| {
        pb.set_message(doc.source_id.clone());
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    Ok(report)
}

/// Run the ingest command
pub fn run(pipeline: &Pipeline, format: OutputFormat, compact: bool) -> Result<()> {
    let start = Instant::now();
    let report = ingest(pipeline, format == OutputFormat::Text)?;
    print_report(pipeline, &report, format, compact, start)
}

/// Run the rebuild command
pub fn rebuild(pipeline: &Pipeline, format: OutputFormat, compact: bool) -> Result<()> {
    let start = Instant::now();
    pipeline.reset_index()?;
    let report = ingest(pipeline, format == OutputFormat::Text)?;
    print_report(pipeline, &report, format, compact, start)
}

/// Run the reset command
pub fn reset(pipeline: &Pipeline, format: OutputFormat, compact: bool) -> Result<()> {
    pipeline.reset_index()?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "reset": true }), compact)?,
        OutputFormat::Text => println!(
            "{} Index cleared at {}",
            "✓".green(),
            pipeline.index().path().display()
        ),
    }
    Ok(())
}

fn print_report(
    pipeline: &Pipeline,
    report: &IngestReport,
    format: OutputFormat,
    compact: bool,
    start: Instant,
) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report, compact)?,
        OutputFormat::Text => {
            if report.documents == 0 && report.failed_documents == 0 {
                println!(
                    "{} No documents found in {}",
                    "✗".yellow(),
                    pipeline.loader().root().display()
                );
                return Ok(());
            }
            println!(
                "{} Ingested {} documents in {:.1}s: {} new chunks, {} already indexed",
                "✓".green(),
                report.documents,
                start.elapsed().as_secs_f64(),
                report.inserted,
                report.skipped
            );
            if report.failed_documents > 0 {
                println!("  {} {} documents could not be embedded", "!".yellow(), report.failed_documents);
            }
            if report.collisions > 0 {
                println!(
                    "  {} {} chunks changed since they were indexed; run `docrag rebuild`",
                    "!".yellow(),
                    report.collisions
                );
            }
        }
    }
    Ok(())
}
