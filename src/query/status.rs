// SPDX-License-Identifier: MIT OR Apache-2.0

//! Index summary

use anyhow::Result;
use colored::Colorize;

use crate::cli::OutputFormat;
use docrag::output::{colorize_source, print_json, use_colors};
use docrag::pipeline::Pipeline;

/// Run the status command
pub fn run(pipeline: &Pipeline, format: OutputFormat, compact: bool) -> Result<()> {
    let status = pipeline.status()?;

    match format {
        OutputFormat::Json => print_json(&status, compact)?,
        OutputFormat::Text => {
            let color = use_colors();
            println!("Index:   {}", status.index_path.display());
            println!("Entries: {}", status.entries);
            println!(
                "Model:   {}",
                status.model.as_deref().unwrap_or("(none)")
            );
            if let Some(dimension) = status.dimension {
                println!("Dims:    {}", dimension);
            }
            if status.sources.is_empty() {
                println!("\n{} Index is empty; run `docrag ingest`", "!".yellow());
            } else {
                println!("\nSources:");
                for source in &status.sources {
                    println!("  {:>6}  {}", source.chunks, colorize_source(&source.source, color));
                }
            }
        }
    }

    Ok(())
}
