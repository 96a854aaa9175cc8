// SPDX-License-Identifier: MIT OR Apache-2.0

//! Debug search: nearest passages with their scores

use anyhow::Result;
use colored::Colorize;

use crate::cli::OutputFormat;
use docrag::output::{colorize_page, colorize_score, colorize_snippet, colorize_source, print_json, use_colors};
use docrag::pipeline::Pipeline;

/// Run the search command
pub fn run(pipeline: &Pipeline, query: &str, format: OutputFormat, compact: bool) -> Result<()> {
    let result = pipeline.debug_search(query)?;

    match format {
        OutputFormat::Json => print_json(&result, compact)?,
        OutputFormat::Text => {
            if result.top.is_empty() {
                println!("{} No matches for: {}", "✗".red(), query.yellow());
                return Ok(());
            }

            let color = use_colors();
            println!("\n{} {} matches for: {}\n", "🔍".cyan(), result.match_count, query.yellow());
            for hit in &result.top {
                println!(
                    "  {} {} p.{} {}",
                    colorize_score(hit.score, color),
                    colorize_source(&hit.source, color),
                    colorize_page(hit.page, color),
                    hit.chunk_id.dimmed()
                );
                for line in hit.snippet.lines().filter(|l| !l.trim().is_empty()) {
                    println!("      {}", colorize_snippet(line.trim_end(), color));
                }
                println!();
            }
        }
    }

    Ok(())
}
