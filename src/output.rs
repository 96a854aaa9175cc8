// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Color helpers respect the NO_COLOR environment variable.

use colored::Colorize;
use serde::Serialize;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize a document source id (cyan)
pub fn colorize_source(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a page number (yellow)
pub fn colorize_page(page: u32, use_color: bool) -> String {
    if use_color {
        page.to_string().yellow().to_string()
    } else {
        page.to_string()
    }
}

/// Colorize a similarity score: green when close, red when far off
pub fn colorize_score(score: f32, use_color: bool) -> String {
    let text = format!("{:.4}", score);
    if !use_color {
        return text;
    }
    if score >= 0.5 {
        text.green().to_string()
    } else if score >= 0.25 {
        text.yellow().to_string()
    } else {
        text.red().to_string()
    }
}

/// Colorize snippet text (dimmed)
pub fn colorize_snippet(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize an error answer (red bold)
pub fn colorize_error(text: &str, use_color: bool) -> String {
    if use_color {
        text.red().bold().to_string()
    } else {
        text.to_string()
    }
}

/// Print a value as JSON on stdout, pretty unless `compact`.
pub fn print_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> anyhow::Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", json);
    Ok(())
}
