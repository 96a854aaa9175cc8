// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// docrag - Ask questions about a folder of documents
///
/// Indexes PDF and text documents into a local vector index and answers
/// questions with a language model, using the most relevant passages as
/// context.
#[derive(Parser, Debug)]
#[command(name = "docrag")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to .docragrc.toml, then ~/.config/docrag/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index documents that are not indexed yet
    Ingest {
        /// Document folder (defaults to the configured one)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Delete every entry from the index
    Reset,

    /// Reset the index and ingest all documents again
    Rebuild {
        /// Document folder (defaults to the configured one)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Answer a question from the indexed documents
    Ask {
        /// The question
        question: String,

        /// Prompt template file with {context} and {question} slots, or `builtin`
        #[arg(short, long)]
        template: Option<PathBuf>,
    },

    /// Show the passages closest to a question, with scores
    Search {
        /// The question or search text
        query: String,

        /// Number of matches (defaults to retrieval.debug_k)
        #[arg(short = 'k', long)]
        k: Option<usize>,
    },

    /// Show what the index contains
    Status,

    /// Watch the document folder and keep the index up to date
    Watch {
        /// Folder to watch (defaults to the configured one)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Debounce interval in seconds (default: 2)
        #[arg(long, default_value = "2")]
        debounce: u64,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["docrag", "search", "fees", "-k", "3", "--format", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Search { query, k } => {
                assert_eq!(query, "fees");
                assert_eq!(k, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
