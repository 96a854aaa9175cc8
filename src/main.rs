// SPDX-License-Identifier: MIT OR Apache-2.0

//! docrag - Ask questions about a folder of documents
//!
//! Ingests PDFs and text files into a local SQLite vector index and answers
//! questions with Gemini, grounded on MMR-diversified passages.

mod cli;
mod indexer;
mod query;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use docrag::config::Config;
use docrag::pipeline::Pipeline;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with DOCRAG_LOG env var (e.g., DOCRAG_LOG=debug docrag ask "question")
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("DOCRAG_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let compact = cli.compact;

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "docrag", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest { path } => {
            let pipeline = open(config, path.as_deref())?;
            indexer::ingest::run(&pipeline, format, compact)?;
        }
        Commands::Reset => {
            let pipeline = open(config, None)?;
            indexer::ingest::reset(&pipeline, format, compact)?;
        }
        Commands::Rebuild { path } => {
            let pipeline = open(config, path.as_deref())?;
            indexer::ingest::rebuild(&pipeline, format, compact)?;
        }
        Commands::Ask { question, template } => {
            let pipeline = open(config, None)?;
            query::ask::run(&pipeline, &question, template.as_deref(), format, compact)?;
        }
        Commands::Search { query, k } => {
            if let Some(k) = k {
                config.retrieval.debug_k = Some(k);
            }
            let pipeline = open(config, None)?;
            query::search::run(&pipeline, &query, format, compact)?;
        }
        Commands::Status => {
            let pipeline = open(config, None)?;
            query::status::run(&pipeline, format, compact)?;
        }
        Commands::Watch { path, debounce } => {
            let pipeline = open(config, path.as_deref())?;
            indexer::watch::run(&pipeline, Some(debounce))?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load_from(path)?),
        None => Ok(Config::load()),
    }
}

fn open(config: Config, documents: Option<&Path>) -> Result<Pipeline> {
    let pipeline = Pipeline::open(config)?;
    Ok(match documents {
        Some(root) => pipeline.with_documents_root(root),
        None => pipeline,
    })
}
