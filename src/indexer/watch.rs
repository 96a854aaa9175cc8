// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document folder watcher with debouncing
//!
//! New and modified files are ingested incrementally. A removed file, or a
//! file whose chunks no longer match what is indexed, triggers a full
//! rebuild so stale passages disappear from the index.

use anyhow::Result;
use colored::Colorize;
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::indexer::ingest;
use docrag::documents::DocumentLoader;
use docrag::pipeline::Pipeline;
use docrag::utils::INDEX_DIR;

/// Default debounce interval in seconds
const DEFAULT_DEBOUNCE_SECS: u64 = 2;

/// Minimum time between reindex operations
const MIN_REINDEX_INTERVAL_SECS: u64 = 5;

/// Changes collected between two reindex runs.
#[derive(Debug, Default)]
struct PendingChanges {
    paths: HashSet<PathBuf>,
    removed: bool,
}

impl PendingChanges {
    /// Records the relevant paths of `event`. Returns whether anything was recorded.
    fn record(&mut self, event: &Event, loader: &DocumentLoader) -> bool {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return false;
        }

        let mut recorded = false;
        for path in &event.paths {
            if is_index_path(path) || !loader.is_supported(path) {
                continue;
            }
            self.paths.insert(path.clone());
            recorded = true;
        }
        // A rename may move a document out of the folder; only a rebuild
        // drops its chunks.
        if recorded
            && matches!(
                event.kind,
                EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
            )
        {
            self.removed = true;
        }
        recorded
    }

    fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn take(&mut self) -> PendingChanges {
        std::mem::take(self)
    }
}

fn is_index_path(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str().to_str() == Some(INDEX_DIR))
}

/// File system watcher with debouncing
pub struct Watcher {
    root: PathBuf,
    debounce_duration: Duration,
    min_reindex_interval: Duration,
}

impl Watcher {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_debounce(root, DEFAULT_DEBOUNCE_SECS)
    }

    /// Create watcher with custom debounce interval
    pub fn with_debounce(root: impl AsRef<Path>, debounce_secs: u64) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            debounce_duration: Duration::from_secs(debounce_secs),
            min_reindex_interval: Duration::from_secs(MIN_REINDEX_INTERVAL_SECS.max(debounce_secs)),
        }
    }

    /// Watch until Ctrl+C, reindexing after each quiet period.
    pub fn watch(&self, pipeline: &Pipeline) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.watch_loop(pipeline))
    }

    async fn watch_loop(&self, pipeline: &Pipeline) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let config = NotifyConfig::default().with_poll_interval(Duration::from_secs(2));
        let mut watcher = RecommendedWatcher::new(
            move |event: notify::Result<Event>| {
                let _ = tx.send(event);
            },
            config,
        )?;
        let mode = if pipeline.config().documents.recursive() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&self.root, mode)?;

        println!("{} Watching {} for changes...", "👁".cyan(), self.root.display());
        println!(
            "  Debounce: {}s, Min interval: {}s",
            self.debounce_duration.as_secs(),
            self.min_reindex_interval.as_secs()
        );
        println!("Press Ctrl+C to stop\n");

        let mut pending = PendingChanges::default();
        let mut last_event_time: Option<Instant> = None;
        let mut last_reindex_time: Option<Instant> = None;

        loop {
            // Long timeout when idle
            let timeout = if pending.is_empty() {
                Duration::from_secs(60)
            } else {
                self.debounce_duration
            };

            tokio::select! {
                event = rx.recv() => match event {
                    Some(Ok(event)) => {
                        if pending.record(&event, pipeline.loader()) {
                            last_event_time = Some(Instant::now());
                        }
                    }
                    Some(Err(e)) => eprintln!("{} Watch error: {}", "✗".red(), e),
                    None => break,
                },
                _ = tokio::time::sleep(timeout) => {}
                _ = tokio::signal::ctrl_c() => {
                    println!("\n{} Stopped watching", "✓".green());
                    break;
                }
            }

            if pending.is_empty() {
                continue;
            }
            let quiet = last_event_time
                .map(|t| t.elapsed() >= self.debounce_duration)
                .unwrap_or(false);
            let can_reindex = last_reindex_time
                .map(|t| t.elapsed() >= self.min_reindex_interval)
                .unwrap_or(true);

            if quiet && can_reindex {
                // Taken before reindexing so events arriving meanwhile are kept
                let changes = pending.take();
                last_event_time = None;
                reindex(pipeline, &changes);
                last_reindex_time = Some(Instant::now());
            }
        }

        Ok(())
    }
}

fn reindex(pipeline: &Pipeline, changes: &PendingChanges) {
    let start = Instant::now();
    println!(
        "{} {} file(s) changed, reindexing...",
        "🔄".yellow(),
        changes.paths.len()
    );

    let result = if changes.removed {
        tracing::info!("Documents removed, rebuilding index");
        pipeline
            .reset_index()
            .map_err(anyhow::Error::from)
            .and_then(|_| ingest::ingest(pipeline, false))
    } else {
        ingest::ingest(pipeline, false).and_then(|report| {
            if report.collisions > 0 {
                tracing::info!("Indexed documents changed, rebuilding index");
                pipeline.reset_index()?;
                ingest::ingest(pipeline, false)
            } else {
                Ok(report)
            }
        })
    };

    match result {
        Ok(report) => println!(
            "{} Reindex complete in {:.1}s ({} new chunks)",
            "✓".green(),
            start.elapsed().as_secs_f64(),
            report.inserted
        ),
        Err(e) => eprintln!("{} Reindex failed: {}", "✗".red(), e),
    }
}

/// Run the watch command
pub fn run(pipeline: &Pipeline, debounce_secs: Option<u64>) -> Result<()> {
    let root = pipeline.loader().root().to_path_buf();
    std::fs::create_dir_all(&root)?;

    // Build initial index
    ingest::ingest(pipeline, true)?;

    let watcher = match debounce_secs {
        Some(secs) => Watcher::with_debounce(&root, secs),
        None => Watcher::new(&root),
    };
    watcher.watch(pipeline)
}
