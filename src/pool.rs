use crate::config::{DRAIN_TIMEOUT_MINUTES, WORKER_THREADS};
use crate::convert::{convert_file, ConversionTask, ConvertOptions};
use crate::stats::{ConversionStats, RunStats};
use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub threads: usize,
    /// Bound on the whole drain, not on any single file
    pub drain_timeout: Duration,
    pub show_progress: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            threads: WORKER_THREADS,
            drain_timeout: Duration::from_secs(DRAIN_TIMEOUT_MINUTES * 60),
            show_progress: false,
        }
    }
}

/// A file that failed to convert.
#[derive(Debug)]
pub struct FileFailure {
    pub source: PathBuf,
    pub error: anyhow::Error,
}

/// Outcome of a drained pool.
#[derive(Debug)]
pub struct RunSummary {
    pub stats: Arc<RunStats>,
    pub converted: Vec<(PathBuf, ConversionStats)>,
    pub failures: Vec<FileFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapses every failure into one error naming each failed file.
    pub fn into_result(self) -> Result<Arc<RunStats>> {
        if self.failures.is_empty() {
            return Ok(self.stats);
        }
        let total = self.converted.len() + self.failures.len();
        let details = self
            .failures
            .iter()
            .map(|f| format!("  {}: {:#}", f.source.display(), f.error))
            .collect::<Vec<_>>()
            .join("\n");
        Err(anyhow!(
            "{} of {} files failed to convert:\n{}",
            self.failures.len(),
            total,
            details
        ))
    }
}

/// Converts every task on a fixed-size pool, one job per file, and waits for
/// all of them. Per-file errors end up in the summary; only pool setup
/// failures and an exceeded drain timeout are returned as `Err`.
pub fn run_tasks(
    tasks: Vec<ConversionTask>,
    options: &ConvertOptions,
    pool_options: &PoolOptions,
) -> Result<RunSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_options.threads.max(1))
        .thread_name(|i| format!("stackdump-worker-{i}"))
        .panic_handler(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(panic = %message, "Conversion worker panicked");
        })
        .build()
        .context("Failed to build worker pool")?;

    let stats = Arc::new(RunStats::new());
    let expected: Vec<PathBuf> = tasks.iter().map(|t| t.source.clone()).collect();
    let (tx, rx) = mpsc::channel::<(PathBuf, Result<ConversionStats>)>();

    info!(
        files = tasks.len(),
        threads = pool_options.threads,
        "Starting conversions"
    );
    for task in tasks {
        let tx = tx.clone();
        let options = options.clone();
        let stats = Arc::clone(&stats);
        pool.spawn(move || {
            let result = convert_file(&task, &options);
            if let Ok(file_stats) = &result {
                stats.record(file_stats);
            }
            // the receiver only goes away once the drain gave up
            let _ = tx.send((task.source, result));
        });
    }
    drop(tx);

    let progress = if pool_options.show_progress {
        let pb = ProgressBar::new(expected.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} files {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let deadline = Instant::now() + pool_options.drain_timeout;
    let mut converted = Vec::new();
    let mut failures = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((source, Ok(file_stats))) => {
                progress.set_message(file_name(&source));
                converted.push((source, file_stats));
            }
            Ok((source, Err(error))) => {
                error!(source = %source.display(), error = %format_error(&error), "File conversion failed");
                stats.inc_failed();
                failures.push(FileFailure { source, error });
            }
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                progress.abandon();
                bail!(
                    "Conversions did not finish within {:?} ({} of {} files reported)",
                    pool_options.drain_timeout,
                    converted.len() + failures.len(),
                    expected.len()
                );
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    // jobs that panicked never reported back
    for source in expected {
        let reported = converted.iter().any(|(s, _)| *s == source)
            || failures.iter().any(|f| f.source == source);
        if !reported {
            stats.inc_failed();
            failures.push(FileFailure {
                error: anyhow!("Worker terminated without reporting a result"),
                source,
            });
        }
    }

    info!(
        converted = stats.converted(),
        failed = stats.failed(),
        rows = stats.rows(),
        "All conversions finished"
    );
    Ok(RunSummary {
        stats,
        converted,
        failures,
    })
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn format_error(error: &anyhow::Error) -> String {
    format!("{:#}", error)
}
