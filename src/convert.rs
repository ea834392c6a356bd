//! Single-file conversion driver.
//!
//! A conversion moves through `Idle -> Streaming -> Finalizing -> Done`, or
//! to `Errored` from any of them. Whatever happens after the sink is open, it
//! is closed, and once the hook has been started its `on_end` runs exactly
//! once. The header is only written when every row made it to the sink.
//!
//! With an inferred mapping, rows inside the sampling window are held back
//! until the mapping freezes and then written padded to the final width, so
//! every data line has as many fields as the header. At most `sample_rows`
//! rows are ever held.

use crate::config::{MAX_VALUE_LEN, PROGRESS_INTERVAL, SAMPLE_ROWS};
use crate::extract::{extract, RecordBuffer};
use crate::hook::{HookKind, RowHook};
use crate::models::Row;
use crate::parser::RowReader;
use crate::schema::{ColumnMapping, ColumnSpec, HeaderStyle};
use crate::sink::{self, CsvSink};
use crate::stats::ConversionStats;
use anyhow::{bail, Context, Result};
use std::iter;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-run knobs shared by every file.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub sample_rows: u64,
    pub max_value_len: usize,
    pub header_style: HeaderStyle,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            sample_rows: SAMPLE_ROWS,
            max_value_len: MAX_VALUE_LEN,
            header_style: HeaderStyle::Plain,
        }
    }
}

/// One source file and how to convert it.
#[derive(Debug, Clone)]
pub struct ConversionTask {
    pub source: PathBuf,
    /// Where outputs go; the source's directory when unset
    pub output_dir: Option<PathBuf>,
    /// Fixed columns; inferred from the rows when unset
    pub columns: Option<Vec<ColumnSpec>>,
    pub hook: HookKind,
}

impl ConversionTask {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_dir: None,
            columns: None,
            hook: HookKind::None,
        }
    }

    pub fn with_columns(mut self, columns: Vec<ColumnSpec>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_hook(mut self, hook: HookKind) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    /// Output stem: the file name up to its first `.`, placed in the output
    /// directory. `dump/Posts.xml.gz` becomes `dump/Posts`.
    pub fn base(&self) -> Result<PathBuf> {
        let file_name = self
            .source
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid dump file name: {}", self.source.display()))?;
        let stem = file_name.split('.').next().unwrap_or(file_name);
        if stem.is_empty() {
            bail!("Dump file name has no stem: {}", self.source.display());
        }

        let dir = match &self.output_dir {
            Some(dir) => dir.clone(),
            None => self
                .source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        Ok(dir.join(stem))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionState {
    Idle,
    Streaming,
    Finalizing,
    Done,
    Errored,
}

/// Converts one dump file: `<base>.csv.gz`, `<base>_header.csv`, plus whatever
/// the task's hook writes.
pub fn convert_file(task: &ConversionTask, options: &ConvertOptions) -> Result<ConversionStats> {
    let start = Instant::now();
    let base = task.base()?;
    info!(source = %task.source.display(), "Processing dump");

    let mut converter = Converter::new(task.columns.clone(), task.hook, options.clone())?;
    let rows = RowReader::open(&task.source)?;
    let result = converter
        .run(rows, &base)
        .with_context(|| format!("Conversion failed: {}", task.source.display()));

    if let Ok(stats) = &result {
        info!(
            source = %task.source.display(),
            rows = stats.rows,
            columns = stats.columns,
            edges = stats.edges,
            duration_secs = start.elapsed().as_secs_f64(),
            "Done processing dump"
        );
    }
    result
}

pub struct Converter {
    state: ConversionState,
    mapping: ColumnMapping,
    buffer: RecordBuffer,
    pending: Vec<RecordBuffer>,
    hook: RowHook,
    options: ConvertOptions,
    stats: ConversionStats,
    rows_seen: u64,
}

impl Converter {
    pub fn new(
        columns: Option<Vec<ColumnSpec>>,
        hook: HookKind,
        options: ConvertOptions,
    ) -> Result<Self> {
        let mapping = ColumnMapping::new(columns, options.sample_rows)?;
        Ok(Self {
            state: ConversionState::Idle,
            buffer: RecordBuffer::with_len(mapping.len()),
            mapping,
            pending: Vec::new(),
            hook: hook.build(),
            options,
            stats: ConversionStats::default(),
            rows_seen: 0,
        })
    }

    pub fn state(&self) -> ConversionState {
        self.state
    }

    pub fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    /// Drives `rows` through extraction, the hook and the sink for `base`.
    /// A converter runs once.
    pub fn run<I>(&mut self, rows: I, base: &Path) -> Result<ConversionStats>
    where
        I: IntoIterator<Item = Result<Row>>,
    {
        if self.state != ConversionState::Idle {
            bail!("Converter already ran (state {:?})", self.state);
        }

        let mut sink = match CsvSink::create(base) {
            Ok(sink) => sink,
            Err(e) => {
                self.state = ConversionState::Errored;
                return Err(e);
            }
        };
        if let Err(e) = self.hook.on_start(base) {
            return Err(self.abort(Some(sink), e));
        }
        self.transition(ConversionState::Streaming);

        if let Err(e) = self.stream(rows, &mut sink) {
            return Err(self.abort(Some(sink), e));
        }
        self.transition(ConversionState::Finalizing);

        if let Err(e) = self.finalize(sink, base) {
            return Err(self.abort(None, e));
        }
        if let Err(e) = self.hook.on_end(true) {
            self.state = ConversionState::Errored;
            return Err(e);
        }
        self.transition(ConversionState::Done);

        self.stats.columns = self.mapping.len();
        self.stats.edges = self.hook.edges_written();
        Ok(self.stats.clone())
    }

    fn transition(&mut self, next: ConversionState) {
        debug!(from = ?self.state, to = ?next, "Conversion state");
        self.state = next;
    }

    fn stream<I>(&mut self, rows: I, sink: &mut CsvSink) -> Result<()>
    where
        I: IntoIterator<Item = Result<Row>>,
    {
        for row in rows {
            let row = row?;
            let row_index = self.rows_seen;
            self.rows_seen += 1;

            if self.mapping.observe(row.names(), row_index) {
                self.buffer.resize(self.mapping.len());
            }
            let outcome = extract(
                &row,
                &self.mapping,
                &mut self.buffer,
                self.options.max_value_len,
            );
            self.stats.oversized_values += outcome.oversized;
            self.stats.unmapped_values += outcome.unmapped;

            self.hook.on_row(&row)?;

            if self.mapping.is_frozen(row_index) {
                self.flush_pending(sink)?;
                sink.write_row(self.buffer.fields())?;
            } else {
                self.pending.push(self.buffer.clone());
            }

            if self.rows_seen % PROGRESS_INTERVAL == 0 {
                debug!(rows = self.rows_seen, "Conversion progress");
            }
        }
        self.flush_pending(sink)
    }

    /// Writes held-back sampling rows, padded to the current width.
    fn flush_pending(&mut self, sink: &mut CsvSink) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let width = self.mapping.len();
        debug!(rows = self.pending.len(), columns = width, "Sampling window closed");
        for record in self.pending.drain(..) {
            let gap = width.saturating_sub(record.len());
            sink.write_row(record.fields().chain(iter::repeat("").take(gap)))?;
        }
        Ok(())
    }

    fn finalize(&mut self, sink: CsvSink, base: &Path) -> Result<()> {
        self.stats.rows = sink.close()?;
        let header = self.mapping.header(self.options.header_style);
        let path = sink::write_header(base, &header)?;
        debug!(path = %path.display(), columns = header.len(), "Header written");
        Ok(())
    }

    fn abort(&mut self, sink: Option<CsvSink>, error: anyhow::Error) -> anyhow::Error {
        self.state = ConversionState::Errored;
        self.pending.clear();
        if let Some(sink) = sink {
            if let Err(e) = sink.close() {
                warn!(error = %e, "Failed to close output after error");
            }
        }
        if let Err(e) = self.hook.on_end(false) {
            warn!(error = %e, "Row hook failed to clean up after error");
        }
        error
    }
}
