use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of converting one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub rows: u64,
    pub columns: usize,
    pub oversized_values: u64,
    pub unmapped_values: u64,
    pub edges: u64,
}

/// Totals across every file of a run, updated from worker threads
#[derive(Debug, Default)]
pub struct RunStats {
    pub files_converted: AtomicU64,
    pub files_failed: AtomicU64,
    pub rows_written: AtomicU64,
    pub oversized_values: AtomicU64,
    pub unmapped_values: AtomicU64,
    pub edges_written: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a successfully converted file.
    pub fn record(&self, file: &ConversionStats) {
        self.files_converted.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(file.rows, Ordering::Relaxed);
        self.oversized_values
            .fetch_add(file.oversized_values, Ordering::Relaxed);
        self.unmapped_values
            .fetch_add(file.unmapped_values, Ordering::Relaxed);
        self.edges_written.fetch_add(file.edges, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn converted(&self) -> u64 {
        self.files_converted.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.files_failed.load(Ordering::Relaxed)
    }

    pub fn rows(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    pub fn oversized(&self) -> u64 {
        self.oversized_values.load(Ordering::Relaxed)
    }

    pub fn unmapped(&self) -> u64 {
        self.unmapped_values.load(Ordering::Relaxed)
    }

    pub fn edges(&self) -> u64 {
        self.edges_written.load(Ordering::Relaxed)
    }
}
