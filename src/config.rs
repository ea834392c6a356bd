/// Rows at the start of a file during which new attributes may still become columns
pub const SAMPLE_ROWS: u64 = 100;

/// Attribute values longer than this (in characters) are left out of the output
pub const MAX_VALUE_LEN: usize = 255;

/// Number of files converted concurrently
pub const WORKER_THREADS: usize = 4;

/// Upper bound on waiting for the worker pool to drain, in minutes
pub const DRAIN_TIMEOUT_MINUTES: u64 = 1000;

/// Buffer size for source readers and output writers
pub const IO_BUFFER_SIZE: usize = 1024 * 1024;

/// Progress log interval (debug line every N rows)
pub const PROGRESS_INTERVAL: u64 = 100_000;
