//! Configuration for ingestion runs.
//!
//! - [`IngestConfig`] - Callback, concurrency, buffer sizing, delimiter policy
//! - [`KB`], [`MB`], [`GB`] - 1024-based size constants for `buffer_size`
//!
//! # Example
//!
//! ```
//! use chunkfeed::{IngestConfig, MB};
//!
//! let config = IngestConfig::default()
//!     .with_process_fn(|_ctx, chunk| {
//!         let _lines = chunk.iter().filter(|&&b| b == b'\n').count();
//!     })
//!     .with_workers(8)
//!     .with_buffer_seed(8)
//!     .with_buffer_size(MB);
//!
//! config.validate()?;
//! # Ok::<(), chunkfeed::IngestError>(())
//! ```

use std::fmt;
use std::sync::Arc;

use crate::chunk::Chunk;
use crate::context::Context;
use crate::error::IngestError;

/// One kibibyte.
pub const KB: usize = 1024;

/// One mebibyte.
pub const MB: usize = 1024 * KB;

/// One gibibyte.
pub const GB: usize = 1024 * MB;

/// Default record delimiter.
pub const DEFAULT_DELIMITER: u8 = b'\n';

/// Default number of concurrent callback invocations.
pub const DEFAULT_WORKERS: usize = 1;

/// The per-chunk processing callback.
///
/// It receives the run's context and exclusive access to the chunk for the
/// duration of the call. The buffer goes back to the pool when it returns.
pub type ProcessFn = Arc<dyn Fn(&Context, &mut Chunk) + Send + Sync>;

/// Configuration for an ingestion run.
///
/// `buffer_size` and the process function are required. Everything else has a
/// default:
///
/// | field          | default             |
/// |----------------|---------------------|
/// | `workers`      | [`DEFAULT_WORKERS`] |
/// | `buffer_seed`  | 0                   |
/// | `delimiter`    | [`DEFAULT_DELIMITER`] |
/// | `no_delimiter` | false               |
///
/// Setters do not validate. Missing required fields are reported by
/// [`IngestConfig::validate`] or when ingestion starts.
#[derive(Clone, Default)]
pub struct IngestConfig {
    process_fn: Option<ProcessFn>,

    /// Zero means unset.
    workers: usize,

    buffer_seed: usize,

    /// Zero means unset.
    buffer_size: usize,

    delimiter: Option<u8>,

    no_delimiter: bool,
}

/// A validated configuration with defaults applied.
#[derive(Clone)]
pub(crate) struct Settings {
    pub process_fn: ProcessFn,
    pub workers: usize,
    pub buffer_seed: usize,
    pub buffer_size: usize,
    pub delimiter: u8,
    pub no_delimiter: bool,
}

impl IngestConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the processing callback.
    pub fn with_process_fn<F>(mut self, process_fn: F) -> Self
    where
        F: Fn(&Context, &mut Chunk) + Send + Sync + 'static,
    {
        self.process_fn = Some(Arc::new(process_fn));
        self
    }

    /// Sets an already shared processing callback.
    pub fn with_shared_process_fn(mut self, process_fn: ProcessFn) -> Self {
        self.process_fn = Some(process_fn);
        self
    }

    /// Sets the maximum number of concurrent callback invocations.
    ///
    /// Zero restores the default.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets how many buffers are allocated before the first read.
    pub fn with_buffer_seed(mut self, seed: usize) -> Self {
        self.buffer_seed = seed;
        self
    }

    /// Sets the length of each pooled buffer, i.e. the bounded read size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the record delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Disables delimiter alignment: every chunk is a plain bounded read.
    pub fn with_no_delimiter(mut self, no_delimiter: bool) -> Self {
        self.no_delimiter = no_delimiter;
        self
    }

    /// Returns true if a processing callback is set.
    pub fn has_process_fn(&self) -> bool {
        self.process_fn.is_some()
    }

    /// Returns the effective worker count.
    pub fn workers(&self) -> usize {
        if self.workers == 0 {
            DEFAULT_WORKERS
        } else {
            self.workers
        }
    }

    /// Returns the buffer seed.
    pub fn buffer_seed(&self) -> usize {
        self.buffer_seed
    }

    /// Returns the buffer size (zero if unset).
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns the effective delimiter.
    pub fn delimiter(&self) -> u8 {
        self.delimiter.unwrap_or(DEFAULT_DELIMITER)
    }

    /// Returns true if delimiter alignment is disabled.
    pub fn no_delimiter(&self) -> bool {
        self.no_delimiter
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`IngestError::MissingCallback`] if no process function is set
    /// - [`IngestError::MissingBufferSize`] if the buffer size is zero
    pub fn validate(&self) -> Result<(), IngestError> {
        self.resolve().map(|_| ())
    }

    pub(crate) fn resolve(&self) -> Result<Settings, IngestError> {
        let process_fn = self
            .process_fn
            .clone()
            .ok_or(IngestError::MissingCallback)?;

        if self.buffer_size == 0 {
            return Err(IngestError::MissingBufferSize);
        }

        Ok(Settings {
            process_fn,
            workers: self.workers(),
            buffer_seed: self.buffer_seed,
            buffer_size: self.buffer_size,
            delimiter: self.delimiter(),
            no_delimiter: self.no_delimiter,
        })
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("process_fn", &self.process_fn.as_ref().map(|_| "<fn>"))
            .field("workers", &self.workers)
            .field("buffer_seed", &self.buffer_seed)
            .field("buffer_size", &self.buffer_size)
            .field("delimiter", &self.delimiter)
            .field("no_delimiter", &self.no_delimiter)
            .finish()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("workers", &self.workers)
            .field("buffer_seed", &self.buffer_seed)
            .field("buffer_size", &self.buffer_size)
            .field("delimiter", &self.delimiter)
            .field("no_delimiter", &self.no_delimiter)
            .finish_non_exhaustive()
    }
}
