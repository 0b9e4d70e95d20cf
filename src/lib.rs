//! chunkfeed
//!
//! Bounded-memory, bounded-concurrency ingestion of byte streams.
//!
//! `chunkfeed` reads a [`std::io::Read`] source into pooled buffers, aligns
//! each chunk on a record delimiter (newline by default) so records are not
//! split, and feeds the chunks to a callback on up to `workers` threads.
//! It is meant for multi-gigabyte inputs that do not fit in memory:
//!
//! - memory stays around `workers × (buffer_size + delimiter extension)`
//! - the read loop blocks while every worker is busy
//! - buffers are recycled through a per-run pool
//!
//! The crate intentionally:
//! - does NOT interpret chunk contents
//! - does NOT retry or collect callback failures
//! - does NOT persist or re-deliver chunks
//!
//! Cancellation is cooperative and observed between chunks. Whatever the
//! outcome, `ingest` returns only after every dispatched callback returned.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use chunkfeed::{ingest, Context, IngestConfig, IngestError, MB};
//!
//! fn main() -> Result<(), IngestError> {
//!     let file = File::open("events.jsonl")?;
//!     let config = IngestConfig::default()
//!         .with_process_fn(|_ctx, chunk| {
//!             for record in chunk.split(|&b| b == b'\n') {
//!                 let _ = record;
//!             }
//!         })
//!         .with_workers(8)
//!         .with_buffer_seed(8)
//!         .with_buffer_size(MB);
//!
//!     ingest(&config, Some(&Context::new()), Some(file))
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod chunk;
mod config;
mod context;
mod error;
mod ingest;

mod buffer; // internal, per-run pool
mod reader; // internal, delimiter alignment

//
// Public surface
//

pub use buffer::PoolStats;
pub use chunk::Chunk;
pub use config::{DEFAULT_DELIMITER, DEFAULT_WORKERS, GB, IngestConfig, KB, MB, ProcessFn};
pub use context::{CancelReason, Context};
pub use error::IngestError;
pub use ingest::{IngestReport, Ingestor, ingest};
