//! Concurrent ingestion: read loop, admission gate, workers, completion.
//!
//! - [`Ingestor`] - Runs ingestions for one configuration
//! - [`ingest`] - One-shot entry point
//! - [`IngestReport`] - Per-run counters

mod coordinator;
mod dispatcher;
mod engine;
mod gate;

pub use engine::{IngestReport, Ingestor, ingest};
