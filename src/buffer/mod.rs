//! Buffer management for ingestion runs.
//!
//! This module provides the per-run buffer pool that recycles chunk buffers
//! between the reader and the workers. Only [`PoolStats`] is public.

mod pool;

pub(crate) use pool::BufferPool;
pub use pool::PoolStats;
