//! Chunk types.
//!
//! - [`Chunk`] - A pooled buffer of source bytes handed to the callback

mod data;

pub use data::Chunk;
