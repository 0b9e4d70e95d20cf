//! Error types for chunkfeed.

use thiserror::Error;

use crate::context::CancelReason;

/// Errors returned by an ingestion run.
///
/// The first four variants are configuration errors: they are detected before
/// the source is touched. The remaining two are runtime outcomes and are only
/// returned after every launched callback has finished.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No cancellation context was supplied.
    #[error("missing context")]
    MissingContext,

    /// No byte source was supplied.
    #[error("nil source reader")]
    NilSource,

    /// The configuration has no processing callback.
    #[error("missing process function")]
    MissingCallback,

    /// The configuration has a zero buffer size.
    #[error("missing buffer size")]
    MissingBufferSize,

    /// The source failed with something other than end-of-stream.
    #[error(transparent)]
    Source(#[from] std::io::Error),

    /// The context was cancelled or its deadline passed.
    #[error("ingestion cancelled: {0}")]
    Cancelled(#[from] CancelReason),
}

impl IngestError {
    /// Returns true for errors detected before ingestion started.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            IngestError::MissingContext
                | IngestError::NilSource
                | IngestError::MissingCallback
                | IngestError::MissingBufferSize
        )
    }

    /// Returns the cancellation reason, if this error is a cancellation.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            IngestError::Cancelled(reason) => Some(*reason),
            _ => None,
        }
    }
}
