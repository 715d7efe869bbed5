//! Error types for the alignment core
//!
//! Rejected overlaps and refused merges are ordinary outcomes and never show
//! up here. Only shape violations and lookups of absent sources do.

use thiserror::Error;

use crate::chunk::SourceId;

/// Errors raised by chunk and block operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthError {
    /// Malformed arguments: size/text mismatch, bad slice bounds, unknown anchor source
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the call
        reason: String,
    },

    /// The block holds nothing from the requested source
    #[error("source {source_id} not found in block")]
    NotFound {
        /// The missing source id
        source_id: SourceId,
    },
}

impl SynthError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, SynthError>;
