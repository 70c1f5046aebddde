use thiserror::Error;

use crate::id::CharId;

/// Errors raised by the replicated text structure.
///
/// Only `MalformedOperation` and `UnresolvedPosition` occur during normal
/// concurrent operation; hosts treat both as transient (drop, retry or
/// suppress) and never as fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplicaError {
    #[error("Malformed operation: {reason}")]
    MalformedOperation { reason: String },

    #[error("Unresolved position: {0}")]
    UnresolvedPosition(CharId),

    #[error("Relative position out of bounds: {offset} from {from}")]
    OutOfBounds { from: CharId, offset: isize },

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Codec error: {0}")]
    Codec(String),
}

impl ReplicaError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedOperation {
            reason: reason.into(),
        }
    }

    /// Whether the caller should recompute or suppress rather than report.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedPosition(_) | Self::MalformedOperation { .. }
        )
    }
}
