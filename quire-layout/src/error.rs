use quire_core::{CharId, ReplicaError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    /// The position is not in the current layout. Recompute and retry.
    #[error("Position not found in layout: {0}")]
    Unresolved(CharId),

    /// Lines and document disagree in a way a reflow cannot explain.
    #[error("Layout inconsistency: {0}")]
    Inconsistent(String),
}

impl LayoutError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unresolved(_))
    }
}

impl From<ReplicaError> for LayoutError {
    fn from(err: ReplicaError) -> Self {
        match err {
            ReplicaError::UnresolvedPosition(id) => Self::Unresolved(id),
            ReplicaError::OutOfBounds { from, .. } => Self::Unresolved(from),
            other => Self::Inconsistent(other.to_string()),
        }
    }
}
