//! Operations: the unit of replication.
//!
//! Every successful local mutation yields exactly one [`Operation`]. The
//! host hands it to its broadcast collaborator; remote replicas merge it
//! with [`RichText::apply_remote`](crate::RichText::apply_remote).
//!
//! Operations are plain serde data. The binary envelope lives in the collab
//! crate; a textual JSON form is provided here for logs and fixtures.

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeName;
use crate::error::ReplicaError;
use crate::id::{CharId, ReplicaId};

/// What an operation does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    /// A new character `id` placed after `left`.
    Insert {
        id: CharId,
        left: CharId,
        ch: char,
        /// Attributes set on creation; their writes carry `id`.
        attributes: Vec<AttributeName>,
    },
    /// Tombstone `target`.
    Delete { target: CharId },
    /// LWW write of `name = value` on `target`, identified by `id`.
    SetAttribute {
        target: CharId,
        id: CharId,
        name: AttributeName,
        value: bool,
    },
}

/// A replicated edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub source: ReplicaId,
    pub kind: OpKind,
}

impl Operation {
    pub fn insert(
        source: ReplicaId,
        id: CharId,
        left: CharId,
        ch: char,
        attributes: Vec<AttributeName>,
    ) -> Self {
        Self {
            source,
            kind: OpKind::Insert {
                id,
                left,
                ch,
                attributes,
            },
        }
    }

    pub fn delete(source: ReplicaId, target: CharId) -> Self {
        Self {
            source,
            kind: OpKind::Delete { target },
        }
    }

    pub fn set_attribute(
        source: ReplicaId,
        target: CharId,
        id: CharId,
        name: AttributeName,
        value: bool,
    ) -> Self {
        Self {
            source,
            kind: OpKind::SetAttribute {
                target,
                id,
                name,
                value,
            },
        }
    }

    /// Character this operation creates or modifies.
    pub fn target(&self) -> CharId {
        match &self.kind {
            OpKind::Insert { id, .. } => *id,
            OpKind::Delete { target } => *target,
            OpKind::SetAttribute { target, .. } => *target,
        }
    }

    /// Character that must already be known before this operation applies.
    pub fn dependency(&self) -> CharId {
        match &self.kind {
            OpKind::Insert { left, .. } => *left,
            OpKind::Delete { target } => *target,
            OpKind::SetAttribute { target, .. } => *target,
        }
    }

    /// Identifier issued by the source replica's clock, if any.
    pub fn issued_id(&self) -> Option<CharId> {
        match &self.kind {
            OpKind::Insert { id, .. } => Some(*id),
            OpKind::SetAttribute { id, .. } => Some(*id),
            OpKind::Delete { .. } => None,
        }
    }

    /// Structural checks that do not depend on document state.
    pub fn validate(&self) -> Result<(), ReplicaError> {
        match &self.kind {
            OpKind::Insert { id, left, .. } => {
                if !id.is_assignable() {
                    return Err(ReplicaError::malformed(format!(
                        "insert uses reserved identifier {id}"
                    )));
                }
                if left.is_eof() {
                    return Err(ReplicaError::malformed("insert after EOF"));
                }
                if id.replica != self.source {
                    return Err(ReplicaError::malformed(format!(
                        "insert {id} not issued by source {}",
                        self.source
                    )));
                }
            }
            OpKind::Delete { target } => {
                if target.is_sentinel() {
                    return Err(ReplicaError::malformed("delete targets a sentinel"));
                }
            }
            OpKind::SetAttribute { target, id, .. } => {
                if target.is_sentinel() {
                    return Err(ReplicaError::malformed("attribute write targets a sentinel"));
                }
                if !id.is_assignable() {
                    return Err(ReplicaError::malformed(format!(
                        "attribute write uses reserved identifier {id}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Textual form.
    pub fn to_json(&self) -> Result<String, ReplicaError> {
        serde_json::to_string(self).map_err(|e| ReplicaError::Codec(e.to_string()))
    }

    pub fn from_json(s: &str) -> Result<Self, ReplicaError> {
        serde_json::from_str(s).map_err(|e| ReplicaError::Codec(e.to_string()))
    }
}
