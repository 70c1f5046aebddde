//! Binary envelope for everything peers exchange about one document.
//!
//! Wire format (bincode-encoded, standard config):
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────┬──────────┐
//! │ msg_type │ peer_id   │ doc_id   │ clock    │ payload  │
//! │ 1 byte   │ 16 bytes  │ 16 bytes │ varint   │ variable │
//! └──────────┴───────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! `clock` is the Lamport clock of the identifier an operation issues (0
//! for deletes) or the sequence number of a presence update.

use quire_core::{Operation, ReplicaId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::presence::PresenceMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// One replicated edit.
    Operation = 1,
    /// Caret and selection of a peer.
    Presence = 2,
    /// The peer disconnected.
    PeerLeft = 3,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Expected a {expected:?} message, got {found:?}")]
    InvalidMessageType {
        expected: MessageType,
        found: MessageType,
    },
}

pub(crate) fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::Serialization(e.to_string()))
}

pub(crate) fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    Ok(value)
}

/// Top-level message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub msg_type: MessageType,
    pub peer_id: ReplicaId,
    pub doc_id: Uuid,
    pub clock: u64,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn operation(doc_id: Uuid, op: &Operation) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::Operation,
            peer_id: op.source,
            doc_id,
            clock: op.issued_id().map_or(0, |id| id.clock),
            payload: encode_payload(op)?,
        })
    }

    pub fn presence(doc_id: Uuid, msg: &PresenceMessage) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::Presence,
            peer_id: msg.peer_id(),
            doc_id,
            clock: msg.seq(),
            payload: encode_payload(msg)?,
        })
    }

    pub fn peer_left(peer_id: ReplicaId, doc_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::PeerLeft,
            peer_id,
            doc_id,
            clock: 0,
            payload: Vec::new(),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_payload(self)
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode_payload(bytes)
    }

    fn expect(&self, expected: MessageType) -> Result<(), ProtocolError> {
        if self.msg_type == expected {
            Ok(())
        } else {
            Err(ProtocolError::InvalidMessageType {
                expected,
                found: self.msg_type,
            })
        }
    }

    /// Parse an operation payload.
    pub fn to_operation(&self) -> Result<Operation, ProtocolError> {
        self.expect(MessageType::Operation)?;
        decode_payload(&self.payload)
    }

    /// Parse a presence payload.
    pub fn to_presence(&self) -> Result<PresenceMessage, ProtocolError> {
        self.expect(MessageType::Presence)?;
        decode_payload(&self.payload)
    }
}
