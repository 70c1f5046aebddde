//! # quire-core: replicated text document
//!
//! A character-addressable CRDT for rich text. Every character has a stable
//! [`CharId`]; deletions leave tombstones; remote operations merge in any
//! order and converge to the same document on every replica.
//!
//! ## Data flow
//!
//! ```text
//! local edit ──► RichText::insert/delete/set_attribute ──► Operation
//!                                                            │
//!                                             broadcast (host collaborator)
//!                                                            │
//!                                                            ▼
//!                         remote RichText::apply_remote ◄── Operation
//! ```
//!
//! ## Modules
//!
//! - [`id`]: `ReplicaId`, `CharId`, Lamport clock
//! - [`attributes`]: closed attribute schema, LWW registers
//! - [`op`]: the replicated `Operation`
//! - [`text`]: `RichText`, the replica itself

pub mod attributes;
pub mod error;
pub mod id;
pub mod op;
pub mod text;

pub use attributes::{AttributeName, Attributes, FontStyle, LwwAttribute};
pub use error::ReplicaError;
pub use id::{CharId, LamportClock, ReplicaId};
pub use op::{OpKind, Operation};
pub use text::{Boundary, Char, CharsBetween, MergeReport, ReplicaConfig, RichText};
