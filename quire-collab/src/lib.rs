//! # quire-collab: sharing a quire document between peers
//!
//! Everything that crosses the wire, and the session facade hosts drive.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   Envelope (bincode)   ┌───────────────┐
//! │ EditorSession │ ◄────────────────────► │ EditorSession │
//! │ (peer A)      │                        │ (peer B)      │
//! └──────┬────────┘                        └──────┬────────┘
//!        │                                        │
//!        ▼                                        ▼
//!   RichText + LineList                     RichText + LineList
//!   RemoteCursorTracker                     RemoteCursorTracker
//!
//!                ┌────────────────┐
//!                │ BroadcastGroup │  in-process fan-out
//!                └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: `Envelope` wire format
//! - [`presence`]: presence messages and the remote cursor tracker
//! - [`broadcast`]: tokio fan-out between in-process peers
//! - [`session`]: `EditorSession`, the host-facing facade

pub mod broadcast;
pub mod presence;
pub mod protocol;
pub mod session;

pub use broadcast::{BroadcastGroup, BroadcastStats, PeerInfo, PeerReceiver};
pub use presence::{
    CursorColor, LocalPresence, PresenceConfig, PresenceMessage, PresenceState, RemoteCursor,
    RemoteCursorRender, RemoteCursorTracker, BOYNTON_PALETTE,
};
pub use protocol::{Envelope, MessageType, ProtocolError};
pub use session::{EditorSession, RemoteEvent, SessionConfig, SessionError};
