//! Presence protocol for remote carets and selections.
//!
//! ## Architecture
//!
//! ```text
//! Local caret move
//!       │
//!       ▼
//! LocalPresence::update()  ──► PresenceMessage::Update { seq, … }
//!                                       │
//!                                       ▼   (broadcast)
//!                          RemoteCursorTracker::handle()
//!                                       │
//!                                       ▼
//!                          RemoteCursorTracker::render(doc, lines, …)
//!                                       │
//!                                       ▼
//!                          Vec<RemoteCursorRender>  (host draws)
//! ```
//!
//! Positions in presence messages are symbolic [`CharId`]s, so document
//! operations never touch the tracker. Rendering resolves them against the
//! current document and layout, and a position that no longer resolves
//! (deleted concurrently, or not merged yet) simply does not render.

use quire_core::{CharId, ReplicaId, RichText};
use quire_layout::{
    caret_position, selection_rects, CaretPosition, FontMetrics, LayoutConfig, LayoutError,
    LineList, LineSelection, Selection,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::protocol::{decode_payload, encode_payload, ProtocolError};

// ───────────────────────────────────────────────────────────────────
// Core types
// ───────────────────────────────────────────────────────────────────

/// Opaque RGB colour for a peer's caret and selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl CursorColor {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Normalized RGBA for GPU upload.
    pub fn to_array(&self) -> [f32; 4] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
            1.0,
        ]
    }
}

impl Default for CursorColor {
    fn default() -> Self {
        Self::rgb(42, 75, 215)
    }
}

impl fmt::Display for CursorColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// A softened variant of the 11 Boynton colours.
pub const BOYNTON_PALETTE: [CursorColor; 11] = [
    CursorColor::rgb(29, 105, 20),   // green
    CursorColor::rgb(129, 38, 192),  // purple
    CursorColor::rgb(42, 75, 215),   // blue
    CursorColor::rgb(41, 208, 208),  // cyan
    CursorColor::rgb(173, 35, 35),   // red
    CursorColor::rgb(255, 146, 51),  // orange
    CursorColor::rgb(129, 197, 122), // light green
    CursorColor::rgb(157, 175, 255), // light blue
    CursorColor::rgb(255, 205, 243), // pink
    CursorColor::rgb(255, 238, 51),  // yellow
    CursorColor::rgb(129, 74, 25),   // brown
];

/// Presence behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// How long a peer's name stays revealed.
    pub reveal_duration: Duration,
    /// A peer that moves after being still this long is revealed again.
    pub idle_reveal_after: Duration,
    /// Colours assigned to peers that do not pick one.
    pub color_space: Vec<CursorColor>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            reveal_duration: Duration::from_secs(2),
            idle_reveal_after: Duration::from_secs(10),
            color_space: BOYNTON_PALETTE.to_vec(),
        }
    }
}

impl PresenceConfig {
    /// Stable colour for `peer_id` from the configured palette.
    pub fn color_for(&self, peer_id: ReplicaId) -> CursorColor {
        if self.color_space.is_empty() {
            return CursorColor::default();
        }
        let slot = peer_id.as_uuid().as_u128() % self.color_space.len() as u128;
        self.color_space[slot as usize]
    }
}

// ───────────────────────────────────────────────────────────────────
// Wire messages
// ───────────────────────────────────────────────────────────────────

/// Caret and selection of one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    pub peer_id: ReplicaId,
    /// Monotonic per peer; older updates are discarded.
    pub seq: u64,
    /// Character left of the caret, `None` before the peer placed one.
    pub position: Option<CharId>,
    pub position_eol_start: bool,
    /// `Some` while a selection is active.
    pub selection: Option<Selection>,
    pub color: Option<CursorColor>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PresenceMessage {
    Update(PresenceState),
    /// Clean disconnect.
    Leave { peer_id: ReplicaId },
}

impl PresenceMessage {
    pub fn peer_id(&self) -> ReplicaId {
        match self {
            PresenceMessage::Update(state) => state.peer_id,
            PresenceMessage::Leave { peer_id } => *peer_id,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            PresenceMessage::Update(state) => state.seq,
            PresenceMessage::Leave { .. } => 0,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_payload(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode_payload(bytes)
    }
}

/// Builds the local peer's outgoing presence messages.
#[derive(Debug, Clone)]
pub struct LocalPresence {
    peer_id: ReplicaId,
    name: Option<String>,
    color: Option<CursorColor>,
    seq: u64,
}

impl LocalPresence {
    pub fn new(peer_id: ReplicaId, name: Option<String>) -> Self {
        Self {
            peer_id,
            name,
            color: None,
            seq: 0,
        }
    }

    pub fn with_color(mut self, color: CursorColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn peer_id(&self) -> ReplicaId {
        self.peer_id
    }

    /// Announce the caret at `position` and the current selection.
    pub fn update(
        &mut self,
        position: CharId,
        position_eol_start: bool,
        selection: Option<Selection>,
    ) -> PresenceMessage {
        self.seq += 1;
        PresenceMessage::Update(PresenceState {
            peer_id: self.peer_id,
            seq: self.seq,
            position: Some(position),
            position_eol_start,
            selection,
            color: self.color,
            name: self.name.clone(),
        })
    }

    pub fn leave(&self) -> PresenceMessage {
        PresenceMessage::Leave {
            peer_id: self.peer_id,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Remote cursor tracking
// ───────────────────────────────────────────────────────────────────

/// A remote peer as tracked locally.
#[derive(Debug, Clone)]
pub struct RemoteCursor {
    pub peer_id: ReplicaId,
    pub name: String,
    pub color: CursorColor,
    pub state: PresenceState,
    last_moved: Instant,
    reveal_until: Option<Instant>,
}

impl RemoteCursor {
    /// Whether the peer's name should be shown next to its caret at `now`.
    pub fn reveal_name(&self, now: Instant) -> bool {
        self.reveal_until.is_some_and(|until| now < until)
    }

    fn moved_from(&self, next: &PresenceState) -> bool {
        self.state.position != next.position
            || self.state.position_eol_start != next.position_eol_start
            || self.state.selection != next.selection
    }
}

/// Resolved geometry of one remote peer, ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursorRender {
    pub peer_id: ReplicaId,
    pub name: String,
    pub color: CursorColor,
    pub reveal_name: bool,
    pub caret: Option<CaretPosition>,
    pub selection: Vec<LineSelection>,
}

/// Remote carets and selections of one document, keyed by peer.
pub struct RemoteCursorTracker {
    local_peer: ReplicaId,
    config: PresenceConfig,
    cursors: HashMap<ReplicaId, RemoteCursor>,
}

impl RemoteCursorTracker {
    pub fn new(local_peer: ReplicaId, config: PresenceConfig) -> Self {
        Self {
            local_peer,
            config,
            cursors: HashMap::new(),
        }
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    /// Apply an incoming presence message. Returns whether anything changed.
    pub fn handle(&mut self, msg: &PresenceMessage, now: Instant) -> bool {
        if msg.peer_id() == self.local_peer {
            return false;
        }
        match msg {
            PresenceMessage::Update(state) => self.upsert(state, now),
            PresenceMessage::Leave { peer_id } => self.remove_peer(*peer_id),
        }
    }

    fn upsert(&mut self, state: &PresenceState, now: Instant) -> bool {
        let Some(cursor) = self.cursors.get_mut(&state.peer_id) else {
            let color = state
                .color
                .unwrap_or_else(|| self.config.color_for(state.peer_id));
            let name = state
                .name
                .clone()
                .unwrap_or_else(|| format!("Peer {}", state.peer_id));
            log::debug!("Tracking remote cursor of {} ({name})", state.peer_id);
            self.cursors.insert(
                state.peer_id,
                RemoteCursor {
                    peer_id: state.peer_id,
                    name,
                    color,
                    state: state.clone(),
                    last_moved: now,
                    reveal_until: Some(now + self.config.reveal_duration),
                },
            );
            return true;
        };

        if state.seq <= cursor.state.seq {
            log::debug!(
                "Stale presence from {}: seq {} <= {}",
                state.peer_id,
                state.seq,
                cursor.state.seq
            );
            return false;
        }

        if cursor.moved_from(state) {
            if now.saturating_duration_since(cursor.last_moved) > self.config.idle_reveal_after {
                cursor.reveal_until = Some(now + self.config.reveal_duration);
            }
            cursor.last_moved = now;
        }
        if let Some(name) = &state.name {
            cursor.name.clone_from(name);
        }
        if let Some(color) = state.color {
            cursor.color = color;
        }
        cursor.state = state.clone();
        true
    }

    /// Forget a peer (leave message or transport disconnect).
    pub fn remove_peer(&mut self, peer_id: ReplicaId) -> bool {
        let removed = self.cursors.remove(&peer_id).is_some();
        if removed {
            log::debug!("Remote cursor of {peer_id} removed");
        }
        removed
    }

    /// Clear reveal flags that ran out. Returns the affected peers.
    pub fn expire_reveals(&mut self, now: Instant) -> Vec<ReplicaId> {
        let mut expired = Vec::new();
        for cursor in self.cursors.values_mut() {
            if cursor.reveal_until.is_some_and(|until| now >= until) {
                cursor.reveal_until = None;
                expired.push(cursor.peer_id);
            }
        }
        expired
    }

    pub fn get(&self, peer_id: ReplicaId) -> Option<&RemoteCursor> {
        self.cursors.get(&peer_id)
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteCursor> + '_ {
        self.cursors.values()
    }

    /// Resolve every remote caret and selection against `doc` and `lines`.
    ///
    /// Positions that do not resolve are left out for this frame. Only a
    /// layout inconsistency is returned as an error.
    pub fn render<M: FontMetrics + ?Sized>(
        &self,
        doc: &RichText,
        lines: &LineList,
        config: &LayoutConfig,
        metrics: &M,
        now: Instant,
    ) -> Result<Vec<RemoteCursorRender>, LayoutError> {
        let mut out = Vec::with_capacity(self.cursors.len());
        for cursor in self.cursors.values() {
            let caret = match cursor.state.position {
                Some(position) => soft(
                    cursor.peer_id,
                    caret_position(
                        doc,
                        lines,
                        position,
                        cursor.state.position_eol_start,
                        config,
                        metrics,
                    ),
                )?,
                None => None,
            };
            let selection = match &cursor.state.selection {
                Some(selection) => soft(
                    cursor.peer_id,
                    selection_rects(doc, lines, selection, config, metrics),
                )?
                .unwrap_or_default(),
                None => Vec::new(),
            };
            if caret.is_none() && selection.is_empty() {
                continue;
            }
            out.push(RemoteCursorRender {
                peer_id: cursor.peer_id,
                name: cursor.name.clone(),
                color: cursor.color,
                reveal_name: cursor.reveal_name(now),
                caret,
                selection,
            });
        }
        out.sort_by_key(|r| r.peer_id);
        Ok(out)
    }
}

/// Demote transient resolution failures to `None`.
fn soft<T>(peer_id: ReplicaId, result: Result<T, LayoutError>) -> Result<Option<T>, LayoutError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_transient() => {
            log::debug!("Suppressing remote cursor of {peer_id} this frame: {e}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
