//! One editor's view of a shared document.
//!
//! `EditorSession` owns the replica, its current lines and the remote
//! cursors, and speaks [`Envelope`]s to whatever transport the host uses:
//!
//! ```text
//!   host input ──► on_local_*() ──► Envelope ──► transport
//!   transport  ──► on_remote()  ──► RichText / RemoteCursorTracker ──► reflow
//!   host frame ──► caret(), selection_rects(), remote_cursors()
//! ```
//!
//! Transient failures (a position that does not resolve this frame, a
//! malformed remote op) are logged and absorbed. A layout that no longer
//! covers the document is a bug and surfaces as [`SessionError::Fatal`];
//! the merged document is left intact so the host can offer a reload.

use quire_core::{
    AttributeName, CharId, MergeReport, Operation, ReplicaConfig, ReplicaError, ReplicaId,
    RichText,
};
use quire_layout::{
    caret_position, flow, selection_rects, CaretPosition, FontMetrics, LayoutConfig, LayoutError,
    LineList, LineSelection, PositionHit, Selection,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

use crate::presence::{LocalPresence, PresenceConfig, RemoteCursorRender, RemoteCursorTracker};
use crate::protocol::{Envelope, MessageType, ProtocolError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Internal invariant violated. The host should show an error and
    /// offer a reload.
    #[error("Fatal editor error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Replica(#[from] ReplicaError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Everything a session is configured with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub replica: ReplicaConfig,
    pub layout: LayoutConfig,
    pub presence: PresenceConfig,
}

/// What an incoming envelope did.
#[derive(Debug)]
pub enum RemoteEvent {
    Merged(MergeReport),
    /// The operation was malformed and dropped.
    Rejected(ReplicaError),
    Presence { changed: bool },
    PeerLeft { known: bool },
    /// Own echo or another document.
    Ignored,
}

pub struct EditorSession<M> {
    doc_id: Uuid,
    doc: RichText,
    layout: LayoutConfig,
    metrics: M,
    lines: LineList,
    cursors: RemoteCursorTracker,
    presence: LocalPresence,
}

impl<M: FontMetrics> EditorSession<M> {
    pub fn new(
        replica: ReplicaId,
        doc_id: Uuid,
        name: Option<String>,
        config: SessionConfig,
        metrics: M,
    ) -> Self {
        Self {
            doc_id,
            doc: RichText::with_config(replica, config.replica),
            layout: config.layout,
            metrics,
            lines: LineList::new(),
            cursors: RemoteCursorTracker::new(replica, config.presence),
            presence: LocalPresence::new(replica, name),
        }
    }

    pub fn replica(&self) -> ReplicaId {
        self.doc.replica()
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    pub fn doc(&self) -> &RichText {
        &self.doc
    }

    pub fn lines(&self) -> &LineList {
        &self.lines
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn metrics(&self) -> &M {
        &self.metrics
    }

    pub fn cursors(&self) -> &RemoteCursorTracker {
        &self.cursors
    }

    // ---------------------------------------------------------------
    // Local edits
    // ---------------------------------------------------------------

    pub fn on_local_insert(
        &mut self,
        after: CharId,
        ch: char,
        attributes: &[AttributeName],
    ) -> Result<Envelope, SessionError> {
        let op = self.doc.insert(after, ch, attributes)?;
        self.after_local_one(&op)
    }

    pub fn on_local_insert_str(
        &mut self,
        after: CharId,
        text: &str,
        attributes: &[AttributeName],
    ) -> Result<Vec<Envelope>, SessionError> {
        let ops = self.doc.insert_str(after, text, attributes)?;
        self.after_local(&ops)
    }

    pub fn on_local_delete(&mut self, position: CharId) -> Result<Envelope, SessionError> {
        let op = self.doc.delete(position)?;
        self.after_local_one(&op)
    }

    /// Delete the selected characters.
    pub fn on_local_delete_selection(
        &mut self,
        selection: &Selection,
    ) -> Result<Vec<Envelope>, SessionError> {
        let ops = self.doc.delete_range(selection.left, selection.right)?;
        self.after_local(&ops)
    }

    pub fn on_local_set_attribute(
        &mut self,
        position: CharId,
        name: AttributeName,
        value: bool,
    ) -> Result<Envelope, SessionError> {
        let op = self.doc.set_attribute(position, name, value)?;
        self.after_local_one(&op)
    }

    fn after_local_one(&mut self, op: &Operation) -> Result<Envelope, SessionError> {
        self.reflow()?;
        Ok(Envelope::operation(self.doc_id, op)?)
    }

    fn after_local(&mut self, ops: &[Operation]) -> Result<Vec<Envelope>, SessionError> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        self.reflow()?;
        ops.iter()
            .map(|op| Envelope::operation(self.doc_id, op).map_err(SessionError::from))
            .collect()
    }

    /// Presence message for the local caret and selection.
    pub fn local_presence(
        &mut self,
        position: CharId,
        position_eol_start: bool,
        selection: Option<Selection>,
    ) -> Result<Envelope, SessionError> {
        let msg = self.presence.update(position, position_eol_start, selection);
        Ok(Envelope::presence(self.doc_id, &msg)?)
    }

    /// Presence message announcing a clean disconnect.
    pub fn leave(&self) -> Result<Envelope, SessionError> {
        Ok(Envelope::presence(self.doc_id, &self.presence.leave())?)
    }

    // ---------------------------------------------------------------
    // Remote input
    // ---------------------------------------------------------------

    pub fn on_remote(
        &mut self,
        envelope: &Envelope,
        now: Instant,
    ) -> Result<RemoteEvent, SessionError> {
        if envelope.doc_id != self.doc_id || envelope.peer_id == self.replica() {
            return Ok(RemoteEvent::Ignored);
        }
        match envelope.msg_type {
            MessageType::Operation => {
                let op = envelope.to_operation()?;
                match self.doc.apply_remote(op) {
                    Ok(report) => {
                        if report.applied > 0 {
                            self.reflow()?;
                        }
                        Ok(RemoteEvent::Merged(report))
                    }
                    Err(e) if e.is_transient() => Ok(RemoteEvent::Rejected(e)),
                    Err(e) => Err(e.into()),
                }
            }
            MessageType::Presence => {
                let msg = envelope.to_presence()?;
                if msg.peer_id() != envelope.peer_id {
                    log::warn!(
                        "Peer {} sent presence for {}, ignoring",
                        envelope.peer_id,
                        msg.peer_id()
                    );
                    return Ok(RemoteEvent::Ignored);
                }
                Ok(RemoteEvent::Presence {
                    changed: self.cursors.handle(&msg, now),
                })
            }
            MessageType::PeerLeft => Ok(RemoteEvent::PeerLeft {
                known: self.cursors.remove_peer(envelope.peer_id),
            }),
        }
    }

    /// Transport-level disconnect of a peer without a leave message.
    pub fn on_peer_disconnected(&mut self, peer_id: ReplicaId) -> bool {
        self.cursors.remove_peer(peer_id)
    }

    // ---------------------------------------------------------------
    // Layout
    // ---------------------------------------------------------------

    /// Apply new layout input. Returns whether the lines were recomputed.
    pub fn set_layout(&mut self, config: LayoutConfig) -> Result<bool, SessionError> {
        let reflow = self.layout.requires_reflow(&config);
        self.layout = config;
        if reflow {
            self.reflow()?;
        }
        Ok(reflow)
    }

    fn reflow(&mut self) -> Result<(), SessionError> {
        let lines = flow(&self.doc, &self.layout, &self.metrics);
        lines.verify(&self.doc).map_err(fatal)?;
        self.lines = lines;
        Ok(())
    }

    /// Caret origin for the local caret, `None` if `position` does not resolve.
    pub fn caret(
        &self,
        position: CharId,
        position_eol_start: bool,
    ) -> Result<Option<CaretPosition>, SessionError> {
        transient(caret_position(
            &self.doc,
            &self.lines,
            position,
            position_eol_start,
            &self.layout,
            &self.metrics,
        ))
    }

    /// Caret position under a click or drag at host point `(x, y)`.
    pub fn position_at(&self, x: f32, y: f32) -> PositionHit {
        self.lines.position_at(x, y, &self.layout, &self.metrics)
    }

    pub fn selection_rects(
        &self,
        selection: &Selection,
    ) -> Result<Vec<LineSelection>, SessionError> {
        Ok(transient(selection_rects(
            &self.doc,
            &self.lines,
            selection,
            &self.layout,
            &self.metrics,
        ))?
        .unwrap_or_default())
    }

    /// Remote carets and selections to draw this frame.
    pub fn remote_cursors(&mut self, now: Instant) -> Result<Vec<RemoteCursorRender>, SessionError> {
        self.cursors.expire_reveals(now);
        self.cursors
            .render(&self.doc, &self.lines, &self.layout, &self.metrics, now)
            .map_err(fatal)
    }
}

fn fatal(err: LayoutError) -> SessionError {
    log::error!("Layout inconsistency: {err}");
    SessionError::Fatal(err.to_string())
}

fn transient<T>(result: Result<T, LayoutError>) -> Result<Option<T>, SessionError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_transient() => Ok(None),
        Err(e) => Err(fatal(e)),
    }
}
