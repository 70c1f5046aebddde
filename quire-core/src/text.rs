//! Replicated rich text.
//!
//! The document is an arena of [`Char`]s keyed by [`CharId`] plus one total
//! ordering of those ids. Characters are never physically removed: a delete
//! sets the tombstone flag so concurrent operations that reference the
//! character by identity still resolve.
//!
//! ```text
//!   order:  [ H(1,r1) ─ X(1,r2)† ─ i(2,r1) ]      † = tombstone
//!   chars:  { (1,r1) → Char{ 'H', left: BASE, … }, … }
//! ```
//!
//! ## Merge rule
//!
//! A character is placed after its left neighbour, skipping every following
//! character whose id is greater than its own. Ids are Lamport ordered, so
//! concurrent inserts at one position land in descending id order and the
//! result depends only on the set of operations, not on delivery order.
//!
//! ## Causal buffer
//!
//! Remote operations whose dependency is not yet known wait in a FIFO
//! buffer. The buffer is retried on every arrival; an operation that stays
//! blocked for `max_pending_attempts` arrivals is dropped as malformed.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::attributes::{AttributeName, Attributes, FontStyle};
use crate::error::ReplicaError;
use crate::id::{CharId, LamportClock, ReplicaId};
use crate::op::{OpKind, Operation};

// ───────────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────────

/// Bounds of the causal buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Maximum number of operations waiting for a dependency.
    pub max_pending_ops: usize,
    /// Arrivals an operation may stay blocked before it is dropped.
    pub max_pending_attempts: u32,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            max_pending_ops: 10_000,
            max_pending_attempts: 10_000,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Characters
// ───────────────────────────────────────────────────────────────────

/// One character instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Char {
    pub id: CharId,
    pub ch: char,
    /// Left neighbour at creation time.
    pub left: CharId,
    /// Tombstone flag. Append-only: never reset once set.
    pub deleted: bool,
    pub attributes: Attributes,
}

impl Char {
    #[inline]
    pub fn is_newline(&self) -> bool {
        self.ch == '\n'
    }

    #[inline]
    pub fn font_style(&self) -> FontStyle {
        self.attributes.font_style()
    }
}

/// Behaviour of [`RichText::get_char_relative_to`] past the last character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Stop at the last visible character.
    Clamp,
    /// Return [`CharId::EOF`].
    Sentinel,
    /// Fail with [`ReplicaError::OutOfBounds`].
    Error,
}

/// Outcome of merging one remote operation (and anything it unblocked).
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Operations that changed state, including unblocked buffered ones.
    pub applied: usize,
    /// Operations already reflected in the state, including attribute
    /// writes outvoted by a newer one.
    pub duplicates: usize,
    /// Whether the incoming operation was buffered.
    pub buffered: bool,
    /// Buffered operations given up on.
    pub dropped: Vec<(Operation, ReplicaError)>,
}

enum Step {
    Applied,
    Duplicate,
    Missing,
}

struct Pending {
    op: Operation,
    attempts: u32,
}

// ───────────────────────────────────────────────────────────────────
// RichText
// ───────────────────────────────────────────────────────────────────

/// A replica of the shared text document.
///
/// Single-writer: all local edits and remote merges for one replica run on
/// the same execution context, so no internal locking is needed.
pub struct RichText {
    clock: LamportClock,
    chars: FxHashMap<CharId, Char>,
    /// Total order over every known character, tombstones included.
    order: Vec<CharId>,
    pending: VecDeque<Pending>,
    visible: usize,
    config: ReplicaConfig,
}

impl RichText {
    pub fn new(replica: ReplicaId) -> Self {
        Self::with_config(replica, ReplicaConfig::default())
    }

    pub fn with_config(replica: ReplicaId, config: ReplicaConfig) -> Self {
        Self {
            clock: LamportClock::new(replica),
            chars: FxHashMap::default(),
            order: Vec::new(),
            pending: VecDeque::new(),
            visible: 0,
            config,
        }
    }

    pub fn replica(&self) -> ReplicaId {
        self.clock.replica()
    }

    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    // ---------------------------------------------------------------
    // Local mutations
    // ---------------------------------------------------------------

    /// Insert `ch` after `after` and return the operation to broadcast.
    ///
    /// `after` may be `BASE`, `EOF` (append at the end) or any known
    /// character, tombstoned or not.
    pub fn insert(
        &mut self,
        after: CharId,
        ch: char,
        attributes: &[AttributeName],
    ) -> Result<Operation, ReplicaError> {
        let left = if after.is_eof() {
            self.order.last().copied().unwrap_or(CharId::BASE)
        } else {
            after
        };
        if !left.is_base() && !self.chars.contains_key(&left) {
            return Err(ReplicaError::UnresolvedPosition(after));
        }

        let id = self.clock.tick();
        let op = Operation::insert(self.replica(), id, left, ch, attributes.to_vec());
        self.integrate(id, left, ch, attributes);
        Ok(op)
    }

    /// Insert a string, each character chained after the previous one.
    pub fn insert_str(
        &mut self,
        after: CharId,
        text: &str,
        attributes: &[AttributeName],
    ) -> Result<Vec<Operation>, ReplicaError> {
        let mut ops = Vec::with_capacity(text.len());
        let mut cursor = after;
        for ch in text.chars() {
            let op = self.insert(cursor, ch, attributes)?;
            cursor = op.target();
            ops.push(op);
        }
        Ok(ops)
    }

    /// Tombstone `position`.
    ///
    /// Deleting an already deleted character changes nothing and still
    /// returns the (idempotent) delete operation.
    pub fn delete(&mut self, position: CharId) -> Result<Operation, ReplicaError> {
        if position.is_sentinel() {
            return Err(ReplicaError::UnresolvedPosition(position));
        }
        let c = self
            .chars
            .get_mut(&position)
            .ok_or(ReplicaError::UnresolvedPosition(position))?;
        if !c.deleted {
            c.deleted = true;
            self.visible -= 1;
        }
        Ok(Operation::delete(self.replica(), position))
    }

    /// Delete every visible character after `left` up to and including `right`.
    pub fn delete_range(
        &mut self,
        left: CharId,
        right: CharId,
    ) -> Result<Vec<Operation>, ReplicaError> {
        let targets: Vec<CharId> = self.chars_between(left, right)?.map(|c| c.id).collect();
        targets.into_iter().map(|id| self.delete(id)).collect()
    }

    /// Write attribute `name = value` on `position`.
    pub fn set_attribute(
        &mut self,
        position: CharId,
        name: AttributeName,
        value: bool,
    ) -> Result<Operation, ReplicaError> {
        if position.is_sentinel() || !self.chars.contains_key(&position) {
            return Err(ReplicaError::UnresolvedPosition(position));
        }
        let id = self.clock.tick();
        if let Some(c) = self.chars.get_mut(&position) {
            c.attributes.apply(name, value, id);
        }
        Ok(Operation::set_attribute(
            self.replica(),
            position,
            id,
            name,
            value,
        ))
    }

    // ---------------------------------------------------------------
    // Remote merge
    // ---------------------------------------------------------------

    /// Merge a remote operation.
    ///
    /// Commutative and idempotent. Structurally invalid operations fail
    /// immediately with `MalformedOperation`; operations with a missing
    /// dependency are buffered and retried on later arrivals.
    pub fn apply_remote(&mut self, op: Operation) -> Result<MergeReport, ReplicaError> {
        if let Err(e) = op.validate() {
            log::warn!("Rejected remote operation from {}: {e}", op.source);
            return Err(e);
        }

        let mut report = MergeReport::default();
        match self.try_apply(&op) {
            Step::Applied => {
                report.applied += 1;
                self.retry_pending(&mut report);
            }
            Step::Duplicate => {
                report.duplicates += 1;
                self.retry_pending(&mut report);
            }
            Step::Missing => {
                self.retry_pending(&mut report);
                log::debug!(
                    "Buffering operation on {} awaiting {}",
                    op.target(),
                    op.dependency()
                );
                self.buffer(op, &mut report);
                report.buffered = true;
            }
        }
        Ok(report)
    }

    /// Number of operations waiting for a dependency.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn buffer(&mut self, op: Operation, report: &mut MergeReport) {
        while self.pending.len() >= self.config.max_pending_ops {
            let Some(oldest) = self.pending.pop_front() else {
                break;
            };
            self.drop_pending(oldest.op, "causal buffer full", report);
        }
        self.pending.push_back(Pending { op, attempts: 0 });
    }

    fn drop_pending(&mut self, op: Operation, why: &str, report: &mut MergeReport) {
        let err = ReplicaError::malformed(format!(
            "{why}: dependency {} of {} never arrived",
            op.dependency(),
            op.target()
        ));
        log::warn!("Dropping operation from {}: {err}", op.source);
        report.dropped.push((op, err));
    }

    fn retry_pending(&mut self, report: &mut MergeReport) {
        let mut first_pass = true;
        loop {
            let mut progressed = false;
            let mut blocked = VecDeque::with_capacity(self.pending.len());
            while let Some(mut p) = self.pending.pop_front() {
                match self.try_apply(&p.op) {
                    Step::Applied => {
                        report.applied += 1;
                        progressed = true;
                    }
                    Step::Duplicate => report.duplicates += 1,
                    Step::Missing => {
                        if first_pass {
                            p.attempts += 1;
                        }
                        if p.attempts > self.config.max_pending_attempts {
                            self.drop_pending(p.op, "retry limit reached", report);
                        } else {
                            blocked.push_back(p);
                        }
                    }
                }
            }
            self.pending = blocked;
            first_pass = false;
            if !progressed || self.pending.is_empty() {
                break;
            }
        }
    }

    fn try_apply(&mut self, op: &Operation) -> Step {
        match &op.kind {
            OpKind::Insert {
                id,
                left,
                ch,
                attributes,
            } => {
                if self.chars.contains_key(id) {
                    return Step::Duplicate;
                }
                if !left.is_base() && !self.chars.contains_key(left) {
                    return Step::Missing;
                }
                self.clock.observe(*id);
                self.integrate(*id, *left, *ch, attributes);
                Step::Applied
            }
            OpKind::Delete { target } => match self.chars.get_mut(target) {
                None => Step::Missing,
                Some(c) if c.deleted => Step::Duplicate,
                Some(c) => {
                    c.deleted = true;
                    self.visible -= 1;
                    Step::Applied
                }
            },
            OpKind::SetAttribute {
                target,
                id,
                name,
                value,
            } => {
                let Some(c) = self.chars.get_mut(target) else {
                    return Step::Missing;
                };
                self.clock.observe(*id);
                if c.attributes.apply(*name, *value, *id) {
                    Step::Applied
                } else {
                    // Replayed or outvoted: the register already holds a newer write.
                    Step::Duplicate
                }
            }
        }
    }

    /// Place a new character in the ordering.
    fn integrate(&mut self, id: CharId, left: CharId, ch: char, attributes: &[AttributeName]) {
        let mut idx = if left.is_base() {
            0
        } else {
            match self.index_of(left) {
                Some(i) => i + 1,
                None => return,
            }
        };
        while idx < self.order.len() && self.order[idx] > id {
            idx += 1;
        }
        self.order.insert(idx, id);

        let mut attrs = Attributes::new();
        for name in attributes {
            attrs.apply(*name, true, id);
        }
        self.chars.insert(
            id,
            Char {
                id,
                ch,
                left,
                deleted: false,
                attributes: attrs,
            },
        );
        self.visible += 1;
    }

    fn index_of(&self, id: CharId) -> Option<usize> {
        self.order.iter().position(|c| *c == id)
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Visible text.
    pub fn text(&self) -> String {
        self.visible_chars().map(|c| c.ch).collect()
    }

    /// Number of visible characters.
    pub fn len(&self) -> usize {
        self.visible
    }

    pub fn is_empty(&self) -> bool {
        self.visible == 0
    }

    /// Character by id, tombstones included.
    pub fn char(&self, id: CharId) -> Option<&Char> {
        self.chars.get(&id)
    }

    pub fn is_visible(&self, id: CharId) -> bool {
        self.chars.get(&id).is_some_and(|c| !c.deleted)
    }

    /// Fail-soft lookup of a position against the current document.
    ///
    /// Sentinels and visible characters resolve to themselves; tombstoned
    /// or unknown characters resolve to `None`.
    pub fn resolve(&self, position: CharId) -> Option<CharId> {
        if position.is_sentinel() || self.is_visible(position) {
            Some(position)
        } else {
            None
        }
    }

    /// Number of visible characters up to and including `position`.
    ///
    /// `BASE` is 0 and `EOF` is `len()`. Tombstoned or unknown characters
    /// have no visible index.
    pub fn visible_index(&self, position: CharId) -> Option<usize> {
        if position.is_base() {
            return Some(0);
        }
        if position.is_eof() {
            return Some(self.visible);
        }
        if !self.is_visible(position) {
            return None;
        }
        let mut count = 0;
        for id in &self.order {
            if self.is_visible(*id) {
                count += 1;
            }
            if *id == position {
                return Some(count);
            }
        }
        None
    }

    /// Visible characters in document order.
    pub fn visible_chars(&self) -> impl Iterator<Item = &Char> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.chars.get(id))
            .filter(|c| !c.deleted)
    }

    /// Every character in document order, tombstones included.
    pub fn all_chars(&self) -> impl Iterator<Item = &Char> + '_ {
        self.order.iter().filter_map(|id| self.chars.get(id))
    }

    /// Visible characters from the document start up to and including `position`.
    pub fn chars_to(&self, position: CharId) -> Result<CharsBetween<'_>, ReplicaError> {
        self.chars_between(CharId::BASE, position)
    }

    /// Visible characters strictly after `from` up to and including `to`.
    pub fn chars_between(
        &self,
        from: CharId,
        to: CharId,
    ) -> Result<CharsBetween<'_>, ReplicaError> {
        let start = self.order_slot(from)?;
        let end = self.order_slot(to)?;
        Ok(CharsBetween {
            doc: self,
            idx: start,
            end: end.max(start),
        })
    }

    /// Index in `order` just past `position`.
    fn order_slot(&self, position: CharId) -> Result<usize, ReplicaError> {
        if position.is_base() {
            Ok(0)
        } else if position.is_eof() {
            Ok(self.order.len())
        } else {
            self.index_of(position)
                .map(|i| i + 1)
                .ok_or(ReplicaError::UnresolvedPosition(position))
        }
    }

    /// Walk `offset` visible characters from `position`.
    ///
    /// Moving left past the first character yields `BASE`. Past the last
    /// character the behaviour follows `boundary`. A tombstoned start
    /// position counts from its nearest visible predecessor.
    pub fn get_char_relative_to(
        &self,
        position: CharId,
        offset: isize,
        boundary: Boundary,
    ) -> Result<CharId, ReplicaError> {
        let anchor = self.anchor_index(position)?;
        if offset == 0 {
            if position.is_eof() {
                return Ok(CharId::EOF);
            }
            return Ok(self.nth_visible(anchor).unwrap_or(CharId::BASE));
        }

        let target = (anchor as isize)
            .checked_add(offset)
            .unwrap_or(if offset < 0 { -1 } else { isize::MAX });
        if target < 0 {
            return match boundary {
                Boundary::Error => Err(ReplicaError::OutOfBounds {
                    from: position,
                    offset,
                }),
                Boundary::Clamp | Boundary::Sentinel => Ok(CharId::BASE),
            };
        }
        let target = target as usize;
        if target > self.visible {
            return match boundary {
                Boundary::Clamp => Ok(self.nth_visible(self.visible).unwrap_or(CharId::BASE)),
                Boundary::Sentinel => Ok(CharId::EOF),
                Boundary::Error => Err(ReplicaError::OutOfBounds {
                    from: position,
                    offset,
                }),
            };
        }
        Ok(self.nth_visible(target).unwrap_or(CharId::BASE))
    }

    /// Visible index a relative walk starts from.
    fn anchor_index(&self, position: CharId) -> Result<usize, ReplicaError> {
        if position.is_base() {
            return Ok(0);
        }
        if position.is_eof() {
            return Ok(self.visible);
        }
        if !self.chars.contains_key(&position) {
            return Err(ReplicaError::UnresolvedPosition(position));
        }
        let mut count = 0;
        for id in &self.order {
            if *id == position {
                break;
            }
            if self.is_visible(*id) {
                count += 1;
            }
        }
        if self.is_visible(position) {
            count += 1;
        }
        Ok(count)
    }

    /// The `n`th visible character (1-based); 0 is `BASE`.
    fn nth_visible(&self, n: usize) -> Option<CharId> {
        if n == 0 {
            return Some(CharId::BASE);
        }
        self.visible_chars().nth(n - 1).map(|c| c.id)
    }
}

/// Lazy, finite, restartable (`Clone`) range of visible characters.
#[derive(Clone)]
pub struct CharsBetween<'a> {
    doc: &'a RichText,
    idx: usize,
    end: usize,
}

impl<'a> Iterator for CharsBetween<'a> {
    type Item = &'a Char;

    fn next(&mut self) -> Option<Self::Item> {
        while self.idx < self.end {
            let id = self.doc.order[self.idx];
            self.idx += 1;
            if let Some(c) = self.doc.chars.get(&id) {
                if !c.deleted {
                    return Some(c);
                }
            }
        }
        None
    }
}

// ===================================================================
// Tests
// ===================================================================
