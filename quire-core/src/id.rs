//! Character identity.
//!
//! Every character instance carries a [`CharId`], a `(clock, replica)` pair
//! that is globally unique, immutable once assigned, and totally ordered.
//! Clocks are Lamport clocks: a replica always issues a clock strictly greater
//! than any clock it has seen, so causal precedence implies identifier order.
//!
//! ```text
//!   BASE (0, nil)  <  (1, r1)  <  (1, r2)  <  (2, r1)  <  …  <  EOF (MAX, max)
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Identity of one replica (one editing peer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub Uuid);

impl ReplicaId {
    /// Fresh random replica id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic replica id (tests, fixtures).
    pub const fn from_u128(v: u128) -> Self {
        Self(Uuid::from_u128(v))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ReplicaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell peers apart in logs.
        let s = self.0.simple().to_string();
        write!(f, "{}", &s[..8])
    }
}

/// Globally unique, totally ordered character identifier.
///
/// Ordering is lexicographic over `(clock, replica)`. Two sentinels bracket
/// all real content: [`CharId::BASE`] and [`CharId::EOF`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharId {
    pub clock: u64,
    pub replica: ReplicaId,
}

impl CharId {
    /// Virtual character preceding all content.
    pub const BASE: CharId = CharId {
        clock: 0,
        replica: ReplicaId(Uuid::nil()),
    };

    /// Virtual character following all content.
    pub const EOF: CharId = CharId {
        clock: u64::MAX,
        replica: ReplicaId(Uuid::from_u128(u128::MAX)),
    };

    pub const fn new(clock: u64, replica: ReplicaId) -> Self {
        Self { clock, replica }
    }

    #[inline]
    pub fn is_base(&self) -> bool {
        *self == Self::BASE
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        *self == Self::EOF
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.is_base() || self.is_eof()
    }

    /// True when the clock lies in the range real identifiers may use.
    #[inline]
    pub fn is_assignable(&self) -> bool {
        self.clock != 0 && self.clock != u64::MAX
    }
}

impl Ord for CharId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.clock
            .cmp(&other.clock)
            .then_with(|| self.replica.cmp(&other.replica))
    }
}

impl PartialOrd for CharId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CharId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_base() {
            write!(f, "BASE")
        } else if self.is_eof() {
            write!(f, "EOF")
        } else {
            write!(f, "{}@{}", self.clock, self.replica)
        }
    }
}

/// Lamport clock issuing identifiers for one replica.
///
/// `tick` is monotonic; `observe` folds in every identifier merged from a
/// remote replica so that later local ids order after it.
#[derive(Debug, Clone)]
pub struct LamportClock {
    replica: ReplicaId,
    counter: u64,
}

impl LamportClock {
    pub fn new(replica: ReplicaId) -> Self {
        Self { replica, counter: 0 }
    }

    /// Issue the next identifier.
    pub fn tick(&mut self) -> CharId {
        self.counter += 1;
        CharId::new(self.counter, self.replica)
    }

    /// Advance past a remotely issued identifier.
    pub fn observe(&mut self, id: CharId) {
        if id.is_assignable() && id.clock > self.counter {
            self.counter = id.clock;
        }
    }

    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    /// Last clock value issued or observed.
    pub fn current(&self) -> u64 {
        self.counter
    }
}
