//! In-process fan-out of encoded envelopes.
//!
//! Uses a tokio broadcast channel: one send reaches every subscriber, and
//! each peer's receiver buffers up to `capacity` messages. A peer never
//! sees its own envelopes.
//!
//! This wires replicas together inside one process (tests, embedding). It
//! is not a network transport.

use quire_core::ReplicaId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::RwLock;

use crate::protocol::{Envelope, ProtocolError};

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_lagged: u64,
    pub active_peers: usize,
}

#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_lagged: AtomicU64,
}

/// Peer identity with display metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    pub peer_id: ReplicaId,
    pub name: String,
}

impl PeerInfo {
    pub fn new(peer_id: ReplicaId, name: impl Into<String>) -> Self {
        Self {
            peer_id,
            name: name.into(),
        }
    }
}

/// Broadcast group for one document.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Vec<u8>>>,
    peers: Arc<RwLock<HashMap<ReplicaId, PeerInfo>>>,
    capacity: usize,
    stats: Arc<AtomicBroadcastStats>,
}

impl BroadcastGroup {
    /// `capacity` is the number of messages buffered per peer before a
    /// slow peer starts losing the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            stats: Arc::new(AtomicBroadcastStats::default()),
        }
    }

    /// Register a peer and return its receiver.
    pub async fn join(&self, info: PeerInfo) -> PeerReceiver {
        let peer_id = info.peer_id;
        self.peers.write().await.insert(peer_id, info);
        log::info!("Peer {peer_id} joined broadcast group");
        PeerReceiver {
            peer_id,
            rx: self.sender.subscribe(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Unregister a peer and tell the others it left.
    pub async fn leave(&self, peer_id: ReplicaId, doc_id: uuid::Uuid) -> Option<PeerInfo> {
        let removed = self.peers.write().await.remove(&peer_id);
        if removed.is_some() {
            log::info!("Peer {peer_id} left broadcast group");
            if let Err(e) = self.broadcast(&Envelope::peer_left(peer_id, doc_id)) {
                log::warn!("Failed to announce departure of {peer_id}: {e}");
            }
        }
        removed
    }

    /// Encode once and fan out. Returns the number of receivers reached.
    pub fn broadcast(&self, envelope: &Envelope) -> Result<usize, ProtocolError> {
        let encoded = envelope.encode()?;
        Ok(self.broadcast_raw(Arc::new(encoded)))
    }

    /// Fan out pre-encoded bytes.
    pub fn broadcast_raw(&self, encoded: Arc<Vec<u8>>) -> usize {
        let count = self.sender.send(encoded).unwrap_or(0);
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn has_peer(&self, peer_id: &ReplicaId) -> bool {
        self.peers.read().await.contains_key(peer_id)
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_lagged: self.stats.messages_lagged.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One peer's view of the group.
pub struct PeerReceiver {
    peer_id: ReplicaId,
    rx: broadcast::Receiver<Arc<Vec<u8>>>,
    stats: Arc<AtomicBroadcastStats>,
}

impl PeerReceiver {
    pub fn peer_id(&self) -> ReplicaId {
        self.peer_id
    }

    /// Wait for the next envelope from another peer.
    ///
    /// Returns `None` once the group is gone. Undecodable messages are
    /// logged and skipped.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.recv().await {
                Ok(bytes) => {
                    if let Some(envelope) = self.accept(&bytes) {
                        return Some(envelope);
                    }
                }
                Err(RecvError::Lagged(n)) => self.lagged(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next envelope already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.try_recv() {
                Ok(bytes) => {
                    if let Some(envelope) = self.accept(&bytes) {
                        return Some(envelope);
                    }
                }
                Err(TryRecvError::Lagged(n)) => self.lagged(n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    fn accept(&self, bytes: &[u8]) -> Option<Envelope> {
        match Envelope::decode(bytes) {
            Ok(envelope) if envelope.peer_id == self.peer_id => None,
            Ok(envelope) => Some(envelope),
            Err(e) => {
                log::warn!("Peer {} dropped undecodable message: {e}", self.peer_id);
                None
            }
        }
    }

    fn lagged(&self, n: u64) {
        self.stats.messages_lagged.fetch_add(n, Ordering::Relaxed);
        log::warn!("Peer {} lagged behind, {n} messages lost", self.peer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_core::{CharId, Operation};
    use uuid::Uuid;

    const A: ReplicaId = ReplicaId::from_u128(1);
    const B: ReplicaId = ReplicaId::from_u128(2);
    const C: ReplicaId = ReplicaId::from_u128(3);

    fn op_from(peer: ReplicaId, clock: u64) -> Envelope {
        let op = Operation::insert(peer, CharId::new(clock, peer), CharId::BASE, 'x', vec![]);
        Envelope::operation(Uuid::nil(), &op).unwrap()
    }

    #[tokio::test]
    async fn test_fan_out_skips_sender() {
        let group = BroadcastGroup::new(16);
        let mut a = group.join(PeerInfo::new(A, "a")).await;
        let mut b = group.join(PeerInfo::new(B, "b")).await;
        let mut c = group.join(PeerInfo::new(C, "c")).await;
        assert_eq!(group.peer_count().await, 3);

        let reached = group.broadcast(&op_from(A, 1)).unwrap();
        assert_eq!(reached, 3);

        assert!(a.try_recv().is_none());
        assert_eq!(b.recv().await.unwrap().peer_id, A);
        assert_eq!(c.try_recv().unwrap().clock, 1);
    }

    #[tokio::test]
    async fn test_leave_announces() {
        let group = BroadcastGroup::new(16);
        let _a = group.join(PeerInfo::new(A, "a")).await;
        let mut b = group.join(PeerInfo::new(B, "b")).await;

        let info = group.leave(A, Uuid::nil()).await.unwrap();
        assert_eq!(info.name, "a");
        assert!(!group.has_peer(&A).await);
        assert!(group.leave(A, Uuid::nil()).await.is_none());

        let env = b.try_recv().unwrap();
        assert_eq!(env.msg_type, crate::protocol::MessageType::PeerLeft);
        assert_eq!(env.peer_id, A);
    }

    #[tokio::test]
    async fn test_lagging_peer_counts_losses() {
        let group = BroadcastGroup::new(2);
        let mut b = group.join(PeerInfo::new(B, "b")).await;
        for clock in 1..=5 {
            group.broadcast(&op_from(A, clock)).unwrap();
        }
        let received = b.drain();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].clock, 4);

        let stats = group.stats().await;
        assert_eq!(stats.messages_sent, 5);
        assert_eq!(stats.messages_lagged, 3);
        assert_eq!(stats.active_peers, 1);
    }

    #[tokio::test]
    async fn test_garbage_is_skipped() {
        let group = BroadcastGroup::new(8);
        let mut b = group.join(PeerInfo::new(B, "b")).await;
        group.broadcast_raw(Arc::new(vec![0xFF, 0xFE]));
        group.broadcast(&op_from(A, 7)).unwrap();
        assert_eq!(b.try_recv().unwrap().clock, 7);
        assert!(b.try_recv().is_none());
    }
}
