use crate::metrics::counters;
use sigrelay_common::{ConnectionId, ServerMessage};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;

/// Handle held in the registry — used to send frames to a connection.
#[derive(Clone, Debug)]
pub struct ConnHandle {
    /// Outbound queue drained by the connection's own task.
    pub tx: mpsc::Sender<String>,
    /// Identifier this connection was registered under.
    pub id: ConnectionId,
    /// Instant the connection was registered.
    pub connected_at: Instant,
}

/// Authoritative set of live, identified connections.
///
/// Every operation runs under one mutex, so a broadcast always sees a
/// membership snapshot that no insert or remove is halfway through. Sends
/// made under the lock are `try_send` onto bounded queues and never wait on
/// a peer's socket.
#[derive(Debug, Default)]
pub struct Registry {
    peers: Mutex<HashMap<ConnectionId, ConnHandle>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnHandle>> {
        // Nothing under the lock can leave the map half-updated.
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign a fresh identifier to the connection fed by `tx` and insert it.
    ///
    /// Uniqueness rests on the identifier's 128 bits of entropy; existing
    /// entries are not re-checked.
    pub fn register(&self, tx: mpsc::Sender<String>) -> ConnectionId {
        let id = ConnectionId::random();
        let handle = ConnHandle {
            tx,
            id,
            connected_at: Instant::now(),
        };
        self.peers().insert(id, handle);
        id
    }

    /// Look up a connection handle by identifier.
    #[must_use]
    pub fn lookup(&self, id: &ConnectionId) -> Option<ConnHandle> {
        self.peers().get(id).cloned()
    }

    /// Remove the entry for `id`. No-op if it is already gone.
    pub fn unregister(&self, id: &ConnectionId) {
        self.peers().remove(id);
    }

    /// Enqueue a `peerCount` notification on every registered connection.
    ///
    /// Returns the count that was announced. A connection whose queue is
    /// full or closed misses this notification; nobody else is affected.
    pub fn broadcast_peer_count(&self) -> usize {
        let peers = self.peers();
        let count = peers.len();
        let text = match (ServerMessage::PeerCount { count }).to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("failed to encode peer count: {}", e);
                return count;
            }
        };
        for handle in peers.values() {
            match handle.tx.try_send(text.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    counters::notifications_dropped_total("queue_full");
                    tracing::warn!(peer = %handle.id, "send queue full, peer count dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    counters::notifications_dropped_total("closed");
                    tracing::debug!(peer = %handle.id, "peer count to closing connection dropped");
                }
            }
        }
        counters::peer_count_broadcasts_total();
        count
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers().len()
    }

    /// Returns `true` if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers().is_empty()
    }
}
