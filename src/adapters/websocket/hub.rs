//! Live-connection hub: per-recipient registry of open sockets.
//!
//! # Architecture
//!
//! ```text
//! recipient: alice          recipient: bob
//! ├── conn-1 [buf 256]      └── conn-3 [buf 256]
//! └── conn-2 [buf 256]
//! ```
//!
//! Each connection owns a bounded outbound buffer. Delivery never waits on
//! a slow socket: a full buffer gets the connection closed and removed.
//!
//! # Thread Safety
//!
//! The registry sits behind a `RwLock`. Sends and broadcasts take the read
//! lock and only enqueue, so they run concurrently. Register, unregister and
//! eviction take the write lock.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::foundation::UserId;

/// Default outbound buffer per connection.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Unique identifier for one live socket. Generated on register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("Hub is stopped")]
    Stopped,
}

/// What the socket task needs to serve one registered connection.
#[derive(Debug)]
pub struct Registration {
    pub id: ConnectionId,
    pub user_id: UserId,
    /// Frames to write to the socket, in order.
    pub outbound: mpsc::Receiver<Arc<str>>,
    /// Cancelled when the hub drops this connection (overflow or stop).
    pub closed: CancellationToken,
}

/// Result of one send or broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub evicted: usize,
}

struct Slot {
    outbound: mpsc::Sender<Arc<str>>,
    closed: CancellationToken,
}

/// Registry of live connections keyed by recipient.
pub struct LiveConnectionHub {
    connections: RwLock<HashMap<UserId, HashMap<ConnectionId, Slot>>>,
    capacity: usize,
    lifetime: CancellationToken,
}

impl LiveConnectionHub {
    /// Creates a running hub whose connections buffer up to `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            lifetime: CancellationToken::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_running(&self) -> bool {
        !self.lifetime.is_cancelled()
    }

    /// Admits a connection for `user_id`.
    pub async fn register(&self, user_id: UserId) -> Result<Registration, HubError> {
        let mut connections = self.connections.write().await;
        // Checked under the lock so a concurrent stop cannot miss this slot.
        if !self.is_running() {
            return Err(HubError::Stopped);
        }

        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.capacity);
        let closed = self.lifetime.child_token();

        connections.entry(user_id.clone()).or_default().insert(
            id,
            Slot {
                outbound: tx,
                closed: closed.clone(),
            },
        );

        tracing::info!(user_id = %user_id, connection_id = %id, "Live connection registered");

        Ok(Registration {
            id,
            user_id,
            outbound: rx,
            closed,
        })
    }

    /// Removes a connection. Returns false if it was already gone.
    pub async fn unregister(&self, user_id: &UserId, id: ConnectionId) -> bool {
        let removed = {
            let mut connections = self.connections.write().await;
            remove_slot(&mut connections, user_id, id)
        };

        match removed {
            Some(slot) => {
                slot.closed.cancel();
                tracing::info!(user_id = %user_id, connection_id = %id, "Live connection unregistered");
                true
            }
            None => false,
        }
    }

    /// Enqueues `frame` on every connection of `recipient`.
    pub async fn send(&self, recipient: &UserId, frame: Arc<str>) -> DeliveryReport {
        let (delivered, overflowed) = {
            let connections = self.connections.read().await;
            match connections.get(recipient) {
                Some(slots) => enqueue(
                    slots.iter().map(|(id, slot)| (recipient, *id, slot)),
                    &frame,
                ),
                None => (0, Vec::new()),
            }
        };

        let evicted = self.evict(overflowed).await;
        DeliveryReport { delivered, evicted }
    }

    /// Enqueues `frame` on every registered connection.
    pub async fn broadcast(&self, frame: Arc<str>) -> DeliveryReport {
        let (delivered, overflowed) = {
            let connections = self.connections.read().await;
            enqueue(
                connections
                    .iter()
                    .flat_map(|(user, slots)| slots.iter().map(move |(id, slot)| (user, *id, slot))),
                &frame,
            )
        };

        let evicted = self.evict(overflowed).await;
        DeliveryReport { delivered, evicted }
    }

    /// Closes every connection and refuses new registrations.
    pub async fn stop(&self) {
        let drained: Vec<Slot> = {
            let mut connections = self.connections.write().await;
            self.lifetime.cancel();
            connections
                .drain()
                .flat_map(|(_, slots)| slots.into_values())
                .collect()
        };

        for slot in &drained {
            slot.closed.cancel();
        }
        tracing::info!(closed = drained.len(), "Live connection hub stopped");
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.values().map(HashMap::len).sum()
    }

    pub async fn connections_for(&self, user_id: &UserId) -> usize {
        self.connections
            .read()
            .await
            .get(user_id)
            .map_or(0, HashMap::len)
    }

    async fn evict(&self, targets: Vec<(UserId, ConnectionId)>) -> usize {
        if targets.is_empty() {
            return 0;
        }

        let removed: Vec<(UserId, ConnectionId, Slot)> = {
            let mut connections = self.connections.write().await;
            targets
                .into_iter()
                .filter_map(|(user, id)| {
                    remove_slot(&mut connections, &user, id).map(|slot| (user, id, slot))
                })
                .collect()
        };

        for (user, id, slot) in &removed {
            slot.closed.cancel();
            tracing::warn!(
                user_id = %user,
                connection_id = %id,
                capacity = self.capacity,
                "Outbound buffer full or closed, connection evicted"
            );
        }
        removed.len()
    }
}

impl Default for LiveConnectionHub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_CAPACITY)
    }
}

fn enqueue<'a>(
    slots: impl Iterator<Item = (&'a UserId, ConnectionId, &'a Slot)>,
    frame: &Arc<str>,
) -> (usize, Vec<(UserId, ConnectionId)>) {
    let mut delivered = 0;
    let mut overflowed = Vec::new();

    for (user, id, slot) in slots {
        match slot.outbound.try_send(Arc::clone(frame)) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                overflowed.push((user.clone(), id));
            }
        }
    }
    (delivered, overflowed)
}

fn remove_slot(
    connections: &mut HashMap<UserId, HashMap<ConnectionId, Slot>>,
    user_id: &UserId,
    id: ConnectionId,
) -> Option<Slot> {
    let slots = connections.get_mut(user_id)?;
    let slot = slots.remove(&id);
    if slots.is_empty() {
        connections.remove(user_id);
    }
    slot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn frame(text: &str) -> Arc<str> {
        Arc::from(text)
    }

    #[tokio::test]
    async fn register_tracks_connection() {
        let hub = LiveConnectionHub::default();
        let _reg = hub.register(user("alice")).await.unwrap();

        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(hub.connections_for(&user("alice")).await, 1);
        assert_eq!(hub.capacity(), DEFAULT_OUTBOUND_CAPACITY);
    }

    #[tokio::test]
    async fn send_reaches_every_connection_of_recipient_only() {
        let hub = LiveConnectionHub::default();
        let mut a1 = hub.register(user("alice")).await.unwrap();
        let mut a2 = hub.register(user("alice")).await.unwrap();
        let mut b = hub.register(user("bob")).await.unwrap();

        let report = hub.send(&user("alice"), frame("hi")).await;

        assert_eq!(report, DeliveryReport { delivered: 2, evicted: 0 });
        assert_eq!(&*a1.outbound.recv().await.unwrap(), "hi");
        assert_eq!(&*a2.outbound.recv().await.unwrap(), "hi");
        assert!(b.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_unknown_recipient_is_noop() {
        let hub = LiveConnectionHub::default();
        let report = hub.send(&user("nobody"), frame("x")).await;
        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn broadcast_reaches_all_connections() {
        let hub = LiveConnectionHub::default();
        let mut a = hub.register(user("alice")).await.unwrap();
        let mut b = hub.register(user("bob")).await.unwrap();

        let report = hub.broadcast(frame("all")).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(&*a.outbound.recv().await.unwrap(), "all");
        assert_eq!(&*b.outbound.recv().await.unwrap(), "all");
    }

    #[tokio::test]
    async fn unregister_removes_connection_and_signals_close() {
        let hub = LiveConnectionHub::default();
        let reg = hub.register(user("alice")).await.unwrap();

        assert!(hub.unregister(&user("alice"), reg.id).await);
        assert!(reg.closed.is_cancelled());
        assert_eq!(hub.connection_count().await, 0);
        assert!(!hub.unregister(&user("alice"), reg.id).await);
    }

    #[tokio::test]
    async fn full_buffer_evicts_only_that_connection() {
        let hub = LiveConnectionHub::new(2);
        let slow = hub.register(user("alice")).await.unwrap();
        let mut fast = hub.register(user("alice")).await.unwrap();

        for i in 0..2 {
            let report = hub.send(&user("alice"), frame(&i.to_string())).await;
            assert_eq!(report.delivered, 2);
            // Keep the fast connection drained.
            fast.outbound.recv().await.unwrap();
        }

        let report = hub.send(&user("alice"), frame("overflow")).await;

        assert_eq!(report, DeliveryReport { delivered: 1, evicted: 1 });
        assert!(slow.closed.is_cancelled());
        assert!(!fast.closed.is_cancelled());
        assert_eq!(hub.connections_for(&user("alice")).await, 1);
        assert_eq!(&*fast.outbound.recv().await.unwrap(), "overflow");
    }

    #[tokio::test]
    async fn overflow_on_broadcast_does_not_block_others() {
        let hub = LiveConnectionHub::new(1);
        let _stuck = hub.register(user("alice")).await.unwrap();
        let mut bob = hub.register(user("bob")).await.unwrap();

        hub.broadcast(frame("1")).await;
        bob.outbound.recv().await.unwrap();

        let report = hub.broadcast(frame("2")).await;

        assert_eq!(report.evicted, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(&*bob.outbound.recv().await.unwrap(), "2");
    }

    #[tokio::test]
    async fn dropped_receiver_is_cleaned_up_on_next_send() {
        let hub = LiveConnectionHub::default();
        let reg = hub.register(user("alice")).await.unwrap();
        drop(reg.outbound);

        let report = hub.send(&user("alice"), frame("x")).await;

        assert_eq!(report.evicted, 1);
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn stop_closes_everything_and_refuses_new_connections() {
        let hub = LiveConnectionHub::default();
        let a = hub.register(user("alice")).await.unwrap();
        let b = hub.register(user("bob")).await.unwrap();

        hub.stop().await;

        assert!(!hub.is_running());
        assert!(a.closed.is_cancelled());
        assert!(b.closed.is_cancelled());
        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(
            hub.register(user("carol")).await.unwrap_err(),
            HubError::Stopped
        );
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
