use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chathub_core::models::{ChatMessage, RoomId, UserId};

/// Bounded per-connection outbound queue capacity. A connection that lets
/// this many broadcasts pile up is treated as dead and evicted.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Handle for a client connection subscription
pub type ConnectionId = String;

/// Subscriber information
#[derive(Debug)]
struct Subscriber {
    connection_id: ConnectionId,
    user_id: UserId,
    sender: mpsc::Sender<ChatMessage>,
}

/// In-memory hub routing log records to the connections of the matching room.
///
/// The hub is the single authority over the room membership map. Each
/// subscriber's queue is single-producer (the hub) / single-consumer (the
/// connection's outbound pump); dropping the hub-held sender is what closes
/// the queue, so a connection's queue is closed exactly once, on removal.
#[derive(Clone)]
pub struct RoomHub {
    /// Map of room_id -> subscribers; a room exists iff its set is non-empty
    rooms: Arc<DashMap<RoomId, Vec<Subscriber>>>,

    /// Map of connection_id -> room_id for cleanup
    connections: Arc<DashMap<ConnectionId, RoomId>>,
}

impl RoomHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Register a connection under a room, creating the room entry if absent.
    ///
    /// Returns the receiving end of the connection's bounded outbound queue;
    /// subsequent broadcasts for the room will reach it.
    pub fn register(
        &self,
        room_id: RoomId,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> mpsc::Receiver<ChatMessage> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        let subscriber = Subscriber {
            connection_id: connection_id.clone(),
            user_id: user_id.clone(),
            sender: tx,
        };

        self.rooms
            .entry(room_id.clone())
            .or_default()
            .push(subscriber);

        self.connections.insert(connection_id.clone(), room_id.clone());

        info!(
            room_id = %room_id,
            user_id = %user_id,
            connection_id = %connection_id,
            "Client registered in room"
        );

        rx
    }

    /// Unregister a connection. Idempotent: the membership check happens
    /// before acting, so a second or concurrent call is a no-op.
    pub fn unregister(&self, connection_id: &str) {
        if let Some((_, room_id)) = self.connections.remove(connection_id) {
            if let Some(mut subscribers) = self.rooms.get_mut(&room_id) {
                subscribers.retain(|sub| sub.connection_id != connection_id);

                // Remove room entry if no more subscribers
                if subscribers.is_empty() {
                    drop(subscribers); // Drop the RefMut before removing
                    self.rooms.remove(&room_id);
                    debug!(room_id = %room_id, "Room has no more subscribers, removed");
                }
            }

            info!(
                room_id = %room_id,
                connection_id = %connection_id,
                "Client unregistered from room"
            );
        }
    }

    /// Broadcast a message to every connection registered under `room_id`.
    ///
    /// Enqueueing is non-blocking: a subscriber whose queue is full (slow
    /// consumer) or closed is evicted from the room without slowing delivery
    /// to other members. Returns the number of connections reached.
    pub fn broadcast(&self, message: &ChatMessage, room_id: &RoomId) -> usize {
        let mut sent_count = 0;
        let mut evicted_connections = Vec::new();

        if let Some(subscribers) = self.rooms.get(room_id) {
            for subscriber in subscribers.iter() {
                match subscriber.sender.try_send(message.clone()) {
                    Ok(()) => {
                        sent_count += 1;
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            room_id = %room_id,
                            user_id = %subscriber.user_id,
                            connection_id = %subscriber.connection_id,
                            "Outbound queue full, evicting slow consumer"
                        );
                        evicted_connections.push(subscriber.connection_id.clone());
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(
                            room_id = %room_id,
                            connection_id = %subscriber.connection_id,
                            "Outbound queue closed, removing connection"
                        );
                        evicted_connections.push(subscriber.connection_id.clone());
                    }
                }
            }
        }

        // Eviction mutates the map, so it happens after the read pass
        for conn_id in evicted_connections {
            self.unregister(&conn_id);
        }

        if sent_count > 0 {
            debug!(
                room_id = %room_id,
                sent_count,
                message_id = %message.id,
                "Broadcast complete"
            );
        }

        sent_count
    }

    /// Number of subscribers in a room
    #[must_use]
    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        self.rooms
            .get(room_id)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// Number of active rooms
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total number of active connections
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}
