//! Project rooms and per-connection outbound queues.
//!
//! Each socket owns a bounded queue drained by its writer task. Emitting is
//! `try_send` only: a slow or gone subscriber never blocks or fails the
//! request that produced the event. Closed queues are pruned on the spot.

use super::events::{BoardEvent, RoomMessage};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// What became of one queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Queued,
    Dropped,
    /// The connection no longer exists.
    Gone,
}

#[derive(Debug)]
struct Subscriber {
    user_id: Uuid,
    sender: mpsc::Sender<String>,
    rooms: HashSet<Uuid>,
}

/// Fan-out broadcaster shared by the HTTP handlers and the socket tasks.
///
/// A guard on `connections` is never held while touching `rooms` (or the
/// reverse), so the two maps cannot deadlock against each other.
#[derive(Debug)]
pub struct Hub {
    connections: DashMap<ConnectionId, Subscriber>,
    rooms: DashMap<Uuid, HashSet<ConnectionId>>,
    buffer: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Hub {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Registers a socket and returns the receiving end of its queue.
    pub fn connect(&self, user_id: Uuid) -> (ConnectionId, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            Subscriber {
                user_id,
                sender,
                rooms: HashSet::new(),
            },
        );
        info!(connection_id = %id, user_id = %user_id, "realtime connection opened");
        (id, receiver)
    }

    /// Drops the connection and leaves every room it was in.
    pub fn disconnect(&self, id: ConnectionId) -> Vec<Uuid> {
        let Some((_, subscriber)) = self.connections.remove(&id) else {
            return Vec::new();
        };
        let rooms: Vec<Uuid> = subscriber.rooms.into_iter().collect();
        for project_id in &rooms {
            self.remove_from_room(*project_id, id);
            self.notify_room(
                *project_id,
                &RoomMessage::MemberLeft {
                    project_id: *project_id,
                    user_id: subscriber.user_id,
                },
                None,
            );
        }
        info!(connection_id = %id, rooms = rooms.len(), "realtime connection closed");
        rooms
    }

    pub fn user_of(&self, id: ConnectionId) -> Option<Uuid> {
        self.connections.get(&id).map(|s| s.user_id)
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Adds the connection to a project room. Returns `false` for an unknown
    /// connection or one already in the room.
    pub fn join(&self, id: ConnectionId, project_id: Uuid) -> bool {
        let user_id = match self.connections.get_mut(&id) {
            Some(mut subscriber) => {
                if !subscriber.rooms.insert(project_id) {
                    return false;
                }
                subscriber.user_id
            }
            None => return false,
        };
        self.rooms.entry(project_id).or_default().insert(id);
        // A disconnect between the two inserts has already swept the rooms.
        if !self.connections.contains_key(&id) {
            self.remove_from_room(project_id, id);
            return false;
        }
        self.notify_room(
            project_id,
            &RoomMessage::MemberJoined {
                project_id,
                user_id,
            },
            Some(id),
        );
        debug!(connection_id = %id, project_id = %project_id, "joined project room");
        true
    }

    pub fn leave(&self, id: ConnectionId, project_id: Uuid) -> bool {
        let user_id = match self.connections.get_mut(&id) {
            Some(mut subscriber) => {
                if !subscriber.rooms.remove(&project_id) {
                    return false;
                }
                subscriber.user_id
            }
            None => return false,
        };
        self.remove_from_room(project_id, id);
        self.notify_room(
            project_id,
            &RoomMessage::MemberLeft {
                project_id,
                user_id,
            },
            None,
        );
        debug!(connection_id = %id, project_id = %project_id, "left project room");
        true
    }

    pub fn room_size(&self, project_id: Uuid) -> usize {
        self.rooms.get(&project_id).map_or(0, |room| room.len())
    }

    /// Distinct users with at least one connection in the room.
    pub fn room_users(&self, project_id: Uuid) -> Vec<Uuid> {
        let members: Vec<ConnectionId> = self.room_members(project_id);
        let mut users: Vec<Uuid> = members
            .into_iter()
            .filter_map(|id| self.user_of(id))
            .collect();
        users.sort();
        users.dedup();
        users
    }

    /// Broadcasts a board event to the room, skipping `exclude`. Returns the
    /// number of queues that accepted it.
    pub fn emit(&self, project_id: Uuid, event: &BoardEvent, exclude: Option<ConnectionId>) -> usize {
        let delivered = self.broadcast(project_id, event, exclude);
        debug!(
            project_id = %project_id,
            event = event.name(),
            delivered,
            "event broadcast"
        );
        delivered
    }

    /// Removes every connection from the room, used once a project is gone.
    pub fn close_room(&self, project_id: Uuid) {
        if let Some((_, members)) = self.rooms.remove(&project_id) {
            for id in members {
                if let Some(mut subscriber) = self.connections.get_mut(&id) {
                    subscriber.rooms.remove(&project_id);
                }
            }
        }
    }

    /// Queues a message for one connection.
    pub fn send_to<T: Serialize>(&self, id: ConnectionId, message: &T) -> bool {
        match serde_json::to_string(message) {
            Ok(text) => self.deliver(id, text) == Delivery::Queued,
            Err(err) => {
                error!(connection_id = %id, error = %err, "failed to serialize message");
                false
            }
        }
    }

    fn notify_room(&self, project_id: Uuid, message: &RoomMessage, exclude: Option<ConnectionId>) {
        self.broadcast(project_id, message, exclude);
    }

    fn broadcast<T: Serialize>(
        &self,
        project_id: Uuid,
        message: &T,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(err) => {
                error!(project_id = %project_id, error = %err, "failed to serialize broadcast");
                return 0;
            }
        };
        let mut queued = 0;
        for id in self.room_members(project_id) {
            if Some(id) == exclude {
                continue;
            }
            match self.deliver(id, text.clone()) {
                Delivery::Queued => queued += 1,
                Delivery::Dropped => {}
                Delivery::Gone => {
                    debug!(connection_id = %id, project_id = %project_id, "pruning stale entry");
                    self.remove_from_room(project_id, id);
                }
            }
        }
        queued
    }

    fn room_members(&self, project_id: Uuid) -> Vec<ConnectionId> {
        self.rooms
            .get(&project_id)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default()
    }

    fn deliver(&self, id: ConnectionId, text: String) -> Delivery {
        let sender = match self.connections.get(&id) {
            Some(subscriber) => subscriber.sender.clone(),
            None => return Delivery::Gone,
        };
        match sender.try_send(text) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %id, "subscriber queue full, dropping message");
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                warn!(connection_id = %id, "subscriber queue closed, pruning connection");
                self.disconnect(id);
                Delivery::Dropped
            }
        }
    }

    fn remove_from_room(&self, project_id: Uuid, id: ConnectionId) {
        let now_empty = match self.rooms.get_mut(&project_id) {
            Some(mut room) => {
                room.remove(&id);
                room.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove_if(&project_id, |_, room| room.is_empty());
        }
    }
}
