//! Real-time propagation of board mutations to project rooms.

pub mod events;
pub mod hub;

pub use events::{BoardEvent, ClientMessage, RoomMessage};
pub use hub::{ConnectionId, Hub};
