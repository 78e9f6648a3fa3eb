pub mod api;
pub mod board;
pub mod client;
pub mod config;
pub mod ordering;
pub mod realtime;
pub mod schema;
pub mod store;
pub mod tables;

pub const BASE_URL: &str = "http://localhost:37240";
pub const PROJECTS_API: &str = "projects";
pub const COLUMNS_API: &str = "columns";
pub const TASKS_API: &str = "tasks";
pub const LABELS_API: &str = "labels";
pub const WS_API: &str = "ws";
pub const HEALTH_API: &str = "health";

/// Identity resolved by the gateway in front of this service.
pub const USER_HEADER: &str = "x-user-id";
/// Realtime connection of the caller, excluded from its own broadcasts.
pub const CONNECTION_HEADER: &str = "x-connection-id";
