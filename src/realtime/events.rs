use crate::tables::{Column, Comment, Project, Task};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Board mutation broadcast to a project room once it has been persisted.
///
/// Serialized as `{"type": "server:...", "data": {...}}`. Each payload is
/// enough for a listener to replay the mutation without refetching the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BoardEvent {
    #[serde(rename = "server:task_created")]
    TaskCreated { task: Task },

    #[serde(rename = "server:task_updated")]
    TaskUpdated { task: Task },

    #[serde(rename = "server:task_moved", rename_all = "camelCase")]
    TaskMoved {
        task_id: Uuid,
        source_column_id: Uuid,
        dest_column_id: Uuid,
        position: usize,
    },

    #[serde(rename = "server:task_deleted", rename_all = "camelCase")]
    TaskDeleted { task_id: Uuid, column_id: Uuid },

    #[serde(rename = "server:column_created")]
    ColumnCreated { column: Column },

    #[serde(rename = "server:column_updated")]
    ColumnUpdated { column: Column },

    #[serde(rename = "server:column_moved", rename_all = "camelCase")]
    ColumnMoved { column_id: Uuid, position: usize },

    #[serde(rename = "server:column_deleted", rename_all = "camelCase")]
    ColumnDeleted {
        column_id: Uuid,
        target_column_id: Option<Uuid>,
        relocated_task_ids: Vec<Uuid>,
        deleted_task_ids: Vec<Uuid>,
    },

    #[serde(rename = "server:comment_added", rename_all = "camelCase")]
    CommentAdded { task_id: Uuid, comment: Comment },

    #[serde(rename = "server:project_updated")]
    ProjectUpdated { project: Project },

    #[serde(rename = "server:project_deleted", rename_all = "camelCase")]
    ProjectDeleted { project_id: Uuid },
}

impl BoardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BoardEvent::TaskCreated { .. } => "server:task_created",
            BoardEvent::TaskUpdated { .. } => "server:task_updated",
            BoardEvent::TaskMoved { .. } => "server:task_moved",
            BoardEvent::TaskDeleted { .. } => "server:task_deleted",
            BoardEvent::ColumnCreated { .. } => "server:column_created",
            BoardEvent::ColumnUpdated { .. } => "server:column_updated",
            BoardEvent::ColumnMoved { .. } => "server:column_moved",
            BoardEvent::ColumnDeleted { .. } => "server:column_deleted",
            BoardEvent::CommentAdded { .. } => "server:comment_added",
            BoardEvent::ProjectUpdated { .. } => "server:project_updated",
            BoardEvent::ProjectDeleted { .. } => "server:project_deleted",
        }
    }
}

/// Connection and room bookkeeping sent to a single socket or to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RoomMessage {
    #[serde(rename = "connection:ready", rename_all = "camelCase")]
    Ready { connection_id: Uuid, user_id: Uuid },

    #[serde(rename = "room:joined", rename_all = "camelCase")]
    Joined {
        project_id: Uuid,
        room_size: usize,
        room_users: Vec<Uuid>,
    },

    #[serde(rename = "room:left", rename_all = "camelCase")]
    Left { project_id: Uuid },

    #[serde(rename = "room:member_joined", rename_all = "camelCase")]
    MemberJoined { project_id: Uuid, user_id: Uuid },

    #[serde(rename = "room:member_left", rename_all = "camelCase")]
    MemberLeft { project_id: Uuid, user_id: Uuid },

    #[serde(rename = "pong")]
    Pong {},

    #[serde(rename = "error")]
    Error { message: String },
}

/// Messages a socket may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    JoinProjectRoom { project_id: Uuid },
    LeaveProjectRoom { project_id: Uuid },
    Ping,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct RoomRef {
    #[serde(rename = "projectId", alias = "project_id")]
    project_id: Option<Uuid>,
}

impl ClientMessage {
    /// Parses a text frame. The error string is sent back to the socket as-is.
    pub fn parse(text: &str) -> Result<Self, String> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|_| "Invalid JSON format".to_string())?;
        let kind = envelope.kind.ok_or_else(|| "Missing event type".to_string())?;

        let room = |data: serde_json::Value| -> Result<Uuid, String> {
            serde_json::from_value::<RoomRef>(data)
                .ok()
                .and_then(|r| r.project_id)
                .ok_or_else(|| "Missing projectId".to_string())
        };

        match kind.as_str() {
            "client:join_project_room" => Ok(ClientMessage::JoinProjectRoom {
                project_id: room(envelope.data)?,
            }),
            "client:leave_project_room" => Ok(ClientMessage::LeaveProjectRoom {
                project_id: room(envelope.data)?,
            }),
            "ping" => Ok(ClientMessage::Ping),
            other => Err(format!("Unknown event type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_moved_wire_format() {
        let (task_id, source, dest) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let event = BoardEvent::TaskMoved {
            task_id,
            source_column_id: source,
            dest_column_id: dest,
            position: 2,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "server:task_moved",
                "data": {
                    "taskId": task_id,
                    "sourceColumnId": source,
                    "destColumnId": dest,
                    "position": 2
                }
            })
        );
        assert_eq!(value["type"], event.name());
        assert_eq!(serde_json::from_value::<BoardEvent>(value).unwrap(), event);
    }

    #[test]
    fn test_pong_has_empty_data() {
        let value = serde_json::to_value(RoomMessage::Pong {}).unwrap();
        assert_eq!(value, json!({"type": "pong", "data": {}}));
    }

    #[test]
    fn test_parse_client_messages() {
        let project_id = Uuid::new_v4();
        let join = json!({"type": "client:join_project_room", "data": {"projectId": project_id}});
        assert_eq!(
            ClientMessage::parse(&join.to_string()),
            Ok(ClientMessage::JoinProjectRoom { project_id })
        );

        let leave = json!({"type": "client:leave_project_room", "data": {"project_id": project_id}});
        assert_eq!(
            ClientMessage::parse(&leave.to_string()),
            Ok(ClientMessage::LeaveProjectRoom { project_id })
        );

        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#), Ok(ClientMessage::Ping));
        assert_eq!(ClientMessage::parse(r#"{"type":"ping","data":{}}"#), Ok(ClientMessage::Ping));
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        assert_eq!(ClientMessage::parse("nope"), Err("Invalid JSON format".to_string()));
        assert_eq!(ClientMessage::parse("{}"), Err("Missing event type".to_string()));
        assert_eq!(
            ClientMessage::parse(r#"{"type":"client:join_project_room","data":{}}"#),
            Err("Missing projectId".to_string())
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"dance"}"#),
            Err("Unknown event type: dance".to_string())
        );
    }
}
