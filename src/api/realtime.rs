//! WebSocket endpoints. Each socket gets a hub connection; a writer task
//! drains the hub queue into the socket while the reader handles room
//! membership and pings.

use super::auth::resolve_user;
use super::{authorize, ApiError, AppState};
use crate::realtime::{ClientMessage, ConnectionId, RoomMessage};
use crate::{PROJECTS_API, WS_API};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct SocketParams {
    pub user_id: Option<Uuid>,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(format!("/{WS_API}").as_str(), get(connect))
        .route(
            format!("/{WS_API}/{PROJECTS_API}/:id").as_str(),
            get(connect_to_project),
        )
}

async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SocketParams>,
) -> Result<Response, ApiError> {
    let user_id = resolve_user(&headers, params.user_id)?;
    Ok(ws.on_upgrade(move |socket| serve_socket(socket, state, user_id, None)))
}

async fn connect_to_project(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    Query(params): Query<SocketParams>,
) -> Result<Response, ApiError> {
    let user_id = resolve_user(&headers, params.user_id)?;
    let project = state
        .with_store(move |store| store.find_project(project_id))
        .await?;
    authorize(&project, user_id)?;
    Ok(ws.on_upgrade(move |socket| serve_socket(socket, state, user_id, Some(project_id))))
}

async fn serve_socket(socket: WebSocket, state: AppState, user_id: Uuid, room: Option<Uuid>) {
    let (connection_id, mut outbound) = state.hub.connect(user_id);
    let (mut sink, mut stream) = socket.split();

    state.hub.send_to(
        connection_id,
        &RoomMessage::Ready {
            connection_id,
            user_id,
        },
    );
    if let Some(project_id) = room {
        join_room(&state, connection_id, project_id);
    }

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_client_message(&state, connection_id, user_id, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(connection_id = %connection_id, error = %err, "socket read failed");
                break;
            }
        }
    }

    // dropping the hub entry closes the queue, which ends the writer
    state.hub.disconnect(connection_id);
    if let Err(err) = writer.await {
        debug!(connection_id = %connection_id, error = %err, "socket writer ended abnormally");
    }
}

fn join_room(state: &AppState, connection_id: ConnectionId, project_id: Uuid) {
    state.hub.join(connection_id, project_id);
    state.hub.send_to(
        connection_id,
        &RoomMessage::Joined {
            project_id,
            room_size: state.hub.room_size(project_id),
            room_users: state.hub.room_users(project_id),
        },
    );
}

pub(crate) async fn handle_client_message(
    state: &AppState,
    connection_id: ConnectionId,
    user_id: Uuid,
    text: &str,
) {
    let reply_error = |message: String| {
        state
            .hub
            .send_to(connection_id, &RoomMessage::Error { message });
    };

    match ClientMessage::parse(text) {
        Ok(ClientMessage::JoinProjectRoom { project_id }) => {
            let allowed = state
                .with_store(move |store| store.find_project(project_id))
                .await
                .and_then(|project| authorize(&project, user_id));
            match allowed {
                Ok(()) => join_room(state, connection_id, project_id),
                Err(err) => reply_error(err.to_string()),
            }
        }
        Ok(ClientMessage::LeaveProjectRoom { project_id }) => {
            if state.hub.leave(connection_id, project_id) {
                state
                    .hub
                    .send_to(connection_id, &RoomMessage::Left { project_id });
            } else {
                reply_error("Not in project room".to_string());
            }
        }
        Ok(ClientMessage::Ping) => {
            state.hub.send_to(connection_id, &RoomMessage::Pong {});
        }
        Err(message) => {
            warn!(connection_id = %connection_id, error = %message, "rejected socket message");
            reply_error(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{seed_project, setup_test_state};
    use serde_json::{json, Value};
    use tokio::sync::mpsc::Receiver;

    fn next(receiver: &mut Receiver<String>) -> Value {
        let text = receiver.try_recv().expect("Expected a queued message");
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_join_ping_leave() {
        let state = setup_test_state();
        let owner = Uuid::new_v4();
        let (project, _) = seed_project(&state, owner).await;
        let (connection_id, mut rx) = state.hub.connect(owner);

        let join = json!({"type": "client:join_project_room", "data": {"projectId": project.id}});
        handle_client_message(&state, connection_id, owner, &join.to_string()).await;
        let joined = next(&mut rx);
        assert_eq!(joined["type"], "room:joined");
        assert_eq!(joined["data"]["roomSize"], 1);

        handle_client_message(&state, connection_id, owner, r#"{"type":"ping"}"#).await;
        assert_eq!(next(&mut rx)["type"], "pong");

        let leave = json!({"type": "client:leave_project_room", "data": {"projectId": project.id}});
        handle_client_message(&state, connection_id, owner, &leave.to_string()).await;
        assert_eq!(next(&mut rx)["type"], "room:left");
        assert_eq!(state.hub.room_size(project.id), 0);
    }

    #[tokio::test]
    async fn test_stranger_cannot_join() {
        let state = setup_test_state();
        let (project, _) = seed_project(&state, Uuid::new_v4()).await;
        let stranger = Uuid::new_v4();
        let (connection_id, mut rx) = state.hub.connect(stranger);

        let join = json!({"type": "client:join_project_room", "data": {"projectId": project.id}});
        handle_client_message(&state, connection_id, stranger, &join.to_string()).await;

        assert_eq!(next(&mut rx)["type"], "error");
        assert_eq!(state.hub.room_size(project.id), 0);
    }

    #[tokio::test]
    async fn test_bad_frame_gets_error_reply() {
        let state = setup_test_state();
        let user = Uuid::new_v4();
        let (connection_id, mut rx) = state.hub.connect(user);

        handle_client_message(&state, connection_id, user, "not json").await;

        let reply = next(&mut rx);
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["data"]["message"], "Invalid JSON format");
    }
}
