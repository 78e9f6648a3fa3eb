use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    Router,
};
use axum_test::TestServer;
use kanban_board_api::{api, api::AppState, config::Config, CONNECTION_HEADER, USER_HEADER};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn setup() -> Router {
    api::create_router(AppState::in_memory(Config::default()))
}

fn connection_header(connection: Uuid) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(CONNECTION_HEADER),
        HeaderValue::from_str(&connection.to_string()).unwrap(),
    )
}

fn user_header(user: Uuid) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(USER_HEADER),
        HeaderValue::from_str(&user.to_string()).unwrap(),
    )
}

fn ids(values: &Value) -> Vec<String> {
    values
        .as_array()
        .unwrap()
        .iter()
        .map(|task| task["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_board_flow() {
    let app = TestServer::new(setup()).unwrap();
    let owner = Uuid::new_v4();
    let (name, value) = user_header(owner);

    // Create a project; default columns come with it
    let created = app
        .post("/projects")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "name": "Launch" }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let created: Value = created.json();
    let project_id = created["project"]["id"].as_str().unwrap().to_string();
    let columns = created["columns"].as_array().unwrap().clone();
    assert_eq!(columns.len(), 3);
    let todo = columns[0]["id"].as_str().unwrap().to_string();
    let doing = columns[1]["id"].as_str().unwrap().to_string();

    // Two tasks in To Do
    let mut task_ids = Vec::new();
    for title in ["write docs", "ship it"] {
        let response = app
            .post(&format!("/columns/{}/tasks", todo))
            .add_header(name.clone(), value.clone())
            .json(&json!({ "title": title }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        let task: Value = response.json();
        task_ids.push(task["id"].as_str().unwrap().to_string());
    }

    // Move the second task to the top of Doing
    let moved = app
        .patch(&format!("/tasks/{}/move", task_ids[1]))
        .add_header(name.clone(), value.clone())
        .json(&json!({ "targetColumnId": doing, "position": 0 }))
        .await;
    assert_eq!(moved.status_code(), StatusCode::OK);
    let moved: Value = moved.json();
    assert_eq!(moved["columnId"], doing);

    let board: Value = app
        .get(&format!("/projects/{}/board", project_id))
        .add_header(name.clone(), value.clone())
        .await
        .json();
    assert_eq!(ids(&board["columns"][0]["tasks"]), vec![task_ids[0].clone()]);
    assert_eq!(ids(&board["columns"][1]["tasks"]), vec![task_ids[1].clone()]);

    // Deleting To Do hands its task to Doing, in front
    let deleted = app
        .delete(&format!("/columns/{}", todo))
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(deleted.status_code(), StatusCode::OK);
    let deleted: Value = deleted.json();
    assert_eq!(deleted["targetColumnId"], doing);

    let board: Value = app
        .get(&format!("/projects/{}/board", project_id))
        .add_header(name, value)
        .await
        .json();
    assert_eq!(board["columns"].as_array().unwrap().len(), 2);
    assert_eq!(
        ids(&board["columns"][0]["tasks"]),
        vec![task_ids[0].clone(), task_ids[1].clone()]
    );
}

#[tokio::test]
async fn test_requests_without_user_are_rejected() {
    let app = TestServer::new(setup()).unwrap();

    let response = app.get("/projects").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_strangers_cannot_read_a_board() {
    let app = TestServer::new(setup()).unwrap();
    let (name, value) = user_header(Uuid::new_v4());
    let created: Value = app
        .post("/projects")
        .add_header(name, value)
        .json(&json!({ "name": "Private" }))
        .await
        .json();
    let project_id = created["project"]["id"].as_str().unwrap();

    let (name, value) = user_header(Uuid::new_v4());
    let response = app
        .get(&format!("/projects/{}/board", project_id))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health() {
    let response = setup()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_activity_log() {
    let app = TestServer::new(setup()).unwrap();
    let (name, value) = user_header(Uuid::new_v4());
    let created: Value = app
        .post("/projects")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "name": "Launch" }))
        .await
        .json();
    let project_id = created["project"]["id"].as_str().unwrap().to_string();
    let todo = created["columns"][0]["id"].as_str().unwrap().to_string();
    let doing = created["columns"][1]["id"].as_str().unwrap().to_string();

    let task: Value = app
        .post(&format!("/columns/{}/tasks", todo))
        .add_header(name.clone(), value.clone())
        .json(&json!({ "title": "write docs" }))
        .await
        .json();
    let task_id = task["id"].as_str().unwrap().to_string();
    app.patch(&format!("/tasks/{}/move", task_id))
        .add_header(name.clone(), value.clone())
        .json(&json!({ "targetColumnId": doing, "position": 7 }))
        .await
        .assert_status_ok();

    let log: Value = app
        .get(&format!("/projects/{}/activities", project_id))
        .add_header(name, value)
        .await
        .json();
    let log = log.as_array().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0]["action"], "moved-task");
    assert_eq!(log[0]["taskId"], task_id);
    assert_eq!(log[0]["details"]["fromColumnId"], todo);
    assert_eq!(log[0]["details"]["toColumnId"], doing);
    assert_eq!(log[0]["details"]["position"], 0);
    assert_eq!(log[1]["action"], "created-task");

    let (name, value) = user_header(Uuid::new_v4());
    let response = app
        .get(&format!("/projects/{}/activities", project_id))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_foreign_connection_header_does_not_silence_echo() {
    let state = AppState::in_memory(Config::default());
    let app = TestServer::new(api::create_router(state.clone())).unwrap();
    let (owner, other) = (Uuid::new_v4(), Uuid::new_v4());
    let (name, value) = user_header(owner);
    let created: Value = app
        .post("/projects")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "name": "Launch", "members": [other] }))
        .await
        .json();
    let project_id: Uuid = created["project"]["id"].as_str().unwrap().parse().unwrap();
    let todo = created["columns"][0]["id"].as_str().unwrap().to_string();
    let (connection, mut receiver) = state.hub.connect(other);
    state.hub.join(connection, project_id);

    // the owner claims the other member's socket as their own
    let (header, claimed) = connection_header(connection);
    app.post(&format!("/columns/{}/tasks", todo))
        .add_header(name, value)
        .add_header(header, claimed)
        .json(&json!({ "title": "write docs" }))
        .await
        .assert_status(StatusCode::CREATED);

    let text = receiver.try_recv().expect("Expected the task_created event");
    let event: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(event["type"], "server:task_created");
}
