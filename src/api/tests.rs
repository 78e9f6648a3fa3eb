use crate::api::state::AppState;
use crate::config::Config;
use crate::realtime::ConnectionId;
use crate::store::{NewProject, NewTask, Pool};
use crate::tables::{Column, Project, Task};
use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;
use dotenv::dotenv;
use lazy_static::lazy_static;
use serde_json::Value;
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

lazy_static! {
    static ref PG_STATE: AppState = {
        dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set in .env file");
        let manager = ConnectionManager::<PgConnection>::new(&database_url);
        let pool = Pool::builder()
            .max_size(5)
            .build(manager)
            .expect("Failed to create pool.");
        AppState::with_pool(pool, Config::default())
    };
}

/// A fresh in-memory state per test, so tests never see each other's boards.
pub fn setup_test_state() -> AppState {
    AppState::in_memory(Config::default())
}

pub fn setup_pg_state() -> AppState {
    PG_STATE.clone()
}

pub async fn seed_project(state: &AppState, owner: Uuid) -> (Project, Vec<Column>) {
    let default_columns = state.config.default_columns.clone();
    state
        .with_store(move |store| {
            store.create_project(NewProject {
                name: "Board".to_string(),
                description: None,
                deadline: None,
                owner_id: owner,
                members: vec![],
                default_columns,
            })
        })
        .await
        .expect("Failed to seed project")
}

pub async fn create_task_in(state: &AppState, creator: Uuid, column_id: Uuid, title: &str) -> Task {
    let title = title.to_string();
    state
        .with_store(move |store| {
            store.create_task(
                column_id,
                NewTask {
                    title,
                    description: None,
                    creator_id: creator,
                    due_date: None,
                    assignees: vec![],
                    labels: vec![],
                },
            )
        })
        .await
        .expect("Failed to create task")
}

/// A realtime connection for `user` sitting in the project room, with
/// the join notices of earlier members already drained.
pub fn subscribe(
    state: &AppState,
    user: Uuid,
    project_id: Uuid,
) -> (ConnectionId, Receiver<String>) {
    let (id, receiver) = state.hub.connect(user);
    state.hub.join(id, project_id);
    (id, receiver)
}

pub fn drain(receiver: &mut Receiver<String>) {
    while receiver.try_recv().is_ok() {}
}

pub fn next_event(receiver: &mut Receiver<String>) -> Value {
    let text = receiver.try_recv().expect("Expected a queued event");
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_board_against_postgres() {
    use crate::api::projects::get_board;
    use crate::api::CurrentUser;
    use axum::extract::{Path, State};

    let state = setup_pg_state();
    let owner = Uuid::new_v4();
    let (project, columns) = seed_project(&state, owner).await;
    let task = create_task_in(&state, owner, columns[0].id, "t1").await;

    let board = get_board(State(state.clone()), CurrentUser(owner), Path(project.id))
        .await
        .expect("Failed to load board");
    assert_eq!(board.0.task_ids(columns[0].id), vec![task.id]);

    state.store.delete_project(project.id).unwrap();
}
