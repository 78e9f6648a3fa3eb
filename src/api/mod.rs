pub mod auth;
pub mod columns;
pub mod comments;
mod error;
pub mod labels;
pub mod projects;
pub mod realtime;
mod state;
pub mod tasks;
#[cfg(test)]
pub(crate) mod tests;

pub use auth::{CurrentUser, OriginConnection};
pub use error::ApiError;
pub use state::AppState;

use crate::tables::{Column, Project, Task};
use crate::HEALTH_API;
use axum::{
    extract::{DefaultBodyLimit, State},
    routing::get,
    Router,
};
use axum_extra::response::ErasedJson;
use serde_json::json;
use uuid::Uuid;

const MAX_BODY_SIZE: usize = 1024 * 1024; // 1 MB

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(projects::create_router())
        .merge(columns::create_router())
        .merge(tasks::create_router())
        .merge(comments::create_router())
        .merge(labels::create_router())
        .merge(realtime::create_router())
        .route(format!("/{HEALTH_API}").as_str(), get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> ErasedJson {
    ErasedJson::pretty(json!({
        "status": "ok",
        "defaultColumns": state.config.default_columns,
    }))
}

// * Membership gate ..........................................................

pub fn authorize(project: &Project, user_id: Uuid) -> Result<(), ApiError> {
    if project.has_access(user_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Not authorized to access this project".to_string(),
        ))
    }
}

pub fn authorize_owner(project: &Project, user_id: Uuid) -> Result<(), ApiError> {
    if project.is_owner(user_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Only the project owner can do this".to_string(),
        ))
    }
}

/// Loads a column with its project and applies the membership gate.
pub(crate) async fn column_for_member(
    state: &AppState,
    column_id: Uuid,
    user_id: Uuid,
) -> Result<(Column, Project), ApiError> {
    let (column, project) = state
        .with_store(move |store| {
            let column = store.find_column(column_id)?;
            let project = store.find_project(column.project_id)?;
            Ok((column, project))
        })
        .await?;
    authorize(&project, user_id)?;
    Ok((column, project))
}

/// Loads a task with its project and applies the membership gate.
pub(crate) async fn task_for_member(
    state: &AppState,
    task_id: Uuid,
    user_id: Uuid,
) -> Result<(Task, Project), ApiError> {
    let (task, project) = state
        .with_store(move |store| {
            let task = store.find_task(task_id)?;
            let project = store.find_project(task.project_id)?;
            Ok((task, project))
        })
        .await?;
    authorize(&project, user_id)?;
    Ok((task, project))
}
