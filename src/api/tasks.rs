use super::auth::{CurrentUser, OriginConnection};
use super::{column_for_member, task_for_member, ApiError, AppState};
use crate::realtime::BoardEvent;
use crate::store::{NewTask, StoreError, TaskEdit};
use crate::tables::{ChecklistItem, Task};
use crate::{COLUMNS_API, TASKS_API};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// * Types ....................................................................

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<chrono::NaiveDateTime>,
    #[serde(default)]
    pub assignees: Vec<Uuid>,
    #[serde(default)]
    pub labels: Vec<Uuid>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<chrono::NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTaskRequest {
    pub target_column_id: Uuid,
    /// 0-based index in the destination column, omitted appends.
    pub position: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssigneeRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLabelRequest {
    pub label_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChecklistItemRequest {
    pub text: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateChecklistItemRequest {
    pub text: Option<String>,
    pub completed: Option<bool>,
}

// * Router ...................................................................

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            format!("/{COLUMNS_API}/:id/{TASKS_API}").as_str(),
            post(create_task),
        )
        .route(
            format!("/{TASKS_API}/:id").as_str(),
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route(format!("/{TASKS_API}/:id/move").as_str(), patch(move_task))
        .route(
            format!("/{TASKS_API}/:id/assignees").as_str(),
            post(add_assignee),
        )
        .route(
            format!("/{TASKS_API}/:id/assignees/:user_id").as_str(),
            delete(remove_assignee),
        )
        .route(format!("/{TASKS_API}/:id/labels").as_str(), post(add_label))
        .route(
            format!("/{TASKS_API}/:id/labels/:label_id").as_str(),
            delete(remove_label),
        )
        .route(
            format!("/{TASKS_API}/:id/checklist").as_str(),
            post(add_checklist_item),
        )
        .route(
            format!("/{TASKS_API}/:id/checklist/:index").as_str(),
            patch(update_checklist_item).delete(delete_checklist_item),
        )
}

// * Handlers .................................................................

pub async fn create_task(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(column_id): Path<Uuid>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let (column, project) = column_for_member(&state, column_id, user_id).await?;
    if let Some(outsider) = payload.assignees.iter().find(|id| !project.has_access(**id)) {
        return Err(ApiError::BadRequest(format!(
            "User {outsider} is not a member of this project"
        )));
    }

    let project_id = column.project_id;
    let task = state
        .with_store(move |store| {
            let known = store.list_labels(project_id)?;
            if let Some(label) = payload.labels.iter().find(|l| !known.iter().any(|k| k.id == **l)) {
                return Err(StoreError::Invalid(format!(
                    "Label {label} does not belong to this project"
                )));
            }
            store.create_task(
                column_id,
                NewTask {
                    title: payload.title,
                    description: payload.description,
                    creator_id: user_id,
                    due_date: payload.due_date,
                    assignees: payload.assignees,
                    labels: payload.labels,
                },
            )
        })
        .await?;

    state.emit(
        project_id,
        BoardEvent::TaskCreated { task: task.clone() },
        origin,
    );
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    let (task, _) = task_for_member(&state, task_id, user_id).await?;
    Ok(Json(task))
}

pub async fn update_task(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    if payload.title.is_none() && payload.description.is_none() && payload.due_date.is_none() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }
    task_for_member(&state, task_id, user_id).await?;

    edit_task(&state, task_id, user_id, origin, move |task| {
        if let Some(title) = &payload.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(StoreError::Invalid("task title is required".to_string()));
            }
            task.title = title.to_string();
        }
        if let Some(description) = &payload.description {
            task.description = Some(description.clone());
        }
        if let Some(due_date) = payload.due_date {
            task.due_date = Some(due_date);
        }
        Ok(())
    })
    .await
    .map(Json)
}

pub async fn move_task(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<MoveTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    let (task, _) = task_for_member(&state, task_id, user_id).await?;

    let outcome = state
        .with_store(move |store| {
            store.move_task(task_id, user_id, payload.target_column_id, payload.position)
        })
        .await?;

    state.emit(
        task.project_id,
        BoardEvent::TaskMoved {
            task_id,
            source_column_id: outcome.source_column_id,
            dest_column_id: outcome.dest_column_id,
            position: outcome.position,
        },
        origin,
    );
    Ok(Json(outcome.task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    task_for_member(&state, task_id, user_id).await?;

    let task = state
        .with_store(move |store| store.delete_task(task_id))
        .await?;

    state.emit(
        task.project_id,
        BoardEvent::TaskDeleted {
            task_id,
            column_id: task.column_id,
        },
        origin,
    );
    Ok(StatusCode::NO_CONTENT)
}

// ** Assignees, labels and checklist .........................................

pub async fn add_assignee(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<AssigneeRequest>,
) -> Result<Json<Task>, ApiError> {
    let (_, project) = task_for_member(&state, task_id, user_id).await?;
    if !project.has_access(payload.user_id) {
        return Err(ApiError::BadRequest(
            "Assignee is not a member of this project".to_string(),
        ));
    }

    let assignee = payload.user_id;
    edit_task(&state, task_id, user_id, origin, move |task| {
        if !task.assignees.contains(&assignee) {
            task.assignees.push(assignee);
        }
        Ok(())
    })
    .await
    .map(Json)
}

pub async fn remove_assignee(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path((task_id, assignee)): Path<(Uuid, Uuid)>,
) -> Result<Json<Task>, ApiError> {
    task_for_member(&state, task_id, user_id).await?;

    edit_task(&state, task_id, user_id, origin, move |task| {
        task.assignees.retain(|id| *id != assignee);
        Ok(())
    })
    .await
    .map(Json)
}

pub async fn add_label(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<TaskLabelRequest>,
) -> Result<Json<Task>, ApiError> {
    let (task, _) = task_for_member(&state, task_id, user_id).await?;
    let label_id = payload.label_id;
    let label = state
        .with_store(move |store| store.find_label(label_id))
        .await?;
    if label.project_id != task.project_id {
        return Err(ApiError::BadRequest(
            "Label does not belong to this project".to_string(),
        ));
    }

    edit_task(&state, task_id, user_id, origin, move |task| {
        if !task.labels.contains(&label_id) {
            task.labels.push(label_id);
        }
        Ok(())
    })
    .await
    .map(Json)
}

pub async fn remove_label(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path((task_id, label_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Task>, ApiError> {
    task_for_member(&state, task_id, user_id).await?;

    edit_task(&state, task_id, user_id, origin, move |task| {
        task.labels.retain(|id| *id != label_id);
        Ok(())
    })
    .await
    .map(Json)
}

pub async fn add_checklist_item(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<ChecklistItemRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let text = payload.text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Checklist text is required".to_string()));
    }
    task_for_member(&state, task_id, user_id).await?;

    let task = edit_task(&state, task_id, user_id, origin, move |task| {
        task.checklist.0.push(ChecklistItem {
            text: text.clone(),
            completed: false,
        });
        Ok(())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_checklist_item(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path((task_id, index)): Path<(Uuid, usize)>,
    Json(payload): Json<UpdateChecklistItemRequest>,
) -> Result<Json<Task>, ApiError> {
    if payload.text.is_none() && payload.completed.is_none() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }
    let text = payload.text.as_deref().map(str::trim).map(str::to_string);
    if text.as_deref() == Some("") {
        return Err(ApiError::BadRequest("Checklist text is required".to_string()));
    }
    task_for_member(&state, task_id, user_id).await?;

    edit_task(&state, task_id, user_id, origin, move |task| {
        let item = task
            .checklist
            .0
            .get_mut(index)
            .ok_or_else(|| checklist_missing(task_id))?;
        if let Some(text) = &text {
            item.text = text.clone();
        }
        if let Some(completed) = payload.completed {
            item.completed = completed;
        }
        Ok(())
    })
    .await
    .map(Json)
}

pub async fn delete_checklist_item(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path((task_id, index)): Path<(Uuid, usize)>,
) -> Result<Json<Task>, ApiError> {
    task_for_member(&state, task_id, user_id).await?;

    edit_task(&state, task_id, user_id, origin, move |task| {
        if index >= task.checklist.0.len() {
            return Err(checklist_missing(task_id));
        }
        task.checklist.0.remove(index);
        Ok(())
    })
    .await
    .map(Json)
}

// Checklist items have no id of their own, so the miss is reported against the task.
fn checklist_missing(task_id: Uuid) -> StoreError {
    StoreError::not_found("checklist item on task", task_id)
}

/// Applies `edit` in one store transaction and broadcasts `task_updated`.
async fn edit_task<F>(
    state: &AppState,
    task_id: Uuid,
    user_id: Uuid,
    origin: OriginConnection,
    mut edit: F,
) -> Result<Task, ApiError>
where
    F: FnMut(&mut Task) -> Result<(), StoreError> + Send + 'static,
{
    let task = state
        .with_store(move |store| {
            let edit: TaskEdit<'_> = &mut edit;
            store.update_task(task_id, user_id, edit)
        })
        .await?;

    state.emit(
        task.project_id,
        BoardEvent::TaskUpdated { task: task.clone() },
        origin,
    );
    Ok(task)
}
