use super::auth::{CurrentUser, OriginConnection};
use super::{authorize, ApiError, AppState};
use crate::realtime::BoardEvent;
use crate::tables::Label;
use crate::{LABELS_API, PROJECTS_API};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateLabelRequest {
    pub text: String,
    pub color: String,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            format!("/{PROJECTS_API}/:id/{LABELS_API}").as_str(),
            get(list_labels).post(create_label),
        )
        .route(format!("/{LABELS_API}/:id").as_str(), delete(delete_label))
}

pub async fn create_label(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<CreateLabelRequest>,
) -> Result<(StatusCode, Json<Label>), ApiError> {
    let project = state
        .with_store(move |store| store.find_project(project_id))
        .await?;
    authorize(&project, user_id)?;

    let label = state
        .with_store(move |store| store.create_label(project_id, &payload.text, &payload.color))
        .await?;
    Ok((StatusCode::CREATED, Json(label)))
}

pub async fn list_labels(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Label>>, ApiError> {
    let project = state
        .with_store(move |store| store.find_project(project_id))
        .await?;
    authorize(&project, user_id)?;

    let labels = state
        .with_store(move |store| store.list_labels(project_id))
        .await?;
    Ok(Json(labels))
}

/// Deletes the label and pulls it from every task that carried it. Each
/// touched task is broadcast as `task_updated`.
pub async fn delete_label(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(label_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let project = state
        .with_store(move |store| {
            let label = store.find_label(label_id)?;
            store.find_project(label.project_id)
        })
        .await?;
    authorize(&project, user_id)?;

    let (_, touched) = state
        .with_store(move |store| store.delete_label(label_id))
        .await?;

    for task in touched {
        state.emit(project.id, BoardEvent::TaskUpdated { task }, origin);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{create_task_in, seed_project, setup_test_state};

    #[tokio::test]
    async fn test_label_lifecycle() {
        let state = setup_test_state();
        let owner = Uuid::new_v4();
        let (project, columns) = seed_project(&state, owner).await;

        let bad_color = create_label(
            State(state.clone()),
            CurrentUser(owner),
            Path(project.id),
            Json(CreateLabelRequest {
                text: "bug".to_string(),
                color: "red".to_string(),
            }),
        )
        .await;
        assert!(matches!(bad_color, Err(ApiError::BadRequest(_))));

        let (status, label) = create_label(
            State(state.clone()),
            CurrentUser(owner),
            Path(project.id),
            Json(CreateLabelRequest {
                text: "bug".to_string(),
                color: "#d73a4a".to_string(),
            }),
        )
        .await
        .expect("Failed to create label");
        assert_eq!(status, StatusCode::CREATED);
        let label_id = label.0.id;

        let task = create_task_in(&state, owner, columns[0].id, "t1").await;
        state
            .store
            .update_task(task.id, owner, &mut |task| {
                task.labels.push(label_id);
                Ok(())
            })
            .unwrap();

        let status = delete_label(
            State(state.clone()),
            CurrentUser(owner),
            OriginConnection(None),
            Path(label_id),
        )
        .await
        .expect("Failed to delete label");
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.store.find_task(task.id).unwrap().labels.is_empty());

        let listed = list_labels(State(state.clone()), CurrentUser(owner), Path(project.id))
            .await
            .expect("Failed to list labels");
        assert!(listed.0.is_empty());
    }
}
