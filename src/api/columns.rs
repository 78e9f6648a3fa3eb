use super::auth::{CurrentUser, OriginConnection};
use super::{authorize, column_for_member, ApiError, AppState};
use crate::realtime::BoardEvent;
use crate::tables::Column;
use crate::{COLUMNS_API, PROJECTS_API};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct ColumnTitleRequest {
    pub title: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MoveColumnRequest {
    /// Target index in `columnOrder`; omitted moves the column to the end.
    pub index: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMoved {
    pub column: Column,
    pub position: usize,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDeleted {
    pub column_id: Uuid,
    pub target_column_id: Option<Uuid>,
    pub relocated_task_ids: Vec<Uuid>,
    pub deleted_task_ids: Vec<Uuid>,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            format!("/{PROJECTS_API}/:id/{COLUMNS_API}").as_str(),
            post(create_column),
        )
        .route(
            format!("/{COLUMNS_API}/:id").as_str(),
            patch(rename_column).delete(delete_column),
        )
        .route(format!("/{COLUMNS_API}/:id/move").as_str(), patch(move_column))
}

pub async fn create_column(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<ColumnTitleRequest>,
) -> Result<(StatusCode, Json<Column>), ApiError> {
    let project = state
        .with_store(move |store| store.find_project(project_id))
        .await?;
    authorize(&project, user_id)?;

    let column = state
        .with_store(move |store| store.create_column(project_id, &payload.title))
        .await?;

    state.emit(
        project_id,
        BoardEvent::ColumnCreated {
            column: column.clone(),
        },
        origin,
    );
    Ok((StatusCode::CREATED, Json(column)))
}

pub async fn rename_column(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(column_id): Path<Uuid>,
    Json(payload): Json<ColumnTitleRequest>,
) -> Result<Json<Column>, ApiError> {
    column_for_member(&state, column_id, user_id).await?;

    let column = state
        .with_store(move |store| store.rename_column(column_id, &payload.title))
        .await?;

    state.emit(
        column.project_id,
        BoardEvent::ColumnUpdated {
            column: column.clone(),
        },
        origin,
    );
    Ok(Json(column))
}

pub async fn move_column(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(column_id): Path<Uuid>,
    Json(payload): Json<MoveColumnRequest>,
) -> Result<Json<ColumnMoved>, ApiError> {
    column_for_member(&state, column_id, user_id).await?;

    let (column, position) = state
        .with_store(move |store| store.move_column(column_id, payload.index))
        .await?;

    state.emit(
        column.project_id,
        BoardEvent::ColumnMoved {
            column_id,
            position,
        },
        origin,
    );
    Ok(Json(ColumnMoved { column, position }))
}

pub async fn delete_column(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(column_id): Path<Uuid>,
) -> Result<Json<ColumnDeleted>, ApiError> {
    let (column, _) = column_for_member(&state, column_id, user_id).await?;

    let deletion = state
        .with_store(move |store| store.delete_column(column_id))
        .await?;

    let response = ColumnDeleted {
        column_id,
        target_column_id: deletion.target_column_id,
        relocated_task_ids: deletion.relocated_task_ids,
        deleted_task_ids: deletion.deleted_task_ids,
    };
    state.emit(
        column.project_id,
        BoardEvent::ColumnDeleted {
            column_id,
            target_column_id: response.target_column_id,
            relocated_task_ids: response.relocated_task_ids.clone(),
            deleted_task_ids: response.deleted_task_ids.clone(),
        },
        origin,
    );
    Ok(Json(response))
}
