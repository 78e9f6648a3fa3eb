use super::auth::{CurrentUser, OriginConnection};
use super::{task_for_member, ApiError, AppState};
use crate::realtime::BoardEvent;
use crate::tables::Comment;
use crate::TASKS_API;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

pub fn create_router() -> Router<AppState> {
    Router::new().route(
        format!("/{TASKS_API}/:id/comments").as_str(),
        get(list_comments).post(add_comment),
    )
}

pub async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let (task, _) = task_for_member(&state, task_id, user_id).await?;

    let comment = state
        .with_store(move |store| store.add_comment(task_id, user_id, &payload.content))
        .await?;

    state.emit(
        task.project_id,
        BoardEvent::CommentAdded {
            task_id,
            comment: comment.clone(),
        },
        origin,
    );
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Oldest first.
pub async fn list_comments(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    task_for_member(&state, task_id, user_id).await?;
    let comments = state
        .with_store(move |store| store.list_comments(task_id))
        .await?;
    Ok(Json(comments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{create_task_in, seed_project, setup_test_state};

    #[tokio::test]
    async fn test_comments() {
        let state = setup_test_state();
        let owner = Uuid::new_v4();
        let (_, columns) = seed_project(&state, owner).await;
        let task = create_task_in(&state, owner, columns[0].id, "t1").await;

        for content in ["first", "second"] {
            let (status, _) = add_comment(
                State(state.clone()),
                CurrentUser(owner),
                OriginConnection(None),
                Path(task.id),
                Json(CreateCommentRequest {
                    content: content.to_string(),
                }),
            )
            .await
            .expect("Failed to add comment");
            assert_eq!(status, StatusCode::CREATED);
        }

        let blank = add_comment(
            State(state.clone()),
            CurrentUser(owner),
            OriginConnection(None),
            Path(task.id),
            Json(CreateCommentRequest {
                content: " ".to_string(),
            }),
        )
        .await;
        assert!(matches!(blank, Err(ApiError::BadRequest(_))));

        let listed = list_comments(State(state.clone()), CurrentUser(owner), Path(task.id))
            .await
            .expect("Failed to list comments");
        let contents: Vec<&str> = listed.0.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert!(listed.0.iter().all(|c| c.author_id == owner));
    }
}
