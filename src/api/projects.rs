use super::auth::{CurrentUser, OriginConnection};
use super::{authorize, authorize_owner, ApiError, AppState};
use crate::board::{self, BoardView};
use crate::realtime::BoardEvent;
use crate::store::NewProject;
use crate::tables::{Activity, Column, Project, ProjectStatus};
use crate::PROJECTS_API;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

// * Types ....................................................................

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub deadline: Option<chrono::NaiveDateTime>,
    #[serde(default)]
    pub members: Vec<Uuid>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub deadline: Option<chrono::NaiveDateTime>,
}

impl UpdateProjectRequest {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.deadline.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMembersRequest {
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedProject {
    pub project: Project,
    pub columns: Vec<Column>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembersAdded {
    pub project: Project,
    pub added: Vec<Uuid>,
}

// * Router ...................................................................

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            format!("/{PROJECTS_API}").as_str(),
            get(list_projects).post(create_project),
        )
        .route(
            format!("/{PROJECTS_API}/:id").as_str(),
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route(
            format!("/{PROJECTS_API}/:id/members").as_str(),
            post(add_members),
        )
        .route(format!("/{PROJECTS_API}/:id/board").as_str(), get(get_board))
        .route(
            format!("/{PROJECTS_API}/:id/activities").as_str(),
            get(list_activities),
        )
}

// * Handlers .................................................................

pub async fn create_project(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<CreatedProject>), ApiError> {
    let new = NewProject {
        name: payload.name,
        description: payload.description,
        deadline: payload.deadline,
        owner_id: user_id,
        members: payload.members,
        default_columns: state.config.default_columns.clone(),
    };
    let (project, columns) = state.with_store(move |store| store.create_project(new)).await?;
    Ok((StatusCode::CREATED, Json(CreatedProject { project, columns })))
}

pub async fn list_projects(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<Project>>, ApiError> {
    let projects = state
        .with_store(move |store| store.list_projects_for(user_id))
        .await?;
    Ok(Json(projects))
}

pub async fn get_project(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Project>, ApiError> {
    let project = state
        .with_store(move |store| store.find_project(project_id))
        .await?;
    authorize(&project, user_id)?;
    Ok(Json(project))
}

pub async fn update_project(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    if payload.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }
    let status = match payload.status.as_deref() {
        Some(raw) => Some(ProjectStatus::parse(raw).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Invalid status: {raw}. Must be one of: active, on-hold, completed"
            ))
        })?),
        None => None,
    };
    if let Some(name) = &payload.name {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("project name is required".to_string()));
        }
    }

    let project = state
        .with_store(move |store| store.find_project(project_id))
        .await?;
    authorize_owner(&project, user_id)?;

    let project = state
        .with_store(move |store| {
            store.update_project(project_id, &mut |project| {
                if let Some(name) = &payload.name {
                    project.name = name.trim().to_string();
                }
                if let Some(description) = &payload.description {
                    project.description = Some(description.clone());
                }
                if let Some(status) = status {
                    project.status = status;
                }
                if let Some(deadline) = payload.deadline {
                    project.deadline = Some(deadline);
                }
                Ok(())
            })
        })
        .await?;

    state.emit(
        project_id,
        BoardEvent::ProjectUpdated {
            project: project.clone(),
        },
        origin,
    );
    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let project = state
        .with_store(move |store| store.find_project(project_id))
        .await?;
    authorize_owner(&project, user_id)?;

    state
        .with_store(move |store| store.delete_project(project_id))
        .await?;

    state.emit(project_id, BoardEvent::ProjectDeleted { project_id }, origin);
    state.hub.close_room(project_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_members(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    origin: OriginConnection,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<AddMembersRequest>,
) -> Result<Json<MembersAdded>, ApiError> {
    if payload.user_ids.is_empty() {
        return Err(ApiError::BadRequest("userIds must not be empty".to_string()));
    }
    let project = state
        .with_store(move |store| store.find_project(project_id))
        .await?;
    authorize_owner(&project, user_id)?;

    let (project, added) = state
        .with_store(move |store| store.add_members(project_id, &payload.user_ids))
        .await?;

    if !added.is_empty() {
        info!(project_id = %project_id, added = added.len(), "members added");
        state.emit(
            project_id,
            BoardEvent::ProjectUpdated {
                project: project.clone(),
            },
            origin,
        );
    }
    Ok(Json(MembersAdded { project, added }))
}

pub async fn get_board(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<BoardView>, ApiError> {
    let (project, columns, tasks) = state
        .with_store(move |store| store.load_board(project_id))
        .await?;
    authorize(&project, user_id)?;

    let (view, report) = board::assemble(project, columns, tasks);
    if !report.is_clean() {
        warn!(
            project_id = %project_id,
            dangling_columns = ?report.dangling_columns,
            dangling_tasks = ?report.dangling_tasks,
            unlisted_columns = ?report.unlisted_columns,
            unplaced_tasks = ?report.unplaced_tasks,
            "board order references are inconsistent"
        );
    }
    Ok(Json(view))
}

/// The project's activity log, newest first.
pub async fn list_activities(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let project = state
        .with_store(move |store| store.find_project(project_id))
        .await?;
    authorize(&project, user_id)?;

    let activities = state
        .with_store(move |store| store.list_activities(project_id))
        .await?;
    Ok(Json(activities))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{create_task_in, setup_test_state};
    use crate::tables::ActivityAction;

    fn create_request(name: &str) -> CreateProjectRequest {
        CreateProjectRequest {
            name: name.to_string(),
            description: Some("Q3 launch".to_string()),
            deadline: None,
            members: vec![],
        }
    }

    #[tokio::test]
    async fn test_project_crud() {
        let state = setup_test_state();
        let owner = Uuid::new_v4();

        let (status, created) = create_project(
            State(state.clone()),
            CurrentUser(owner),
            Json(create_request("Launch")),
        )
        .await
        .expect("Failed to create project");
        assert_eq!(status, StatusCode::CREATED);
        let project_id = created.0.project.id;
        let titles: Vec<&str> = created.0.columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["To Do", "In Progress", "Done"]);

        let listed = list_projects(State(state.clone()), CurrentUser(owner))
            .await
            .expect("Failed to list projects");
        assert_eq!(listed.0.len(), 1);

        let updated = update_project(
            State(state.clone()),
            CurrentUser(owner),
            OriginConnection(None),
            Path(project_id),
            Json(UpdateProjectRequest {
                status: Some("on-hold".to_string()),
                ..Default::default()
            }),
        )
        .await
        .expect("Failed to update project");
        assert_eq!(updated.0.status, ProjectStatus::OnHold);

        let status = delete_project(
            State(state.clone()),
            CurrentUser(owner),
            OriginConnection(None),
            Path(project_id),
        )
        .await
        .expect("Failed to delete project");
        assert_eq!(status, StatusCode::NO_CONTENT);

        let missing = get_project(State(state.clone()), CurrentUser(owner), Path(project_id)).await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_rejects_bad_input() {
        let state = setup_test_state();
        let owner = Uuid::new_v4();
        let (_, created) = create_project(
            State(state.clone()),
            CurrentUser(owner),
            Json(create_request("Launch")),
        )
        .await
        .unwrap();
        let project_id = created.0.project.id;

        let empty = update_project(
            State(state.clone()),
            CurrentUser(owner),
            OriginConnection(None),
            Path(project_id),
            Json(UpdateProjectRequest::default()),
        )
        .await;
        assert!(matches!(empty, Err(ApiError::BadRequest(_))));

        let bad_status = update_project(
            State(state.clone()),
            CurrentUser(owner),
            OriginConnection(None),
            Path(project_id),
            Json(UpdateProjectRequest {
                status: Some("paused".to_string()),
                ..Default::default()
            }),
        )
        .await;
        assert!(matches!(bad_status, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_membership_gate() {
        let state = setup_test_state();
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let (_, created) = create_project(
            State(state.clone()),
            CurrentUser(owner),
            Json(create_request("Launch")),
        )
        .await
        .unwrap();
        let project_id = created.0.project.id;

        let forbidden = get_board(State(state.clone()), CurrentUser(stranger), Path(project_id)).await;
        assert!(matches!(forbidden, Err(ApiError::Forbidden(_))));

        let added = add_members(
            State(state.clone()),
            CurrentUser(owner),
            OriginConnection(None),
            Path(project_id),
            Json(AddMembersRequest {
                user_ids: vec![member, owner, member],
            }),
        )
        .await
        .expect("Failed to add members");
        assert_eq!(added.0.added, vec![member]);

        let board = get_board(State(state.clone()), CurrentUser(member), Path(project_id))
            .await
            .expect("Member should see the board");
        assert_eq!(board.0.columns.len(), 3);

        // members may read but only the owner manages the project
        let not_owner = delete_project(
            State(state.clone()),
            CurrentUser(member),
            OriginConnection(None),
            Path(project_id),
        )
        .await;
        assert!(matches!(not_owner, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_activities_are_for_members_only() {
        let state = setup_test_state();
        let owner = Uuid::new_v4();
        let (_, created) = create_project(
            State(state.clone()),
            CurrentUser(owner),
            Json(create_request("Launch")),
        )
        .await
        .unwrap();
        let project_id = created.0.project.id;
        let todo = created.0.columns[0].id;
        let task = create_task_in(&state, owner, todo, "t1").await;
        state
            .store
            .add_comment(task.id, owner, "on it")
            .expect("Failed to comment");

        let log = list_activities(State(state.clone()), CurrentUser(owner), Path(project_id))
            .await
            .expect("Failed to list activities");
        let actions: Vec<ActivityAction> = log.0.iter().map(|a| a.action).collect();
        assert_eq!(actions, vec![ActivityAction::AddedComment, ActivityAction::CreatedTask]);
        assert_eq!(log.0[1].details["title"], "t1");

        let stranger = list_activities(
            State(state.clone()),
            CurrentUser(Uuid::new_v4()),
            Path(project_id),
        )
        .await;
        assert!(matches!(stranger, Err(ApiError::Forbidden(_))));
    }
}
