use super::{
    AddMembersRequest, ClientError, ColumnDeleted, ColumnMoved, ColumnTitleRequest,
    CreateCommentRequest, CreateLabelRequest, CreateProjectRequest, CreateTaskRequest,
    CreatedProject, MembersAdded, MoveColumnRequest, MoveTaskRequest, UpdateProjectRequest,
    UpdateTaskRequest,
};
use crate::board::BoardView;
use crate::tables::{Activity, Column, Comment, Label, Project, Task};
use crate::{COLUMNS_API, LABELS_API, PROJECTS_API, TASKS_API, USER_HEADER};
use reqwest::{self, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

// * Plumbing .................................................................

fn request(method: Method, url: String, user_id: Uuid) -> RequestBuilder {
    reqwest::Client::new()
        .request(method, url)
        .header(USER_HEADER, user_id.to_string())
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body["message"].as_str().map(String::from))
        .unwrap_or_default();
    format!("{status}: {message}")
}

/// `resource` is the id the call addressed. Collection calls have none, so
/// a 404 there is reported with the server's message instead.
fn status_error(status: StatusCode, resource: Option<Uuid>, message: String) -> ClientError {
    match (status, resource) {
        (StatusCode::NOT_FOUND, Some(id)) => ClientError::NotFound(id),
        (StatusCode::FORBIDDEN, _) => ClientError::Forbidden(message),
        _ => ClientError::ServerError(message),
    }
}

async fn check(response: Response, resource: Option<Uuid>) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let message = error_message(response).await;
        return Err(status_error(status, resource, message));
    }
    Ok(response)
}

async fn send_json<T: DeserializeOwned>(
    builder: RequestBuilder,
    resource: Option<Uuid>,
) -> Result<T, ClientError> {
    let response = check(builder.send().await?, resource).await?;
    Ok(response.json::<T>().await?)
}

async fn send_with<B: Serialize, T: DeserializeOwned>(
    builder: RequestBuilder,
    body: &B,
    resource: Option<Uuid>,
) -> Result<T, ClientError> {
    send_json(builder.json(body), resource).await
}

async fn send_empty(builder: RequestBuilder, resource: Option<Uuid>) -> Result<(), ClientError> {
    check(builder.send().await?, resource).await?;
    Ok(())
}

// * Projects .................................................................

pub async fn create_project(
    base_url: &str,
    user_id: Uuid,
    project: &CreateProjectRequest,
) -> Result<CreatedProject, ClientError> {
    let url = format!("{}/{PROJECTS_API}", base_url);
    send_with(request(Method::POST, url, user_id), project, None).await
}

pub async fn fetch_projects(base_url: &str, user_id: Uuid) -> Result<Vec<Project>, ClientError> {
    let url = format!("{}/{PROJECTS_API}", base_url);
    send_json(request(Method::GET, url, user_id), None).await
}

pub async fn fetch_project(
    base_url: &str,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<Project, ClientError> {
    let url = format!("{}/{PROJECTS_API}/{}", base_url, project_id);
    send_json(request(Method::GET, url, user_id), Some(project_id)).await
}

pub async fn update_project(
    base_url: &str,
    user_id: Uuid,
    project_id: Uuid,
    update: &UpdateProjectRequest,
) -> Result<Project, ClientError> {
    let url = format!("{}/{PROJECTS_API}/{}", base_url, project_id);
    send_with(request(Method::PATCH, url, user_id), update, Some(project_id)).await
}

pub async fn delete_project(
    base_url: &str,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<(), ClientError> {
    let url = format!("{}/{PROJECTS_API}/{}", base_url, project_id);
    send_empty(request(Method::DELETE, url, user_id), Some(project_id)).await
}

pub async fn add_members(
    base_url: &str,
    user_id: Uuid,
    project_id: Uuid,
    members: &AddMembersRequest,
) -> Result<MembersAdded, ClientError> {
    let url = format!("{}/{PROJECTS_API}/{}/members", base_url, project_id);
    send_with(request(Method::POST, url, user_id), members, Some(project_id)).await
}

pub async fn fetch_board(
    base_url: &str,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<BoardView, ClientError> {
    let url = format!("{}/{PROJECTS_API}/{}/board", base_url, project_id);
    send_json(request(Method::GET, url, user_id), Some(project_id)).await
}

/// Newest first.
pub async fn fetch_activities(
    base_url: &str,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<Vec<Activity>, ClientError> {
    let url = format!("{}/{PROJECTS_API}/{}/activities", base_url, project_id);
    send_json(request(Method::GET, url, user_id), Some(project_id)).await
}

// * Columns ..................................................................

pub async fn create_column(
    base_url: &str,
    user_id: Uuid,
    project_id: Uuid,
    title: &str,
) -> Result<Column, ClientError> {
    let url = format!("{}/{PROJECTS_API}/{}/{COLUMNS_API}", base_url, project_id);
    let body = ColumnTitleRequest {
        title: title.to_string(),
    };
    send_with(request(Method::POST, url, user_id), &body, Some(project_id)).await
}

pub async fn rename_column(
    base_url: &str,
    user_id: Uuid,
    column_id: Uuid,
    title: &str,
) -> Result<Column, ClientError> {
    let url = format!("{}/{COLUMNS_API}/{}", base_url, column_id);
    let body = ColumnTitleRequest {
        title: title.to_string(),
    };
    send_with(request(Method::PATCH, url, user_id), &body, Some(column_id)).await
}

pub async fn move_column(
    base_url: &str,
    user_id: Uuid,
    column_id: Uuid,
    index: Option<usize>,
) -> Result<ColumnMoved, ClientError> {
    let url = format!("{}/{COLUMNS_API}/{}/move", base_url, column_id);
    let body = MoveColumnRequest { index };
    send_with(request(Method::PATCH, url, user_id), &body, Some(column_id)).await
}

pub async fn delete_column(
    base_url: &str,
    user_id: Uuid,
    column_id: Uuid,
) -> Result<ColumnDeleted, ClientError> {
    let url = format!("{}/{COLUMNS_API}/{}", base_url, column_id);
    send_json(request(Method::DELETE, url, user_id), Some(column_id)).await
}

// * Tasks ....................................................................

pub async fn create_task(
    base_url: &str,
    user_id: Uuid,
    column_id: Uuid,
    task: &CreateTaskRequest,
) -> Result<Task, ClientError> {
    let url = format!("{}/{COLUMNS_API}/{}/{TASKS_API}", base_url, column_id);
    send_with(request(Method::POST, url, user_id), task, Some(column_id)).await
}

pub async fn fetch_task(base_url: &str, user_id: Uuid, task_id: Uuid) -> Result<Task, ClientError> {
    let url = format!("{}/{TASKS_API}/{}", base_url, task_id);
    send_json(request(Method::GET, url, user_id), Some(task_id)).await
}

pub async fn update_task(
    base_url: &str,
    user_id: Uuid,
    task_id: Uuid,
    update: &UpdateTaskRequest,
) -> Result<Task, ClientError> {
    let url = format!("{}/{TASKS_API}/{}", base_url, task_id);
    send_with(request(Method::PATCH, url, user_id), update, Some(task_id)).await
}

pub async fn move_task(
    base_url: &str,
    user_id: Uuid,
    task_id: Uuid,
    target: &MoveTaskRequest,
) -> Result<Task, ClientError> {
    let url = format!("{}/{TASKS_API}/{}/move", base_url, task_id);
    send_with(request(Method::PATCH, url, user_id), target, Some(task_id)).await
}

pub async fn delete_task(base_url: &str, user_id: Uuid, task_id: Uuid) -> Result<(), ClientError> {
    let url = format!("{}/{TASKS_API}/{}", base_url, task_id);
    send_empty(request(Method::DELETE, url, user_id), Some(task_id)).await
}

// * Comments and labels ......................................................

pub async fn add_comment(
    base_url: &str,
    user_id: Uuid,
    task_id: Uuid,
    content: &str,
) -> Result<Comment, ClientError> {
    let url = format!("{}/{TASKS_API}/{}/comments", base_url, task_id);
    let body = CreateCommentRequest {
        content: content.to_string(),
    };
    send_with(request(Method::POST, url, user_id), &body, Some(task_id)).await
}

pub async fn fetch_comments(
    base_url: &str,
    user_id: Uuid,
    task_id: Uuid,
) -> Result<Vec<Comment>, ClientError> {
    let url = format!("{}/{TASKS_API}/{}/comments", base_url, task_id);
    send_json(request(Method::GET, url, user_id), Some(task_id)).await
}

pub async fn create_label(
    base_url: &str,
    user_id: Uuid,
    project_id: Uuid,
    label: &CreateLabelRequest,
) -> Result<Label, ClientError> {
    let url = format!("{}/{PROJECTS_API}/{}/{LABELS_API}", base_url, project_id);
    send_with(request(Method::POST, url, user_id), label, Some(project_id)).await
}

pub async fn fetch_labels(
    base_url: &str,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<Vec<Label>, ClientError> {
    let url = format!("{}/{PROJECTS_API}/{}/{LABELS_API}", base_url, project_id);
    send_json(request(Method::GET, url, user_id), Some(project_id)).await
}

pub async fn delete_label(base_url: &str, user_id: Uuid, label_id: Uuid) -> Result<(), ClientError> {
    let url = format!("{}/{LABELS_API}/{}", base_url, label_id);
    send_empty(request(Method::DELETE, url, user_id), Some(label_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_names_the_resource() {
        let id = Uuid::new_v4();
        let message = || "404 Not Found: Project not found".to_string();

        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, Some(id), message()),
            ClientError::NotFound(found) if found == id
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, None, message()),
            ClientError::ServerError(text) if text == message()
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, None, "403 Forbidden: no".to_string()),
            ClientError::Forbidden(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, Some(id), "422".to_string()),
            ClientError::ServerError(_)
        ));
    }
}
