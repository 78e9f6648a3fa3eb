pub mod board;
pub mod local;

pub use crate::api::columns::{ColumnDeleted, ColumnMoved, ColumnTitleRequest, MoveColumnRequest};
pub use crate::api::comments::CreateCommentRequest;
pub use crate::api::labels::CreateLabelRequest;
pub use crate::api::projects::{
    AddMembersRequest, CreateProjectRequest, CreatedProject, MembersAdded, UpdateProjectRequest,
};
pub use crate::api::tasks::{CreateTaskRequest, MoveTaskRequest, UpdateTaskRequest};
pub use crate::board::BoardView;
// Re-export the modules
pub use board::*;
pub use local::{move_task_optimistic, BoardSnapshot, LocalBoard};

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("{0} not found")]
    NotFound(Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unexpected server error: {0}")]
    ServerError(String),
}
