//! Persistence for projects, columns, tasks, labels and comments.
//!
//! Structural mutations (task create/move/delete, column create/move/delete,
//! project seeding) each run as one transaction. Both backends serialise
//! them per project: `PgStore` takes a row lock on the project, `MemoryStore`
//! holds its single lock for the whole copy-on-write transaction.

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::{PgStore, Pool};

use crate::ordering;
use crate::tables::{now, Activity, ActivityAction, Column, Comment, Label, Project, Task};
use serde_json::json;
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("{0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Transaction aborted: {0}")]
    Transaction(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        StoreError::NotFound { kind, id }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub deadline: Option<chrono::NaiveDateTime>,
    pub owner_id: Uuid,
    pub members: Vec<Uuid>,
    pub default_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    pub due_date: Option<chrono::NaiveDateTime>,
    pub assignees: Vec<Uuid>,
    pub labels: Vec<Uuid>,
}

impl NewTask {
    pub(crate) fn into_task(self, project_id: Uuid, column_id: Uuid) -> Task {
        let created = now();
        Task {
            id: Uuid::new_v4(),
            project_id,
            column_id,
            title: self.title.trim().to_string(),
            description: self.description,
            creator_id: self.creator_id,
            assignees: dedup(self.assignees),
            due_date: self.due_date,
            labels: dedup(self.labels),
            checklist: Default::default(),
            created_at: created,
            updated_at: created,
        }
    }
}

/// Result of a task move, enough to describe it to other clients.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMove {
    pub task: Task,
    pub source_column_id: Uuid,
    pub dest_column_id: Uuid,
    pub position: usize,
}

/// Result of the column deletion cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDeletion {
    pub column: Column,
    pub target_column_id: Option<Uuid>,
    pub relocated_task_ids: Vec<Uuid>,
    pub deleted_task_ids: Vec<Uuid>,
}

pub type ProjectEdit<'a> = &'a mut dyn FnMut(&mut Project) -> StoreResult<()>;
pub type TaskEdit<'a> = &'a mut dyn FnMut(&mut Task) -> StoreResult<()>;

pub trait BoardStore: Send + Sync {
    // Projects
    fn create_project(&self, new: NewProject) -> StoreResult<(Project, Vec<Column>)>;
    fn find_project(&self, id: Uuid) -> StoreResult<Project>;
    fn list_projects_for(&self, user_id: Uuid) -> StoreResult<Vec<Project>>;
    fn update_project(&self, id: Uuid, edit: ProjectEdit<'_>) -> StoreResult<Project>;
    /// Adds members that are not already on the project, returning the ids added.
    fn add_members(&self, id: Uuid, user_ids: &[Uuid]) -> StoreResult<(Project, Vec<Uuid>)>;
    fn delete_project(&self, id: Uuid) -> StoreResult<()>;
    /// Project, all of its columns and all of its tasks, read consistently.
    fn load_board(&self, project_id: Uuid) -> StoreResult<(Project, Vec<Column>, Vec<Task>)>;

    // Columns
    fn find_column(&self, id: Uuid) -> StoreResult<Column>;
    fn create_column(&self, project_id: Uuid, title: &str) -> StoreResult<Column>;
    fn rename_column(&self, id: Uuid, title: &str) -> StoreResult<Column>;
    fn move_column(&self, id: Uuid, position: Option<usize>) -> StoreResult<(Column, usize)>;
    fn delete_column(&self, id: Uuid) -> StoreResult<ColumnDeletion>;

    // Tasks
    fn find_task(&self, id: Uuid) -> StoreResult<Task>;
    fn create_task(&self, column_id: Uuid, new: NewTask) -> StoreResult<Task>;
    fn update_task(&self, id: Uuid, actor: Uuid, edit: TaskEdit<'_>) -> StoreResult<Task>;
    fn move_task(
        &self,
        id: Uuid,
        actor: Uuid,
        dest_column_id: Uuid,
        position: Option<usize>,
    ) -> StoreResult<TaskMove>;
    fn delete_task(&self, id: Uuid) -> StoreResult<Task>;

    // Labels and comments
    fn create_label(&self, project_id: Uuid, text: &str, color: &str) -> StoreResult<Label>;
    fn find_label(&self, id: Uuid) -> StoreResult<Label>;
    fn list_labels(&self, project_id: Uuid) -> StoreResult<Vec<Label>>;
    /// Deletes the label and pulls it from every task, returning the tasks touched.
    fn delete_label(&self, id: Uuid) -> StoreResult<(Label, Vec<Task>)>;
    fn add_comment(&self, task_id: Uuid, author_id: Uuid, content: &str) -> StoreResult<Comment>;
    fn list_comments(&self, task_id: Uuid) -> StoreResult<Vec<Comment>>;

    /// Task creation, edits, moves and comments record an activity in the
    /// same transaction as the change itself. Newest first.
    fn list_activities(&self, project_id: Uuid) -> StoreResult<Vec<Activity>>;
}

fn dedup(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Relocates `task` inside the project's `columns`. Returns the move and
/// the ids of the columns whose `task_order` changed.
///
/// The source column is whichever column currently lists the task. A task
/// listed nowhere is repaired by inserting it into the destination. Ids
/// missing from `live_tasks` are dropped from every column the move touches,
/// so the returned position indexes live tasks only.
pub(crate) fn apply_task_move(
    columns: &mut [Column],
    task: &mut Task,
    live_tasks: &HashSet<Uuid>,
    dest_column_id: Uuid,
    position: Option<usize>,
) -> StoreResult<(TaskMove, Vec<Uuid>)> {
    let dest_index = columns
        .iter()
        .position(|c| c.id == dest_column_id)
        .ok_or_else(|| StoreError::not_found("column", dest_column_id))?;

    let source_column_id = ordering::locate(
        columns.iter().map(|c| (c.id, c.task_order.as_slice())),
        task.id,
    )
    .unwrap_or_else(|| {
        warn!(task_id = %task.id, "task missing from every taskOrder, reinserting");
        task.column_id
    });

    let mut touched = Vec::new();
    for (index, column) in columns.iter_mut().enumerate() {
        if index != dest_index && ordering::remove_id(&mut column.task_order, task.id).is_some() {
            prune_dangling(column, live_tasks);
            touched.push(column.id);
        }
    }

    let dest = &mut columns[dest_index];
    let before = dest.task_order.clone();
    prune_dangling(dest, live_tasks);
    let position = ordering::insert_clamped(&mut dest.task_order, task.id, position);
    if dest.task_order != before {
        touched.push(dest.id);
    }

    if task.column_id != dest_column_id || !touched.is_empty() {
        task.column_id = dest_column_id;
        task.updated_at = now();
    }

    Ok((
        TaskMove {
            task: task.clone(),
            source_column_id,
            dest_column_id,
            position,
        },
        touched,
    ))
}

fn prune_dangling(column: &mut Column, live_tasks: &HashSet<Uuid>) {
    let dropped = ordering::retain_live(&mut column.task_order, live_tasks);
    if dropped > 0 {
        warn!(column_id = %column.id, dropped, "dropped dangling ids from taskOrder");
    }
}

/// `column_order` with ids of deleted columns dropped, then `id` moved to
/// the clamped position.
pub(crate) fn reorder_columns(
    column_order: &mut Vec<Uuid>,
    existing: &HashSet<Uuid>,
    id: Uuid,
    position: Option<usize>,
) -> usize {
    let dropped = ordering::retain_live(column_order, existing);
    if dropped > 0 {
        warn!(column_id = %id, dropped, "dropped dangling ids from columnOrder");
    }
    ordering::move_within(column_order, id, position)
}

// * Activity records .........................................................

pub(crate) fn created_activity(task: &Task) -> Activity {
    Activity::for_task(
        task,
        task.creator_id,
        ActivityAction::CreatedTask,
        json!({ "title": task.title }),
    )
}

pub(crate) fn updated_activity(before: &Task, after: &Task, actor: Uuid) -> Activity {
    Activity::for_task(
        after,
        actor,
        ActivityAction::UpdatedTask,
        json!({ "fields": changed_fields(before, after) }),
    )
}

pub(crate) fn moved_activity(outcome: &TaskMove, actor: Uuid) -> Activity {
    Activity::for_task(
        &outcome.task,
        actor,
        ActivityAction::MovedTask,
        json!({
            "fromColumnId": outcome.source_column_id,
            "toColumnId": outcome.dest_column_id,
            "position": outcome.position,
        }),
    )
}

pub(crate) fn comment_activity(task: &Task, comment: &Comment) -> Activity {
    Activity::for_task(
        task,
        comment.author_id,
        ActivityAction::AddedComment,
        json!({ "commentId": comment.id }),
    )
}

/// Wire names of the task fields an edit changed.
pub(crate) fn changed_fields(before: &Task, after: &Task) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if before.title != after.title {
        fields.push("title");
    }
    if before.description != after.description {
        fields.push("description");
    }
    if before.due_date != after.due_date {
        fields.push("dueDate");
    }
    if before.assignees != after.assignees {
        fields.push("assignees");
    }
    if before.labels != after.labels {
        fields.push("labels");
    }
    if before.checklist != after.checklist {
        fields.push("checklist");
    }
    fields
}

/// Ordered ids of the tasks that live in `column`: its `taskOrder` first,
/// then any task pointing at the column that the order failed to list.
pub(crate) fn cascade_sequence(column: &Column, tasks_in_column: &[Task]) -> Vec<Uuid> {
    let owned: HashSet<Uuid> = tasks_in_column
        .iter()
        .filter(|t| t.column_id == column.id)
        .map(|t| t.id)
        .collect();

    let mut sequence: Vec<Uuid> = Vec::with_capacity(owned.len());
    for id in &column.task_order {
        if owned.contains(id) && !sequence.contains(id) {
            sequence.push(*id);
        }
    }

    let mut unlisted: Vec<&Task> = tasks_in_column
        .iter()
        .filter(|t| owned.contains(&t.id) && !sequence.contains(&t.id))
        .collect();
    unlisted.sort_by_key(|t| t.created_at);
    sequence.extend(unlisted.into_iter().map(|t| t.id));
    sequence
}

/// `column_order` restricted to columns that exist, keeping `deleted` so
/// its neighbours can be found.
pub(crate) fn live_column_order(
    column_order: &[Uuid],
    existing: &HashSet<Uuid>,
    deleted: Uuid,
) -> Vec<Uuid> {
    column_order
        .iter()
        .copied()
        .filter(|id| *id == deleted || existing.contains(id))
        .collect()
}

pub(crate) fn require_title(title: &str, what: &str) -> StoreResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::Invalid(format!("{what} is required")));
    }
    Ok(title.to_string())
}
