//! Client-side replica of one board.
//!
//! [`LocalBoard`] applies [`BoardEvent`]s as they arrive from the socket.
//! Every event is applied idempotently: a client sees the echo of its own
//! optimistic moves, and a reconnect may replay events it already has.

use crate::api::tasks::MoveTaskRequest;
use crate::board::{BoardColumn, BoardView};
use crate::ordering::{clamp_index, move_within, remove_id};
use crate::realtime::BoardEvent;
use crate::tables::{Comment, Task};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct LocalBoard {
    view: BoardView,
    comments: HashMap<Uuid, Vec<Comment>>,
    deleted: bool,
}

/// Saved replica state for rolling back a rejected optimistic change.
#[derive(Debug, Clone)]
pub struct BoardSnapshot(LocalBoard);

impl LocalBoard {
    pub fn new(view: BoardView) -> Self {
        Self {
            view,
            comments: HashMap::new(),
            deleted: false,
        }
    }

    pub fn view(&self) -> &BoardView {
        &self.view
    }

    pub fn project_id(&self) -> Uuid {
        self.view.project.id
    }

    /// Set once a `server:project_deleted` for this board arrives.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn comments(&self, task_id: Uuid) -> &[Comment] {
        self.comments.get(&task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn task(&self, task_id: Uuid) -> Option<&Task> {
        self.view
            .columns
            .iter()
            .flat_map(|column| column.tasks.iter())
            .find(|task| task.id == task_id)
    }

    pub fn column_of(&self, task_id: Uuid) -> Option<Uuid> {
        self.view
            .columns
            .iter()
            .find(|column| column.tasks.iter().any(|task| task.id == task_id))
            .map(|column| column.id)
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot(self.clone())
    }

    pub fn restore(&mut self, snapshot: BoardSnapshot) {
        *self = snapshot.0;
    }

    fn column_mut(&mut self, column_id: Uuid) -> Option<&mut BoardColumn> {
        self.view.columns.iter_mut().find(|column| column.id == column_id)
    }

    /// Removes the task from every column it appears in.
    fn take_task(&mut self, task_id: Uuid) -> Option<Task> {
        let mut taken = None;
        for column in &mut self.view.columns {
            if let Some(index) = column.tasks.iter().position(|task| task.id == task_id) {
                let task = column.tasks.remove(index);
                column.tasks.retain(|task| task.id != task_id);
                taken.get_or_insert(task);
            }
        }
        taken
    }

    fn place_task(&mut self, task: Task, column_id: Uuid, position: Option<usize>) -> Option<usize> {
        let column = self.column_mut(column_id)?;
        let index = clamp_index(position, column.tasks.len());
        column.tasks.insert(index, task);
        Some(index)
    }

    /// Moves a task locally ahead of the server's answer. Returns the index
    /// it landed at, or `None` when the task or the column is unknown here.
    pub fn apply_move_optimistically(
        &mut self,
        task_id: Uuid,
        dest_column_id: Uuid,
        position: Option<usize>,
    ) -> Option<usize> {
        self.view.column(dest_column_id)?;
        let mut task = self.take_task(task_id)?;
        task.column_id = dest_column_id;
        self.place_task(task, dest_column_id, position)
    }

    pub fn apply(&mut self, event: &BoardEvent) {
        match event {
            BoardEvent::TaskCreated { task } => {
                if task.project_id != self.project_id() || self.task(task.id).is_some() {
                    return;
                }
                if self.place_task(task.clone(), task.column_id, None).is_none() {
                    debug!(task_id = %task.id, column_id = %task.column_id, "created task in unknown column");
                }
            }
            BoardEvent::TaskUpdated { task } => {
                let column_id = self.column_of(task.id);
                if let Some(existing) = column_id
                    .and_then(|id| self.column_mut(id))
                    .and_then(|column| column.tasks.iter_mut().find(|t| t.id == task.id))
                {
                    *existing = task.clone();
                }
            }
            BoardEvent::TaskMoved {
                task_id,
                dest_column_id,
                position,
                ..
            } => {
                if self
                    .apply_move_optimistically(*task_id, *dest_column_id, Some(*position))
                    .is_none()
                {
                    debug!(task_id = %task_id, column_id = %dest_column_id, "ignored move of unknown task");
                }
            }
            BoardEvent::TaskDeleted { task_id, .. } => {
                self.take_task(*task_id);
                self.comments.remove(task_id);
            }
            BoardEvent::ColumnCreated { column } => {
                if column.project_id != self.project_id() || self.view.column(column.id).is_some() {
                    return;
                }
                self.view.columns.push(BoardColumn::empty(column));
                if !self.view.project.column_order.contains(&column.id) {
                    self.view.project.column_order.push(column.id);
                }
            }
            BoardEvent::ColumnUpdated { column } => {
                if let Some(existing) = self.column_mut(column.id) {
                    existing.title = column.title.clone();
                }
            }
            BoardEvent::ColumnMoved {
                column_id,
                position,
            } => {
                let Some(index) = self.view.columns.iter().position(|c| c.id == *column_id) else {
                    return;
                };
                let column = self.view.columns.remove(index);
                let at = clamp_index(Some(*position), self.view.columns.len());
                self.view.columns.insert(at, column);
                move_within(&mut self.view.project.column_order, *column_id, Some(*position));
            }
            BoardEvent::ColumnDeleted {
                column_id,
                target_column_id,
                relocated_task_ids,
                deleted_task_ids,
            } => self.apply_column_deleted(
                *column_id,
                *target_column_id,
                relocated_task_ids,
                deleted_task_ids,
            ),
            BoardEvent::CommentAdded { task_id, comment } => {
                let thread = self.comments.entry(*task_id).or_default();
                if !thread.iter().any(|existing| existing.id == comment.id) {
                    thread.push(comment.clone());
                }
            }
            BoardEvent::ProjectUpdated { project } => {
                if project.id == self.project_id() {
                    self.view.project = project.clone();
                }
            }
            BoardEvent::ProjectDeleted { project_id } => {
                if *project_id == self.project_id() {
                    self.deleted = true;
                    self.view.columns.clear();
                    self.comments.clear();
                }
            }
        }
    }

    fn apply_column_deleted(
        &mut self,
        column_id: Uuid,
        target_column_id: Option<Uuid>,
        relocated_task_ids: &[Uuid],
        deleted_task_ids: &[Uuid],
    ) {
        // a second delivery finds nothing to remove
        let Some(index) = self.view.columns.iter().position(|c| c.id == column_id) else {
            return;
        };
        let removed = self.view.columns.remove(index);
        remove_id(&mut self.view.project.column_order, column_id);

        let mut orphans = removed.tasks;
        let target = target_column_id.and_then(|id| self.view.columns.iter_mut().find(|c| c.id == id));
        match target {
            Some(target) => {
                orphans.sort_by_key(|task| {
                    relocated_task_ids
                        .iter()
                        .position(|id| *id == task.id)
                        .unwrap_or(usize::MAX)
                });
                for task in &mut orphans {
                    task.column_id = target.id;
                }
                target
                    .tasks
                    .retain(|task| !orphans.iter().any(|orphan| orphan.id == task.id));
                target.tasks.splice(0..0, orphans);
            }
            None => {
                for task in orphans {
                    self.comments.remove(&task.id);
                }
            }
        }

        for task_id in deleted_task_ids {
            self.take_task(*task_id);
            self.comments.remove(task_id);
        }
    }
}

/// Moves a task optimistically, then calls `send` to perform the move on the
/// server. The replica is rolled back to its prior state if `send` fails.
///
/// The lock is never held across the await, so events may keep arriving
/// while the request is in flight.
pub async fn move_task_optimistic<F, Fut, T, E>(
    board: &Mutex<LocalBoard>,
    task_id: Uuid,
    request: MoveTaskRequest,
    send: F,
) -> Result<T, E>
where
    F: FnOnce(Uuid, MoveTaskRequest) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let snapshot = {
        let mut local = board.lock();
        let snapshot = local.snapshot();
        local.apply_move_optimistically(task_id, request.target_column_id, request.position);
        snapshot
    };

    match send(task_id, request).await {
        Ok(value) => Ok(value),
        Err(err) => {
            board.lock().restore(snapshot);
            Err(err)
        }
    }
}
