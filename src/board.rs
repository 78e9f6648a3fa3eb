//! Board assembly: columns in `columnOrder`, tasks in each `taskOrder`.
//!
//! Ids that no longer resolve are dropped from the view instead of failing
//! the read. They are collected in [`AssemblyReport`] so the caller can log
//! them; a dangling id always points at a write path that skipped an order
//! update and is worth investigating.

use crate::tables::{Column, Project, Task};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardColumn {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub created_at: chrono::NaiveDateTime,
    pub tasks: Vec<Task>,
}

impl BoardColumn {
    pub fn empty(column: &Column) -> Self {
        Self {
            id: column.id,
            project_id: column.project_id,
            title: column.title.clone(),
            created_at: column.created_at,
            tasks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardView {
    pub project: Project,
    pub columns: Vec<BoardColumn>,
}

impl BoardView {
    pub fn column(&self, column_id: Uuid) -> Option<&BoardColumn> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn task_ids(&self, column_id: Uuid) -> Vec<Uuid> {
        self.column(column_id)
            .map(|c| c.tasks.iter().map(|t| t.id).collect())
            .unwrap_or_default()
    }
}

/// Inconsistencies tolerated while assembling a board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    /// Ids in `columnOrder` with no matching column.
    pub dangling_columns: Vec<Uuid>,
    /// `(column id, task id)` pairs in a `taskOrder` with no matching task.
    pub dangling_tasks: Vec<(Uuid, Uuid)>,
    /// Columns of the project that `columnOrder` does not list.
    pub unlisted_columns: Vec<Uuid>,
    /// Tasks of the project that no `taskOrder` lists.
    pub unplaced_tasks: Vec<Uuid>,
}

impl AssemblyReport {
    pub fn is_clean(&self) -> bool {
        self.dangling_columns.is_empty()
            && self.dangling_tasks.is_empty()
            && self.unlisted_columns.is_empty()
            && self.unplaced_tasks.is_empty()
    }
}

/// Builds the board view for `project` from all of its columns and tasks.
///
/// Columns follow `columnOrder`; columns the order does not list are
/// appended by creation time so their tasks stay reachable. Tasks follow
/// each column's `taskOrder`, and a task id listed twice is shown once.
pub fn assemble(
    project: Project,
    columns: Vec<Column>,
    tasks: Vec<Task>,
) -> (BoardView, AssemblyReport) {
    let mut report = AssemblyReport::default();

    let mut columns_by_id: HashMap<Uuid, Column> = columns.into_iter().map(|c| (c.id, c)).collect();
    let mut tasks_by_id: HashMap<Uuid, Task> = tasks.into_iter().map(|t| (t.id, t)).collect();

    let mut ordered: Vec<Column> = Vec::with_capacity(columns_by_id.len());
    for column_id in &project.column_order {
        match columns_by_id.remove(column_id) {
            Some(column) => ordered.push(column),
            None => report.dangling_columns.push(*column_id),
        }
    }

    let mut unlisted: Vec<Column> = columns_by_id.into_values().collect();
    unlisted.sort_by_key(|c| c.created_at);
    report.unlisted_columns = unlisted.iter().map(|c| c.id).collect();
    ordered.extend(unlisted);

    let mut placed: HashSet<Uuid> = HashSet::new();
    let board_columns = ordered
        .iter()
        .map(|column| {
            let mut board_column = BoardColumn::empty(column);
            for task_id in &column.task_order {
                if placed.contains(task_id) {
                    continue;
                }
                match tasks_by_id.remove(task_id) {
                    Some(task) => {
                        placed.insert(*task_id);
                        board_column.tasks.push(task);
                    }
                    None => report.dangling_tasks.push((column.id, *task_id)),
                }
            }
            board_column
        })
        .collect();

    let mut unplaced: Vec<Uuid> = tasks_by_id.into_keys().collect();
    unplaced.sort();
    report.unplaced_tasks = unplaced;

    (
        BoardView {
            project,
            columns: board_columns,
        },
        report,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{now, Checklist, ProjectStatus};

    fn project(column_order: Vec<Uuid>) -> Project {
        Project {
            id: Uuid::new_v4(),
            name: "Board".to_string(),
            description: None,
            status: ProjectStatus::Active,
            deadline: None,
            owner_id: Uuid::new_v4(),
            members: vec![],
            column_order,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn task(project_id: Uuid, column_id: Uuid, title: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            project_id,
            column_id,
            title: title.to_string(),
            description: None,
            creator_id: Uuid::new_v4(),
            assignees: vec![],
            due_date: None,
            labels: vec![],
            checklist: Checklist::default(),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_columns_follow_column_order() {
        let mut p = project(vec![]);
        let first = Column::new(p.id, "First");
        let second = Column::new(p.id, "Second");
        p.column_order = vec![second.id, first.id];

        let (view, report) = assemble(p, vec![first.clone(), second.clone()], vec![]);

        let titles: Vec<&str> = view.columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Second", "First"]);
        assert!(report.is_clean());
    }

    #[test]
    fn test_dangling_task_is_dropped_and_reported() {
        let mut p = project(vec![]);
        let mut column = Column::new(p.id, "To Do");
        let a = task(p.id, column.id, "a");
        let b = task(p.id, column.id, "b");
        let ghost = Uuid::new_v4();
        column.task_order = vec![a.id, ghost, b.id];
        p.column_order = vec![column.id];
        let column_id = column.id;

        let (view, report) = assemble(p, vec![column], vec![a.clone(), b.clone()]);

        assert_eq!(view.task_ids(column_id), vec![a.id, b.id]);
        // The dangling id is tolerated in the view but flagged for follow-up.
        assert_eq!(report.dangling_tasks, vec![(column_id, ghost)]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_dangling_column_is_dropped() {
        let mut p = project(vec![]);
        let column = Column::new(p.id, "To Do");
        let ghost = Uuid::new_v4();
        p.column_order = vec![ghost, column.id];

        let (view, report) = assemble(p, vec![column], vec![]);

        assert_eq!(view.columns.len(), 1);
        assert_eq!(report.dangling_columns, vec![ghost]);
    }

    #[test]
    fn test_unlisted_column_and_unplaced_task_reported() {
        let mut p = project(vec![]);
        let listed = Column::new(p.id, "Listed");
        let unlisted = Column::new(p.id, "Unlisted");
        let stray = task(p.id, listed.id, "stray");
        p.column_order = vec![listed.id];

        let (view, report) = assemble(p, vec![listed, unlisted.clone()], vec![stray.clone()]);

        assert_eq!(view.columns.last().map(|c| c.id), Some(unlisted.id));
        assert_eq!(report.unlisted_columns, vec![unlisted.id]);
        assert_eq!(report.unplaced_tasks, vec![stray.id]);
    }
}
