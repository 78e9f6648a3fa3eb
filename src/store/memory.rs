//! Process-local store.
//!
//! Every write runs against a private copy of the documents and is swapped
//! in only when the whole operation succeeds, so a failing step never leaves
//! a half-applied cascade behind.

use super::{
    apply_task_move, cascade_sequence, comment_activity, created_activity, live_column_order,
    moved_activity, reorder_columns, require_title, updated_activity, BoardStore, ColumnDeletion,
    NewProject, NewTask, ProjectEdit, StoreError, StoreResult, TaskEdit, TaskMove,
};
use crate::ordering;
use crate::tables::{
    is_hex_color, now, Activity, Column, Comment, Label, MemberRole, Project, ProjectMember,
    ProjectStatus, Task,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct Documents {
    projects: HashMap<Uuid, Project>,
    columns: HashMap<Uuid, Column>,
    tasks: HashMap<Uuid, Task>,
    labels: HashMap<Uuid, Label>,
    comments: Vec<Comment>,
    activities: Vec<Activity>,
}

impl Documents {
    fn project(&self, id: Uuid) -> StoreResult<&Project> {
        self.projects
            .get(&id)
            .ok_or_else(|| StoreError::not_found("project", id))
    }

    fn project_mut(&mut self, id: Uuid) -> StoreResult<&mut Project> {
        self.projects
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("project", id))
    }

    fn column(&self, id: Uuid) -> StoreResult<&Column> {
        self.columns
            .get(&id)
            .ok_or_else(|| StoreError::not_found("column", id))
    }

    fn column_mut(&mut self, id: Uuid) -> StoreResult<&mut Column> {
        self.columns
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("column", id))
    }

    fn task(&self, id: Uuid) -> StoreResult<&Task> {
        self.tasks
            .get(&id)
            .ok_or_else(|| StoreError::not_found("task", id))
    }

    fn project_columns(&self, project_id: Uuid) -> Vec<Column> {
        let mut columns: Vec<Column> = self
            .columns
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        columns.sort_by_key(|c| (c.created_at, c.id));
        columns
    }

    fn project_column_ids(&self, project_id: Uuid) -> HashSet<Uuid> {
        self.columns
            .values()
            .filter(|c| c.project_id == project_id)
            .map(|c| c.id)
            .collect()
    }

    fn project_task_ids(&self, project_id: Uuid) -> HashSet<Uuid> {
        self.tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .map(|t| t.id)
            .collect()
    }

    fn remove_tasks(&mut self, ids: &[Uuid]) {
        for id in ids {
            self.tasks.remove(id);
        }
        self.comments.retain(|c| !ids.contains(&c.task_id));
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Documents) -> StoreResult<T>) -> StoreResult<T> {
        let docs = self.docs.lock();
        f(&docs)
    }

    fn transaction<T>(&self, f: impl FnOnce(&mut Documents) -> StoreResult<T>) -> StoreResult<T> {
        let mut docs = self.docs.lock();
        let mut draft = docs.clone();
        let out = f(&mut draft)?;
        *docs = draft;
        Ok(out)
    }
}

impl BoardStore for MemoryStore {
    fn create_project(&self, new: NewProject) -> StoreResult<(Project, Vec<Column>)> {
        let name = require_title(&new.name, "project name")?;
        self.transaction(|docs| {
            let created = now();
            let mut members = vec![ProjectMember {
                user_id: new.owner_id,
                role: MemberRole::Owner,
            }];
            for user_id in &new.members {
                if !members.iter().any(|m| m.user_id == *user_id) {
                    members.push(ProjectMember {
                        user_id: *user_id,
                        role: MemberRole::Member,
                    });
                }
            }
            let mut project = Project {
                id: Uuid::new_v4(),
                name,
                description: new.description,
                status: ProjectStatus::Active,
                deadline: new.deadline,
                owner_id: new.owner_id,
                members,
                column_order: Vec::new(),
                created_at: created,
                updated_at: created,
            };

            let columns: Vec<Column> = new
                .default_columns
                .iter()
                .map(|title| Column::new(project.id, title))
                .collect();
            for column in &columns {
                docs.columns.insert(column.id, column.clone());
            }
            project.column_order = columns.iter().map(|c| c.id).collect();
            docs.projects.insert(project.id, project.clone());

            info!(project_id = %project.id, columns = columns.len(), "project created");
            Ok((project, columns))
        })
    }

    fn find_project(&self, id: Uuid) -> StoreResult<Project> {
        self.read(|docs| docs.project(id).cloned())
    }

    fn list_projects_for(&self, user_id: Uuid) -> StoreResult<Vec<Project>> {
        self.read(|docs| {
            let mut projects: Vec<Project> = docs
                .projects
                .values()
                .filter(|p| p.has_access(user_id))
                .cloned()
                .collect();
            projects.sort_by_key(|p| p.created_at);
            Ok(projects)
        })
    }

    fn update_project(&self, id: Uuid, edit: ProjectEdit<'_>) -> StoreResult<Project> {
        self.transaction(|docs| {
            let project = docs.project_mut(id)?;
            edit(project)?;
            project.updated_at = now();
            Ok(project.clone())
        })
    }

    fn add_members(&self, id: Uuid, user_ids: &[Uuid]) -> StoreResult<(Project, Vec<Uuid>)> {
        self.transaction(|docs| {
            let project = docs.project_mut(id)?;
            let mut added = Vec::new();
            for user_id in user_ids {
                if !project.has_access(*user_id) && !added.contains(user_id) {
                    project.members.push(ProjectMember {
                        user_id: *user_id,
                        role: MemberRole::Member,
                    });
                    added.push(*user_id);
                }
            }
            if !added.is_empty() {
                project.updated_at = now();
            }
            Ok((project.clone(), added))
        })
    }

    fn delete_project(&self, id: Uuid) -> StoreResult<()> {
        self.transaction(|docs| {
            docs.projects
                .remove(&id)
                .ok_or_else(|| StoreError::not_found("project", id))?;
            let task_ids: Vec<Uuid> = docs
                .tasks
                .values()
                .filter(|t| t.project_id == id)
                .map(|t| t.id)
                .collect();
            docs.remove_tasks(&task_ids);
            docs.columns.retain(|_, c| c.project_id != id);
            docs.labels.retain(|_, l| l.project_id != id);
            docs.activities.retain(|a| a.project_id != id);
            info!(project_id = %id, tasks = task_ids.len(), "project deleted");
            Ok(())
        })
    }

    fn load_board(&self, project_id: Uuid) -> StoreResult<(Project, Vec<Column>, Vec<Task>)> {
        self.read(|docs| {
            let project = docs.project(project_id)?.clone();
            let columns = docs.project_columns(project_id);
            let tasks = docs
                .tasks
                .values()
                .filter(|t| t.project_id == project_id)
                .cloned()
                .collect();
            Ok((project, columns, tasks))
        })
    }

    fn find_column(&self, id: Uuid) -> StoreResult<Column> {
        self.read(|docs| docs.column(id).cloned())
    }

    fn create_column(&self, project_id: Uuid, title: &str) -> StoreResult<Column> {
        let title = require_title(title, "column title")?;
        self.transaction(|docs| {
            let project = docs.project_mut(project_id)?;
            let column = Column::new(project_id, &title);
            project.column_order.push(column.id);
            project.updated_at = now();
            docs.columns.insert(column.id, column.clone());
            info!(project_id = %project_id, column_id = %column.id, "column created");
            Ok(column)
        })
    }

    fn rename_column(&self, id: Uuid, title: &str) -> StoreResult<Column> {
        let title = require_title(title, "column title")?;
        self.transaction(|docs| {
            let column = docs.column_mut(id)?;
            column.title = title;
            Ok(column.clone())
        })
    }

    fn move_column(&self, id: Uuid, position: Option<usize>) -> StoreResult<(Column, usize)> {
        self.transaction(|docs| {
            let column = docs.column(id)?.clone();
            let existing = docs.project_column_ids(column.project_id);
            let project = docs.project_mut(column.project_id)?;
            let position = reorder_columns(&mut project.column_order, &existing, id, position);
            project.updated_at = now();
            Ok((column, position))
        })
    }

    fn delete_column(&self, id: Uuid) -> StoreResult<ColumnDeletion> {
        self.transaction(|docs| {
            let column = docs.column(id)?.clone();
            let project_id = column.project_id;
            let existing = docs.project_column_ids(project_id);
            let live = live_column_order(&docs.project(project_id)?.column_order, &existing, id);
            let plan = ordering::plan_column_delete(&live, id);

            let in_column: Vec<Task> = docs
                .tasks
                .values()
                .filter(|t| t.column_id == id)
                .cloned()
                .collect();
            let sequence = cascade_sequence(&column, &in_column);

            let (relocated, deleted) = match plan.target {
                Some(target_id) => {
                    let target = docs.column_mut(target_id)?;
                    ordering::splice_front(&mut target.task_order, &sequence);
                    let touched = now();
                    for task_id in &sequence {
                        if let Some(task) = docs.tasks.get_mut(task_id) {
                            task.column_id = target_id;
                            task.updated_at = touched;
                        }
                    }
                    (sequence, Vec::new())
                }
                None => {
                    docs.remove_tasks(&sequence);
                    (Vec::new(), sequence)
                }
            };

            let project = docs.project_mut(project_id)?;
            project.column_order = plan.column_order;
            project.updated_at = now();
            docs.columns.remove(&id);

            info!(
                column_id = %id,
                target = ?plan.target,
                relocated = relocated.len(),
                deleted = deleted.len(),
                "column deleted"
            );
            Ok(ColumnDeletion {
                column,
                target_column_id: plan.target,
                relocated_task_ids: relocated,
                deleted_task_ids: deleted,
            })
        })
    }

    fn find_task(&self, id: Uuid) -> StoreResult<Task> {
        self.read(|docs| docs.task(id).cloned())
    }

    fn create_task(&self, column_id: Uuid, new: NewTask) -> StoreResult<Task> {
        require_title(&new.title, "task title")?;
        self.transaction(|docs| {
            let column = docs.column_mut(column_id)?;
            let task = new.into_task(column.project_id, column_id);
            column.task_order.push(task.id);
            docs.tasks.insert(task.id, task.clone());
            docs.activities.push(created_activity(&task));
            debug!(task_id = %task.id, column_id = %column_id, "task created");
            Ok(task)
        })
    }

    fn update_task(&self, id: Uuid, actor: Uuid, edit: TaskEdit<'_>) -> StoreResult<Task> {
        self.transaction(|docs| {
            let task = docs
                .tasks
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("task", id))?;
            let before = task.clone();
            edit(task)?;
            task.updated_at = now();
            let task = task.clone();
            docs.activities.push(updated_activity(&before, &task, actor));
            Ok(task)
        })
    }

    fn move_task(
        &self,
        id: Uuid,
        actor: Uuid,
        dest_column_id: Uuid,
        position: Option<usize>,
    ) -> StoreResult<TaskMove> {
        self.transaction(|docs| {
            let mut task = docs.task(id)?.clone();
            let dest = docs.column(dest_column_id)?;
            if dest.project_id != task.project_id {
                return Err(StoreError::Invalid(
                    "destination column belongs to another project".to_string(),
                ));
            }

            let mut columns = docs.project_columns(task.project_id);
            let live = docs.project_task_ids(task.project_id);
            let (outcome, touched) =
                apply_task_move(&mut columns, &mut task, &live, dest_column_id, position)?;
            for column in columns.into_iter().filter(|c| touched.contains(&c.id)) {
                docs.columns.insert(column.id, column);
            }
            docs.tasks.insert(task.id, task);
            docs.activities.push(moved_activity(&outcome, actor));
            Ok(outcome)
        })
    }

    fn delete_task(&self, id: Uuid) -> StoreResult<Task> {
        self.transaction(|docs| {
            let task = docs.task(id)?.clone();
            for column in docs.columns.values_mut() {
                if column.project_id == task.project_id {
                    ordering::remove_id(&mut column.task_order, id);
                }
            }
            docs.remove_tasks(&[id]);
            Ok(task)
        })
    }

    fn create_label(&self, project_id: Uuid, text: &str, color: &str) -> StoreResult<Label> {
        let text = require_title(text, "label text")?;
        if !is_hex_color(color) {
            return Err(StoreError::Invalid(format!("invalid hex color: {color}")));
        }
        self.transaction(|docs| {
            docs.project(project_id)?;
            let label = Label {
                id: Uuid::new_v4(),
                project_id,
                text,
                color: color.to_string(),
            };
            docs.labels.insert(label.id, label.clone());
            Ok(label)
        })
    }

    fn find_label(&self, id: Uuid) -> StoreResult<Label> {
        self.read(|docs| {
            docs.labels
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("label", id))
        })
    }

    fn list_labels(&self, project_id: Uuid) -> StoreResult<Vec<Label>> {
        self.read(|docs| {
            let mut labels: Vec<Label> = docs
                .labels
                .values()
                .filter(|l| l.project_id == project_id)
                .cloned()
                .collect();
            labels.sort_by(|a, b| a.text.cmp(&b.text));
            Ok(labels)
        })
    }

    fn delete_label(&self, id: Uuid) -> StoreResult<(Label, Vec<Task>)> {
        self.transaction(|docs| {
            let label = docs
                .labels
                .remove(&id)
                .ok_or_else(|| StoreError::not_found("label", id))?;
            let mut touched = Vec::new();
            for task in docs.tasks.values_mut() {
                if task.labels.contains(&id) {
                    task.labels.retain(|l| *l != id);
                    task.updated_at = now();
                    touched.push(task.clone());
                }
            }
            Ok((label, touched))
        })
    }

    fn add_comment(&self, task_id: Uuid, author_id: Uuid, content: &str) -> StoreResult<Comment> {
        let content = require_title(content, "comment content")?;
        self.transaction(|docs| {
            let task = docs.task(task_id)?.clone();
            let comment = Comment {
                id: Uuid::new_v4(),
                task_id,
                author_id,
                content,
                created_at: now(),
            };
            docs.comments.push(comment.clone());
            docs.activities.push(comment_activity(&task, &comment));
            Ok(comment)
        })
    }

    fn list_comments(&self, task_id: Uuid) -> StoreResult<Vec<Comment>> {
        self.read(|docs| {
            docs.task(task_id)?;
            Ok(docs
                .comments
                .iter()
                .filter(|c| c.task_id == task_id)
                .cloned()
                .collect())
        })
    }

    fn list_activities(&self, project_id: Uuid) -> StoreResult<Vec<Activity>> {
        self.read(|docs| {
            docs.project(project_id)?;
            Ok(docs
                .activities
                .iter()
                .rev()
                .filter(|a| a.project_id == project_id)
                .cloned()
                .collect())
        })
    }
}
