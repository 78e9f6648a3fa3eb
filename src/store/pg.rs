//! PostgreSQL store backed by an r2d2 pool.
//!
//! Structural mutations lock the owning project row (`SELECT ... FOR UPDATE`)
//! before touching any order array. Rows needed to find the project are read
//! unlocked first and re-read once the lock is held, so every writer acquires
//! locks in the same order.

use super::{
    apply_task_move, cascade_sequence, comment_activity, created_activity, live_column_order,
    moved_activity, reorder_columns, require_title, updated_activity, BoardStore, ColumnDeletion,
    NewProject, NewTask, ProjectEdit, StoreError, StoreResult, TaskEdit, TaskMove,
};
use crate::ordering;
use crate::schema::{activities, board_columns, comments, labels, project_members, projects, tasks};
use crate::tables::{
    is_hex_color, now, Activity, Column, Comment, Label, MemberRole, Project, ProjectMember,
    ProjectMemberRow, ProjectRow, ProjectStatus, Task,
};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

// Connection pool type
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

type Conn = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn connect(database_url: &str, max_size: u32) -> StoreResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder().max_size(max_size).build(manager)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    fn conn(&self) -> StoreResult<Conn> {
        Ok(self.pool.get()?)
    }
}

// * Row helpers ..............................................................

fn members_of(conn: &mut PgConnection, project_id: Uuid) -> StoreResult<Vec<ProjectMember>> {
    let rows = project_members::table
        .filter(project_members::project_id.eq(project_id))
        .select(ProjectMemberRow::as_select())
        .load(conn)?;
    Ok(rows.into_iter().map(ProjectMember::from).collect())
}

fn load_project(conn: &mut PgConnection, id: Uuid) -> StoreResult<Project> {
    let row = projects::table
        .find(id)
        .select(ProjectRow::as_select())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found("project", id))?;
    let members = members_of(conn, id)?;
    Ok(Project::from_row(row, members))
}

/// Reads the project row under `FOR UPDATE`. Must run inside a transaction.
fn lock_project(conn: &mut PgConnection, id: Uuid) -> StoreResult<Project> {
    let row = projects::table
        .find(id)
        .select(ProjectRow::as_select())
        .for_update()
        .get_result(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found("project", id))?;
    let members = members_of(conn, id)?;
    Ok(Project::from_row(row, members))
}

fn save_column_order(conn: &mut PgConnection, project_id: Uuid, order: &[Uuid]) -> StoreResult<()> {
    diesel::update(projects::table.find(project_id))
        .set((
            projects::column_order.eq(order.to_vec()),
            projects::updated_at.eq(now()),
        ))
        .execute(conn)?;
    Ok(())
}

fn save_task_order(conn: &mut PgConnection, column: &Column) -> StoreResult<()> {
    diesel::update(board_columns::table.find(column.id))
        .set(board_columns::task_order.eq(column.task_order.clone()))
        .execute(conn)?;
    Ok(())
}

fn find_column_row(conn: &mut PgConnection, id: Uuid) -> StoreResult<Column> {
    board_columns::table
        .find(id)
        .select(Column::as_select())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found("column", id))
}

fn find_task_row(conn: &mut PgConnection, id: Uuid) -> StoreResult<Task> {
    tasks::table
        .find(id)
        .select(Task::as_select())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found("task", id))
}

fn project_columns(conn: &mut PgConnection, project_id: Uuid) -> StoreResult<Vec<Column>> {
    Ok(board_columns::table
        .filter(board_columns::project_id.eq(project_id))
        .order((board_columns::created_at.asc(), board_columns::id.asc()))
        .select(Column::as_select())
        .load(conn)?)
}

fn project_task_ids(conn: &mut PgConnection, project_id: Uuid) -> StoreResult<HashSet<Uuid>> {
    let ids: Vec<Uuid> = tasks::table
        .filter(tasks::project_id.eq(project_id))
        .select(tasks::id)
        .load(conn)?;
    Ok(ids.into_iter().collect())
}

fn record(conn: &mut PgConnection, activity: &Activity) -> StoreResult<()> {
    diesel::insert_into(activities::table)
        .values(activity)
        .execute(conn)?;
    Ok(())
}

fn delete_tasks(conn: &mut PgConnection, ids: &[Uuid]) -> StoreResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    diesel::delete(comments::table.filter(comments::task_id.eq_any(ids.to_vec()))).execute(conn)?;
    diesel::delete(tasks::table.filter(tasks::id.eq_any(ids.to_vec()))).execute(conn)?;
    Ok(())
}

fn insert_members(
    conn: &mut PgConnection,
    project_id: Uuid,
    members: &[ProjectMember],
) -> StoreResult<()> {
    let rows: Vec<ProjectMemberRow> = members
        .iter()
        .map(|m| ProjectMemberRow {
            project_id,
            user_id: m.user_id,
            role: m.role,
        })
        .collect();
    diesel::insert_into(project_members::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

/// A failed cascade is rolled back in full; surface it as retryable.
fn cascade_failed(err: StoreError) -> StoreError {
    match err {
        StoreError::Database(db) => {
            StoreError::Transaction(format!("column was not deleted, retry ({db})"))
        }
        other => other,
    }
}

impl BoardStore for PgStore {
    fn create_project(&self, new: NewProject) -> StoreResult<(Project, Vec<Column>)> {
        let name = require_title(&new.name, "project name")?;
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
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

            let id = Uuid::new_v4();
            let columns: Vec<Column> = new
                .default_columns
                .iter()
                .map(|title| Column::new(id, title))
                .collect();
            let project = Project {
                id,
                name,
                description: new.description.clone(),
                status: ProjectStatus::Active,
                deadline: new.deadline,
                owner_id: new.owner_id,
                members,
                column_order: columns.iter().map(|c| c.id).collect(),
                created_at: created,
                updated_at: created,
            };

            diesel::insert_into(projects::table)
                .values(&project.to_row())
                .execute(conn)?;
            insert_members(conn, id, &project.members)?;
            diesel::insert_into(board_columns::table)
                .values(&columns)
                .execute(conn)?;

            info!(project_id = %id, columns = columns.len(), "project created");
            Ok((project, columns))
        })
    }

    fn find_project(&self, id: Uuid) -> StoreResult<Project> {
        load_project(&mut *self.conn()?, id)
    }

    fn list_projects_for(&self, user_id: Uuid) -> StoreResult<Vec<Project>> {
        let mut conn = self.conn()?;
        let memberships = project_members::table
            .filter(project_members::user_id.eq(user_id))
            .select(project_members::project_id);
        let rows: Vec<ProjectRow> = projects::table
            .filter(
                projects::owner_id
                    .eq(user_id)
                    .or(projects::id.eq_any(memberships)),
            )
            .order(projects::created_at.asc())
            .select(ProjectRow::as_select())
            .load(&mut conn)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut members: HashMap<Uuid, Vec<ProjectMember>> = HashMap::new();
        for row in project_members::table
            .filter(project_members::project_id.eq_any(ids))
            .select(ProjectMemberRow::as_select())
            .load(&mut conn)?
        {
            members.entry(row.project_id).or_default().push(row.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let list = members.remove(&row.id).unwrap_or_default();
                Project::from_row(row, list)
            })
            .collect())
    }

    fn update_project(&self, id: Uuid, edit: ProjectEdit<'_>) -> StoreResult<Project> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let mut project = lock_project(conn, id)?;
            let members_before = project.members.clone();
            edit(&mut project)?;
            project.updated_at = now();

            diesel::update(projects::table.find(id))
                .set(&project.to_row())
                .execute(conn)?;
            if project.members != members_before {
                diesel::delete(project_members::table.filter(project_members::project_id.eq(id)))
                    .execute(conn)?;
                insert_members(conn, id, &project.members)?;
            }
            Ok(project)
        })
    }

    fn add_members(&self, id: Uuid, user_ids: &[Uuid]) -> StoreResult<(Project, Vec<Uuid>)> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let mut project = lock_project(conn, id)?;
            let mut added: Vec<ProjectMember> = Vec::new();
            for user_id in user_ids {
                if !project.has_access(*user_id) && !added.iter().any(|m| m.user_id == *user_id) {
                    added.push(ProjectMember {
                        user_id: *user_id,
                        role: MemberRole::Member,
                    });
                }
            }
            if !added.is_empty() {
                insert_members(conn, id, &added)?;
                project.updated_at = now();
                diesel::update(projects::table.find(id))
                    .set(projects::updated_at.eq(project.updated_at))
                    .execute(conn)?;
            }
            let ids = added.iter().map(|m| m.user_id).collect();
            project.members.extend(added);
            Ok((project, ids))
        })
    }

    fn delete_project(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            lock_project(conn, id)?;
            let task_ids: Vec<Uuid> = tasks::table
                .filter(tasks::project_id.eq(id))
                .select(tasks::id)
                .load(conn)?;
            delete_tasks(conn, &task_ids)?;
            diesel::delete(board_columns::table.filter(board_columns::project_id.eq(id)))
                .execute(conn)?;
            diesel::delete(labels::table.filter(labels::project_id.eq(id))).execute(conn)?;
            diesel::delete(activities::table.filter(activities::project_id.eq(id)))
                .execute(conn)?;
            diesel::delete(project_members::table.filter(project_members::project_id.eq(id)))
                .execute(conn)?;
            diesel::delete(projects::table.find(id)).execute(conn)?;
            info!(project_id = %id, tasks = task_ids.len(), "project deleted");
            Ok(())
        })
    }

    fn load_board(&self, project_id: Uuid) -> StoreResult<(Project, Vec<Column>, Vec<Task>)> {
        let mut conn = self.conn()?;
        conn.build_transaction()
            .repeatable_read()
            .read_only()
            .run::<_, StoreError, _>(|conn| {
                let project = load_project(conn, project_id)?;
                let columns = project_columns(conn, project_id)?;
                let tasks = tasks::table
                    .filter(tasks::project_id.eq(project_id))
                    .select(Task::as_select())
                    .load(conn)?;
                Ok((project, columns, tasks))
            })
    }

    fn find_column(&self, id: Uuid) -> StoreResult<Column> {
        find_column_row(&mut *self.conn()?, id)
    }

    fn create_column(&self, project_id: Uuid, title: &str) -> StoreResult<Column> {
        let title = require_title(title, "column title")?;
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let mut project = lock_project(conn, project_id)?;
            let column = Column::new(project_id, &title);
            diesel::insert_into(board_columns::table)
                .values(&column)
                .execute(conn)?;
            project.column_order.push(column.id);
            save_column_order(conn, project_id, &project.column_order)?;
            info!(project_id = %project_id, column_id = %column.id, "column created");
            Ok(column)
        })
    }

    fn rename_column(&self, id: Uuid, title: &str) -> StoreResult<Column> {
        let title = require_title(title, "column title")?;
        let mut conn = self.conn()?;
        diesel::update(board_columns::table.find(id))
            .set(board_columns::title.eq(title))
            .returning(Column::as_returning())
            .get_result(&mut conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found("column", id))
    }

    fn move_column(&self, id: Uuid, position: Option<usize>) -> StoreResult<(Column, usize)> {
        let mut conn = self.conn()?;
        let project_id = find_column_row(&mut conn, id)?.project_id;
        conn.transaction::<_, StoreError, _>(|conn| {
            let mut project = lock_project(conn, project_id)?;
            let column = find_column_row(conn, id)?;
            let existing: HashSet<Uuid> = project_columns(conn, project_id)?
                .iter()
                .map(|c| c.id)
                .collect();
            let position = reorder_columns(&mut project.column_order, &existing, id, position);
            save_column_order(conn, project_id, &project.column_order)?;
            Ok((column, position))
        })
    }

    fn delete_column(&self, id: Uuid) -> StoreResult<ColumnDeletion> {
        let mut conn = self.conn()?;
        let project_id = find_column_row(&mut conn, id)?.project_id;
        conn.transaction::<_, StoreError, _>(|conn| {
            let project = lock_project(conn, project_id)?;
            let column = find_column_row(conn, id)?;
            let columns = project_columns(conn, project_id)?;
            let existing: HashSet<Uuid> = columns.iter().map(|c| c.id).collect();
            let live = live_column_order(&project.column_order, &existing, id);
            let plan = ordering::plan_column_delete(&live, id);

            let in_column: Vec<Task> = tasks::table
                .filter(tasks::column_id.eq(id))
                .select(Task::as_select())
                .load(conn)?;
            let sequence = cascade_sequence(&column, &in_column);

            let (relocated, deleted) = match plan.target {
                Some(target_id) => {
                    let mut target = columns
                        .into_iter()
                        .find(|c| c.id == target_id)
                        .ok_or_else(|| StoreError::not_found("column", target_id))?;
                    ordering::splice_front(&mut target.task_order, &sequence);
                    save_task_order(conn, &target)?;
                    diesel::update(tasks::table.filter(tasks::id.eq_any(sequence.clone())))
                        .set((
                            tasks::column_id.eq(target_id),
                            tasks::updated_at.eq(now()),
                        ))
                        .execute(conn)?;
                    (sequence, Vec::new())
                }
                None => {
                    delete_tasks(conn, &sequence)?;
                    (Vec::new(), sequence)
                }
            };

            diesel::delete(board_columns::table.find(id)).execute(conn)?;
            save_column_order(conn, project_id, &plan.column_order)?;

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
        .map_err(cascade_failed)
    }

    fn find_task(&self, id: Uuid) -> StoreResult<Task> {
        find_task_row(&mut *self.conn()?, id)
    }

    fn create_task(&self, column_id: Uuid, new: NewTask) -> StoreResult<Task> {
        require_title(&new.title, "task title")?;
        let mut conn = self.conn()?;
        let project_id = find_column_row(&mut conn, column_id)?.project_id;
        conn.transaction::<_, StoreError, _>(|conn| {
            lock_project(conn, project_id)?;
            let mut column = find_column_row(conn, column_id)?;
            let task = new.into_task(project_id, column_id);
            diesel::insert_into(tasks::table)
                .values(&task)
                .execute(conn)?;
            column.task_order.push(task.id);
            save_task_order(conn, &column)?;
            record(conn, &created_activity(&task))?;
            debug!(task_id = %task.id, column_id = %column_id, "task created");
            Ok(task)
        })
    }

    fn update_task(&self, id: Uuid, actor: Uuid, edit: TaskEdit<'_>) -> StoreResult<Task> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let mut task = tasks::table
                .find(id)
                .select(Task::as_select())
                .for_update()
                .get_result(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("task", id))?;
            let before = task.clone();
            edit(&mut task)?;
            task.updated_at = now();
            diesel::update(tasks::table.find(id))
                .set(&task)
                .execute(conn)?;
            record(conn, &updated_activity(&before, &task, actor))?;
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
        let mut conn = self.conn()?;
        let project_id = find_task_row(&mut conn, id)?.project_id;
        let dest = find_column_row(&mut conn, dest_column_id)?;
        if dest.project_id != project_id {
            return Err(StoreError::Invalid(
                "destination column belongs to another project".to_string(),
            ));
        }

        conn.transaction::<_, StoreError, _>(|conn| {
            lock_project(conn, project_id)?;
            let mut task = find_task_row(conn, id)?;
            let original = task.clone();
            let mut columns = project_columns(conn, project_id)?;
            let live = project_task_ids(conn, project_id)?;
            let (outcome, touched) =
                apply_task_move(&mut columns, &mut task, &live, dest_column_id, position)?;

            for column in columns.iter().filter(|c| touched.contains(&c.id)) {
                save_task_order(conn, column)?;
            }
            if task != original {
                diesel::update(tasks::table.find(id))
                    .set((
                        tasks::column_id.eq(task.column_id),
                        tasks::updated_at.eq(task.updated_at),
                    ))
                    .execute(conn)?;
            }
            record(conn, &moved_activity(&outcome, actor))?;
            Ok(outcome)
        })
    }

    fn delete_task(&self, id: Uuid) -> StoreResult<Task> {
        let mut conn = self.conn()?;
        let project_id = find_task_row(&mut conn, id)?.project_id;
        conn.transaction::<_, StoreError, _>(|conn| {
            lock_project(conn, project_id)?;
            let task = find_task_row(conn, id)?;
            let holders: Vec<Column> = board_columns::table
                .filter(board_columns::project_id.eq(project_id))
                .filter(board_columns::task_order.contains(vec![id]))
                .select(Column::as_select())
                .load(conn)?;
            if holders.is_empty() {
                warn!(task_id = %id, "deleted task was missing from every taskOrder");
            }
            for mut column in holders {
                ordering::remove_id(&mut column.task_order, id);
                save_task_order(conn, &column)?;
            }
            delete_tasks(conn, &[id])?;
            Ok(task)
        })
    }

    fn create_label(&self, project_id: Uuid, text: &str, color: &str) -> StoreResult<Label> {
        let text = require_title(text, "label text")?;
        if !is_hex_color(color) {
            return Err(StoreError::Invalid(format!("invalid hex color: {color}")));
        }
        let mut conn = self.conn()?;
        load_project(&mut conn, project_id)?;
        let label = Label {
            id: Uuid::new_v4(),
            project_id,
            text,
            color: color.to_string(),
        };
        Ok(diesel::insert_into(labels::table)
            .values(&label)
            .returning(Label::as_returning())
            .get_result(&mut conn)?)
    }

    fn find_label(&self, id: Uuid) -> StoreResult<Label> {
        labels::table
            .find(id)
            .select(Label::as_select())
            .get_result(&mut self.conn()?)
            .optional()?
            .ok_or_else(|| StoreError::not_found("label", id))
    }

    fn list_labels(&self, project_id: Uuid) -> StoreResult<Vec<Label>> {
        Ok(labels::table
            .filter(labels::project_id.eq(project_id))
            .order(labels::text.asc())
            .select(Label::as_select())
            .load(&mut self.conn()?)?)
    }

    fn delete_label(&self, id: Uuid) -> StoreResult<(Label, Vec<Task>)> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let label = diesel::delete(labels::table.find(id))
                .returning(Label::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("label", id))?;
            let tagged: Vec<Task> = tasks::table
                .filter(tasks::labels.contains(vec![id]))
                .select(Task::as_select())
                .for_update()
                .load(conn)?;
            let mut touched = Vec::with_capacity(tagged.len());
            for mut task in tagged {
                task.labels.retain(|l| *l != id);
                task.updated_at = now();
                diesel::update(tasks::table.find(task.id))
                    .set((
                        tasks::labels.eq(task.labels.clone()),
                        tasks::updated_at.eq(task.updated_at),
                    ))
                    .execute(conn)?;
                touched.push(task);
            }
            Ok((label, touched))
        })
    }

    fn add_comment(&self, task_id: Uuid, author_id: Uuid, content: &str) -> StoreResult<Comment> {
        let content = require_title(content, "comment content")?;
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let task = find_task_row(conn, task_id)?;
            let comment = Comment {
                id: Uuid::new_v4(),
                task_id,
                author_id,
                content,
                created_at: now(),
            };
            let comment: Comment = diesel::insert_into(comments::table)
                .values(&comment)
                .returning(Comment::as_returning())
                .get_result(conn)?;
            record(conn, &comment_activity(&task, &comment))?;
            Ok(comment)
        })
    }

    fn list_comments(&self, task_id: Uuid) -> StoreResult<Vec<Comment>> {
        let mut conn = self.conn()?;
        find_task_row(&mut conn, task_id)?;
        Ok(comments::table
            .filter(comments::task_id.eq(task_id))
            .order(comments::created_at.asc())
            .select(Comment::as_select())
            .load(&mut conn)?)
    }

    fn list_activities(&self, project_id: Uuid) -> StoreResult<Vec<Activity>> {
        let mut conn = self.conn()?;
        load_project(&mut conn, project_id)?;
        Ok(activities::table
            .filter(activities::project_id.eq(project_id))
            .order((activities::created_at.desc(), activities::id.desc()))
            .select(Activity::as_select())
            .load(&mut conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::ActivityAction;
    use dotenv::dotenv;
    use std::sync::Arc;

    fn test_store() -> PgStore {
        dotenv().ok();
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set in .env file");
        PgStore::connect(&database_url, 2).expect("Failed to create pool.")
    }

    fn new_project(owner_id: Uuid, columns: &[&str]) -> NewProject {
        NewProject {
            name: "Pg board".to_string(),
            description: None,
            deadline: None,
            owner_id,
            members: vec![],
            default_columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn new_task(creator_id: Uuid, title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: None,
            creator_id,
            due_date: None,
            assignees: vec![],
            labels: vec![],
        }
    }

    #[test]
    #[ignore = "requires DATABASE_URL"]
    fn test_move_task_roundtrip() {
        let store = test_store();
        let owner = Uuid::new_v4();
        let (project, columns) = store
            .create_project(new_project(owner, &["A", "B"]))
            .expect("Failed to create project");
        let t1 = store.create_task(columns[0].id, new_task(owner, "t1")).unwrap();
        let t2 = store.create_task(columns[1].id, new_task(owner, "t2")).unwrap();

        let outcome = store.move_task(t1.id, owner, columns[1].id, Some(0)).unwrap();

        assert_eq!(outcome.source_column_id, columns[0].id);
        assert!(store.find_column(columns[0].id).unwrap().task_order.is_empty());
        assert_eq!(
            store.find_column(columns[1].id).unwrap().task_order,
            vec![t1.id, t2.id]
        );
        assert_eq!(store.find_task(t1.id).unwrap().column_id, columns[1].id);

        let log = store.list_activities(project.id).unwrap();
        assert_eq!(log.len(), 3);
        assert!(log
            .iter()
            .any(|a| a.action == ActivityAction::MovedTask && a.task_id == Some(t1.id)));

        store.delete_project(project.id).unwrap();
    }

    #[test]
    #[ignore = "requires DATABASE_URL"]
    fn test_delete_column_cascade() {
        let store = test_store();
        let owner = Uuid::new_v4();
        let (project, columns) = store
            .create_project(new_project(owner, &["c1", "c2", "c3"]))
            .expect("Failed to create project");
        let t1 = store.create_task(columns[1].id, new_task(owner, "t1")).unwrap();
        let t3 = store.create_task(columns[2].id, new_task(owner, "t3")).unwrap();

        let deletion = store.delete_column(columns[1].id).unwrap();

        assert_eq!(deletion.target_column_id, Some(columns[2].id));
        assert_eq!(
            store.find_project(project.id).unwrap().column_order,
            vec![columns[0].id, columns[2].id]
        );
        assert_eq!(
            store.find_column(columns[2].id).unwrap().task_order,
            vec![t1.id, t3.id]
        );

        store.delete_project(project.id).unwrap();
        assert!(matches!(
            store.find_project(project.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    #[ignore = "requires DATABASE_URL"]
    fn test_concurrent_moves_keep_integrity() {
        dotenv().ok();
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set in .env file");
        let store = Arc::new(PgStore::connect(&database_url, 8).expect("Failed to create pool."));
        let owner = Uuid::new_v4();
        let (project, columns) = store
            .create_project(new_project(owner, &["A", "B"]))
            .expect("Failed to create project");
        let (a, b) = (columns[0].id, columns[1].id);
        let tasks: Vec<Uuid> = (0..8)
            .map(|i| {
                store
                    .create_task(columns[i % 2].id, new_task(owner, "t"))
                    .unwrap()
                    .id
            })
            .collect();

        std::thread::scope(|scope| {
            for worker in 0..6usize {
                let store = Arc::clone(&store);
                let tasks = &tasks;
                scope.spawn(move || {
                    for step in 0..20usize {
                        let task = tasks[(worker * 3 + step) % tasks.len()];
                        let dest = if (worker + step) % 3 == 0 { a } else { b };
                        store
                            .move_task(task, owner, dest, Some((worker + step) % 5))
                            .expect("concurrent move failed");
                    }
                });
            }
        });

        let (_, columns, stored) = store.load_board(project.id).unwrap();
        for task in &stored {
            let holders: Vec<&Column> = columns
                .iter()
                .filter(|c| c.task_order.contains(&task.id))
                .collect();
            assert_eq!(holders.len(), 1, "task {} listed {} times", task.id, holders.len());
            assert_eq!(holders[0].id, task.column_id);
        }
        let listed: usize = columns.iter().map(|c| c.task_order.len()).sum();
        assert_eq!(listed, tasks.len());

        store.delete_project(project.id).unwrap();
    }
}
