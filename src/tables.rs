use crate::schema::*;
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::{Jsonb, Text};
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

pub fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

// * Enums stored as text .....................................................

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    #[default]
    Active,
    OnHold,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on-hold",
            ProjectStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(ProjectStatus::Active),
            "on-hold" => Some(ProjectStatus::OnHold),
            "completed" => Some(ProjectStatus::Completed),
            _ => None,
        }
    }
}

impl ToSql<Text, Pg> for ProjectStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for ProjectStatus {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        let text = std::str::from_utf8(bytes.as_bytes())?;
        ProjectStatus::parse(text).ok_or_else(|| format!("unknown project status: {text}").into())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    #[default]
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }
}

impl ToSql<Text, Pg> for MemberRole {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for MemberRole {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"owner" => Ok(MemberRole::Owner),
            b"admin" => Ok(MemberRole::Admin),
            b"member" => Ok(MemberRole::Member),
            other => Err(format!("unknown member role: {}", String::from_utf8_lossy(other)).into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityAction {
    CreatedTask,
    UpdatedTask,
    MovedTask,
    AddedComment,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::CreatedTask => "created-task",
            ActivityAction::UpdatedTask => "updated-task",
            ActivityAction::MovedTask => "moved-task",
            ActivityAction::AddedComment => "added-comment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created-task" => Some(ActivityAction::CreatedTask),
            "updated-task" => Some(ActivityAction::UpdatedTask),
            "moved-task" => Some(ActivityAction::MovedTask),
            "added-comment" => Some(ActivityAction::AddedComment),
            _ => None,
        }
    }
}

impl ToSql<Text, Pg> for ActivityAction {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for ActivityAction {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        let text = std::str::from_utf8(bytes.as_bytes())?;
        ActivityAction::parse(text).ok_or_else(|| format!("unknown activity action: {text}").into())
    }
}

// * Checklist (jsonb) ........................................................

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// Checklist items are addressed by their position, there is no stable id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Jsonb)]
#[serde(transparent)]
pub struct Checklist(pub Vec<ChecklistItem>);

impl ToSql<Jsonb, Pg> for Checklist {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        // jsonb binary format: version byte followed by the json text
        out.write_all(&[1])?;
        serde_json::to_writer(out, &self.0)?;
        Ok(IsNull::No)
    }
}

impl FromSql<Jsonb, Pg> for Checklist {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        let bytes = bytes.as_bytes();
        match bytes.split_first() {
            Some((&1, json)) => Ok(Checklist(serde_json::from_slice(json)?)),
            _ => Err("unsupported jsonb encoding version".into()),
        }
    }
}

// * Projects .................................................................

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMember {
    pub user_id: Uuid,
    pub role: MemberRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub deadline: Option<chrono::NaiveDateTime>,
    pub owner_id: Uuid,
    pub members: Vec<ProjectMember>,
    pub column_order: Vec<Uuid>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl Project {
    pub fn is_owner(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    /// Owner or listed member.
    pub fn has_access(&self, user_id: Uuid) -> bool {
        self.is_owner(user_id) || self.members.iter().any(|m| m.user_id == user_id)
    }

    pub fn from_row(row: ProjectRow, members: Vec<ProjectMember>) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            status: row.status,
            deadline: row.deadline,
            owner_id: row.owner_id,
            members,
            column_order: row.column_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    pub fn to_row(&self) -> ProjectRow {
        ProjectRow {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            status: self.status,
            deadline: self.deadline,
            owner_id: self.owner_id,
            column_order: self.column_order.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = projects)]
#[diesel(treat_none_as_null = true)]
pub struct ProjectRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub deadline: Option<chrono::NaiveDateTime>,
    pub owner_id: Uuid,
    pub column_order: Vec<Uuid>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = project_members)]
pub struct ProjectMemberRow {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
}

impl From<ProjectMemberRow> for ProjectMember {
    fn from(row: ProjectMemberRow) -> Self {
        Self {
            user_id: row.user_id,
            role: row.role,
        }
    }
}

// * Columns ..................................................................

#[derive(
    Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize,
)]
#[diesel(table_name = board_columns)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub task_order: Vec<Uuid>,
    pub created_at: chrono::NaiveDateTime,
}

impl Column {
    pub fn new(project_id: Uuid, title: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            title: title.trim().to_string(),
            task_order: Vec::new(),
            created_at: now(),
        }
    }
}

// * Tasks ....................................................................

#[derive(
    Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize,
)]
#[diesel(table_name = tasks)]
#[diesel(treat_none_as_null = true)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    pub assignees: Vec<Uuid>,
    pub due_date: Option<chrono::NaiveDateTime>,
    pub labels: Vec<Uuid>,
    pub checklist: Checklist,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

// * Labels and comments ......................................................

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = labels)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: Uuid,
    pub project_id: Uuid,
    pub text: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = comments)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: chrono::NaiveDateTime,
}

// * Activity log .............................................................

/// One entry of a project's history. `task_id` is kept after the task is
/// deleted, so it may no longer resolve.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = activities)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub project_id: Uuid,
    pub task_id: Option<Uuid>,
    pub user_id: Uuid,
    pub action: ActivityAction,
    pub details: serde_json::Value,
    pub created_at: chrono::NaiveDateTime,
}

impl Activity {
    pub fn for_task(
        task: &Task,
        user_id: Uuid,
        action: ActivityAction,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: task.project_id,
            task_id: Some(task.id),
            user_id,
            action,
            details,
            created_at: now(),
        }
    }
}

/// `#rgb` or `#rrggbb`, case-insensitive.
pub fn is_hex_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
