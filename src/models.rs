//! Entity types for the four-level Project/SubProject/Task/SubTask hierarchy
//! plus the dependency and template rows.

use serde::{Deserialize, Serialize};

/// Status of a Task or SubTask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Unset,
    NotStarted,
    InProgress,
    Done,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unset => "UNSET",
            Status::NotStarted => "NOT_STARTED",
            Status::InProgress => "IN_PROGRESS",
            Status::Done => "DONE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "UNSET" => Some(Status::Unset),
            "NOT_STARTED" => Some(Status::NotStarted),
            "IN_PROGRESS" => Some(Status::InProgress),
            "DONE" => Some(Status::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubProject {
    pub id: i64,
    pub project_id: i64,
    pub parent_subproject_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub subproject_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub status: Status,
    pub order_index: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: i64,
    pub task_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: Status,
    pub order_index: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A directed edge in either dependency DAG (Task-level or SubTask-level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: i64,
    pub predecessor_id: i64,
    pub successor_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub include_tasks: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateTask {
    pub id: i64,
    pub template_id: i64,
    pub task_order: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSubTask {
    pub id: i64,
    pub template_task_id: i64,
    pub subtask_order: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDependency {
    pub id: i64,
    pub template_id: i64,
    pub predecessor_order: i64,
    pub successor_order: i64,
}

/// Which side of the SubProject boundary an external dependency crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// The internal Task depends on a Task outside the SubProject.
    Outgoing,
    /// A Task outside the SubProject depends on the internal Task.
    Incoming,
}

/// A dependency edge crossing a SubProject's boundary, surfaced as a
/// warning (not an error) when saving it as a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDependencyWarning {
    pub from_task_id: i64,
    pub from_task_name: String,
    pub to_task_id: i64,
    pub to_task_name: String,
    pub direction: Direction,
}

/// Result of `crate::template::save`: the stored Template plus any
/// boundary-crossing dependencies detected along the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveTemplateResult {
    pub template: Template,
    pub external_dependencies: Vec<ExternalDependencyWarning>,
}

/// Preview of what `crate::template::apply` would create, without creating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePreview {
    pub subproject_name: String,
    pub task_count: i64,
    pub subtask_count: i64,
    pub dependency_count: i64,
    /// One entry per Task, its name suffixed with `(SubTasks: N)` when it
    /// carries any.
    pub task_names: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_token() {
        for status in [
            Status::Unset,
            Status::NotStarted,
            Status::InProgress,
            Status::Done,
        ] {
            assert_eq!(Status::from_str(status.as_str()), Some(status));
        }
        assert_eq!(Status::from_str("bogus"), None);
    }
}
