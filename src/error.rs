//! Structured error taxonomy shared by every engine in this crate.

use std::fmt;

/// Which entity kind an `Error::EntityNotFound` or detail record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Project,
    SubProject,
    Task,
    SubTask,
    Template,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Project => "Project",
            EntityKind::SubProject => "SubProject",
            EntityKind::Task => "Task",
            EntityKind::SubTask => "SubTask",
            EntityKind::Template => "Template",
        };
        f.write_str(s)
    }
}

/// Reason code attached to a failed DONE-transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReason {
    NodeNotFound,
    PrerequisiteNotDone,
    ChildNotDone,
    InvalidStatus,
    InvalidNodeType,
}

/// A predecessor or child SubTask that blocked a DONE transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteNode {
    pub id: i64,
    pub name: String,
    pub status: crate::models::Status,
}

/// Extra detail carried alongside a `StatusReason`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusDetails {
    pub node_id: Option<i64>,
    pub incomplete_predecessors: Vec<IncompleteNode>,
    pub incomplete_children: Vec<IncompleteNode>,
}

/// Reason code attached to a rejected deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionReason {
    ChildExists,
}

/// Extra detail carried alongside a `DeletionReason`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeletionDetails {
    pub entity_id: Option<i64>,
    pub child_count: i64,
}

/// The closed error taxonomy for the whole engine.
///
/// Engines never recover from one of these; they translate low-level store
/// failures into a variant here and surface it. Terminal collaborators map
/// each variant to a user-visible message and exit code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("adding dependency {predecessor} -> {successor} would create a cycle")]
    CyclicDependency { predecessor: i64, successor: i64 },

    #[error("status transition rejected: {reason:?}")]
    StatusTransition {
        reason: StatusReason,
        details: StatusDetails,
    },

    #[error("deletion rejected: {reason:?}")]
    Deletion {
        reason: DeletionReason,
        details: DeletionDetails,
    },

    #[error("{kind} {id} not found")]
    EntityNotFound { kind: EntityKind, id: i64 },

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
