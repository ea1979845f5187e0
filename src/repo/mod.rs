//! Entity repositories: CRUD for Project / SubProject / Task / SubTask.
//!
//! Every function here takes `conn: &Connection` rather than owning a
//! connection itself — `rusqlite::Transaction` derefs to `Connection`, so
//! the same function works whether the caller is running standalone (via
//! `Store::transaction`) or composing inside a larger transaction (deletion
//! cascades, template apply). The outer `Store` entry points decide commit
//! vs. participate vs. dry-run; these functions never do.

pub mod project;
pub mod subproject;
pub mod subtask;
pub mod task;
pub mod template;

/// Counts of rows that would be (or were) removed by a cascade delete, plus
/// any dependency edges a bridge delete inserted (or would insert, on a
/// dry run) to reconnect around the removed node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CascadeImpact {
    pub projects: i64,
    pub subprojects: i64,
    pub tasks: i64,
    pub subtasks: i64,
    pub task_dependencies: i64,
    pub subtask_dependencies: i64,
    pub bridged_edges: Vec<(i64, i64)>,
}
