//! Deletion engine: a thin composition of the repository delete variants
//! and the dependency engine's bridge operation, unified behind one
//! entity-kind-agnostic entry point.

use rusqlite::Connection;

use crate::error::Error;
use crate::repo::{self, CascadeImpact};

/// Which entity a delete call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Project,
    SubProject,
    Task,
    SubTask,
}

/// How a delete should handle the target's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fail if any child exists.
    Restrict,
    /// Rewire dependency edges around the node before removing it.
    /// Valid only for `EntityKind::Task` and `EntityKind::SubTask`.
    Bridge,
    /// Remove the entire subtree: children before parents, dependency rows
    /// before the nodes they reference.
    Cascade,
}

/// Delete `id` of kind `entity` using `mode`. `dry_run` runs the same
/// decision logic (and, for `Cascade`, the same impact count) inside a
/// transaction that is always rolled back by the caller.
pub fn delete(
    conn: &Connection,
    entity: EntityKind,
    id: i64,
    mode: Mode,
    dry_run: bool,
) -> Result<CascadeImpact, Error> {
    match (entity, mode) {
        (EntityKind::Project, Mode::Restrict) => {
            if dry_run {
                // restrict mode has nothing to preview beyond success/failure;
                // run the same guard without committing by delegating to cascade's
                // counting path would be misleading, so just validate directly.
                probe_restrict(conn, entity, id)?;
                Ok(CascadeImpact::default())
            } else {
                repo::project::delete(conn, id)?;
                Ok(CascadeImpact {
                    projects: 1,
                    ..Default::default()
                })
            }
        }
        (EntityKind::Project, Mode::Cascade) => repo::project::cascade_delete(conn, id, dry_run),
        (EntityKind::Project, Mode::Bridge) => Err(Error::ConstraintViolation(
            "bridge delete is not supported for Projects".into(),
        )),

        (EntityKind::SubProject, Mode::Restrict) => {
            if dry_run {
                probe_restrict(conn, entity, id)?;
                Ok(CascadeImpact::default())
            } else {
                repo::subproject::delete(conn, id)?;
                Ok(CascadeImpact {
                    subprojects: 1,
                    ..Default::default()
                })
            }
        }
        (EntityKind::SubProject, Mode::Cascade) => repo::subproject::cascade_delete(conn, id, dry_run),
        (EntityKind::SubProject, Mode::Bridge) => Err(Error::ConstraintViolation(
            "bridge delete is not supported for SubProjects".into(),
        )),

        (EntityKind::Task, Mode::Restrict) => {
            if dry_run {
                probe_restrict(conn, entity, id)?;
                Ok(CascadeImpact::default())
            } else {
                repo::task::delete(conn, id)?;
                Ok(CascadeImpact {
                    tasks: 1,
                    ..Default::default()
                })
            }
        }
        (EntityKind::Task, Mode::Bridge) => {
            if dry_run {
                probe_restrict(conn, entity, id)?;
                let bridged_edges = crate::dependency::preview_bridge(conn, crate::dependency::GraphKind::Task, id)?;
                Ok(CascadeImpact {
                    tasks: 1,
                    bridged_edges,
                    ..Default::default()
                })
            } else {
                let bridged_edges = repo::task::delete_with_bridge(conn, id)?;
                Ok(CascadeImpact {
                    tasks: 1,
                    bridged_edges,
                    ..Default::default()
                })
            }
        }
        (EntityKind::Task, Mode::Cascade) => repo::task::cascade_delete(conn, id, dry_run),

        (EntityKind::SubTask, Mode::Restrict) => {
            if dry_run {
                Ok(CascadeImpact::default())
            } else {
                repo::subtask::delete(conn, id)?;
                Ok(CascadeImpact {
                    subtasks: 1,
                    ..Default::default()
                })
            }
        }
        (EntityKind::SubTask, Mode::Bridge) => {
            if dry_run {
                let bridged_edges =
                    crate::dependency::preview_bridge(conn, crate::dependency::GraphKind::SubTask, id)?;
                Ok(CascadeImpact {
                    subtasks: 1,
                    bridged_edges,
                    ..Default::default()
                })
            } else {
                let bridged_edges = repo::subtask::delete_with_bridge(conn, id)?;
                Ok(CascadeImpact {
                    subtasks: 1,
                    bridged_edges,
                    ..Default::default()
                })
            }
        }
        (EntityKind::SubTask, Mode::Cascade) => repo::subtask::cascade_delete(conn, id, dry_run),
    }
}

/// Re-run a restrict-mode guard without mutating, for dry-run previews.
fn probe_restrict(conn: &Connection, entity: EntityKind, id: i64) -> Result<(), Error> {
    match entity {
        EntityKind::Project => {
            repo::project::get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
                kind: crate::error::EntityKind::Project,
                id,
            })?;
            let children = repo::project::child_count(conn, id)?;
            reject_if_children(id, children)
        }
        EntityKind::SubProject => {
            repo::subproject::get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
                kind: crate::error::EntityKind::SubProject,
                id,
            })?;
            let children = repo::subproject::child_count(conn, id)?;
            reject_if_children(id, children)
        }
        EntityKind::Task => {
            repo::task::get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
                kind: crate::error::EntityKind::Task,
                id,
            })?;
            let children = repo::task::subtask_count(conn, id)?;
            reject_if_children(id, children)
        }
        EntityKind::SubTask => Ok(()),
    }
}

fn reject_if_children(id: i64, children: i64) -> Result<(), Error> {
    if children > 0 {
        return Err(Error::Deletion {
            reason: crate::error::DeletionReason::ChildExists,
            details: crate::error::DeletionDetails {
                entity_id: Some(id),
                child_count: children,
            },
        });
    }
    Ok(())
}
