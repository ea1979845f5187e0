//! Status-transition engine: the only code path allowed to move a Task or
//! SubTask to DONE, gated on its predecessors (and, for a Task, its child
//! SubTasks) already being DONE.

use rusqlite::Connection;

use crate::dependency::{self, GraphKind};
use crate::error::{EntityKind, Error, IncompleteNode, StatusDetails, StatusReason};
use crate::models::Status;
use crate::repo;

fn incomplete_predecessors(conn: &Connection, kind: GraphKind, node_id: i64) -> Result<Vec<IncompleteNode>, Error> {
    let neighbors = dependency::neighbors(conn, kind, node_id)?;
    let mut incomplete = Vec::new();
    for pred_id in neighbors.predecessors {
        let (name, status) = match kind {
            GraphKind::Task => {
                let task = repo::task::get_by_id(conn, pred_id)?.ok_or(Error::EntityNotFound {
                    kind: EntityKind::Task,
                    id: pred_id,
                })?;
                (task.name, task.status)
            }
            GraphKind::SubTask => {
                let subtask = repo::subtask::get_by_id(conn, pred_id)?.ok_or(Error::EntityNotFound {
                    kind: EntityKind::SubTask,
                    id: pred_id,
                })?;
                (subtask.name, subtask.status)
            }
        };
        if status != Status::Done {
            incomplete.push(IncompleteNode {
                id: pred_id,
                name,
                status,
            });
        }
    }
    Ok(incomplete)
}

fn incomplete_child_subtasks(conn: &Connection, task_id: i64) -> Result<Vec<IncompleteNode>, Error> {
    let subtasks = repo::subtask::get_by_task(conn, task_id)?;
    Ok(subtasks
        .into_iter()
        .filter(|st| st.status != Status::Done)
        .map(|st| IncompleteNode {
            id: st.id,
            name: st.name,
            status: st.status,
        })
        .collect())
}

/// Check whether `node_id` is allowed to transition to DONE right now,
/// without performing the write. Predecessors are checked before child
/// SubTasks, matching the original manager's ordering.
pub fn validate_done_transition(conn: &Connection, kind: GraphKind, node_id: i64) -> Result<(), Error> {
    let exists = match kind {
        GraphKind::Task => repo::task::get_by_id(conn, node_id)?.is_some(),
        GraphKind::SubTask => repo::subtask::get_by_id(conn, node_id)?.is_some(),
    };
    if !exists {
        return Err(Error::StatusTransition {
            reason: StatusReason::NodeNotFound,
            details: StatusDetails {
                node_id: Some(node_id),
                ..Default::default()
            },
        });
    }

    let incomplete_predecessors = incomplete_predecessors(conn, kind, node_id)?;
    if !incomplete_predecessors.is_empty() {
        return Err(Error::StatusTransition {
            reason: StatusReason::PrerequisiteNotDone,
            details: StatusDetails {
                node_id: Some(node_id),
                incomplete_predecessors,
                incomplete_children: Vec::new(),
            },
        });
    }

    if let GraphKind::Task = kind {
        let incomplete_children = incomplete_child_subtasks(conn, node_id)?;
        if !incomplete_children.is_empty() {
            return Err(Error::StatusTransition {
                reason: StatusReason::ChildNotDone,
                details: StatusDetails {
                    node_id: Some(node_id),
                    incomplete_predecessors: Vec::new(),
                    incomplete_children,
                },
            });
        }
    }

    Ok(())
}

/// The outcome of a status-transition preflight, returned without performing
/// any write. `reason`/`details` are populated exactly as they would be on
/// the `Err` arm of the mutating call, so callers can render the same
/// explanation before deciding whether to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusVerdict {
    pub ok: bool,
    pub message: String,
    pub reason: Option<StatusReason>,
    pub details: Option<StatusDetails>,
}

impl StatusVerdict {
    fn allowed() -> Self {
        StatusVerdict {
            ok: true,
            message: "transition allowed".to_string(),
            reason: None,
            details: None,
        }
    }

    fn rejected(reason: StatusReason, details: StatusDetails) -> Self {
        let message = match reason {
            StatusReason::NodeNotFound => {
                format!("node {} not found", details.node_id.unwrap_or_default())
            }
            StatusReason::PrerequisiteNotDone => format!(
                "{} predecessor(s) are not yet DONE",
                details.incomplete_predecessors.len()
            ),
            StatusReason::ChildNotDone => format!(
                "{} child SubTask(s) are not yet DONE",
                details.incomplete_children.len()
            ),
            StatusReason::InvalidStatus => "status does not parse against the closed status set".to_string(),
            StatusReason::InvalidNodeType => "node type does not accept this transition".to_string(),
        };
        StatusVerdict {
            ok: false,
            message,
            reason: Some(reason),
            details: Some(details),
        }
    }
}

/// Preflight a status transition without writing anything. Calls the same
/// `validate_done_transition` the mutating path runs, so the verdict
/// returned here is exactly the one `update_status` would act on.
pub fn dry_run_status_update(
    conn: &Connection,
    kind: GraphKind,
    node_id: i64,
    new_status: &str,
) -> Result<StatusVerdict, Error> {
    let status = crate::validators::status(new_status)?;

    let exists = match kind {
        GraphKind::Task => repo::task::get_by_id(conn, node_id)?.is_some(),
        GraphKind::SubTask => repo::subtask::get_by_id(conn, node_id)?.is_some(),
    };
    if !exists {
        return Ok(StatusVerdict::rejected(
            StatusReason::NodeNotFound,
            StatusDetails {
                node_id: Some(node_id),
                ..Default::default()
            },
        ));
    }

    if status != Status::Done {
        return Ok(StatusVerdict::allowed());
    }

    match validate_done_transition(conn, kind, node_id) {
        Ok(()) => Ok(StatusVerdict::allowed()),
        Err(Error::StatusTransition { reason, details }) => Ok(StatusVerdict::rejected(reason, details)),
        Err(other) => Err(other),
    }
}

/// Update a Task's or SubTask's status. DONE transitions are gated by
/// `validate_done_transition`; every other status is written unconditionally
/// once it parses against the closed status set.
pub fn update_status(conn: &Connection, kind: GraphKind, node_id: i64, status: &str) -> Result<(), Error> {
    let status = crate::validators::status(status)?;

    if status == Status::Done {
        validate_done_transition(conn, kind, node_id)?;
    } else {
        let exists = match kind {
            GraphKind::Task => repo::task::get_by_id(conn, node_id)?.is_some(),
            GraphKind::SubTask => repo::subtask::get_by_id(conn, node_id)?.is_some(),
        };
        if !exists {
            return Err(Error::StatusTransition {
                reason: StatusReason::NodeNotFound,
                details: StatusDetails {
                    node_id: Some(node_id),
                    ..Default::default()
                },
            });
        }
    }

    match kind {
        GraphKind::Task => repo::task::set_status(conn, node_id, status)?,
        GraphKind::SubTask => repo::subtask::set_status(conn, node_id, status)?,
    }
    log::debug!("status({kind:?}, {node_id}) -> {}", status.as_str());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn done_transition_requires_predecessors_done() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = repo::project::create(tx, "P", None)?;
                let a = repo::task::create(tx, p.id, None, "A", None)?;
                let b = repo::task::create(tx, p.id, None, "B", None)?;
                dependency::add(tx, GraphKind::Task, a.id, b.id)?;

                assert!(matches!(
                    update_status(tx, GraphKind::Task, b.id, "DONE"),
                    Err(Error::StatusTransition {
                        reason: StatusReason::PrerequisiteNotDone,
                        ..
                    })
                ));

                update_status(tx, GraphKind::Task, a.id, "DONE")?;
                update_status(tx, GraphKind::Task, b.id, "DONE")?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn task_done_requires_subtasks_done() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = repo::project::create(tx, "P", None)?;
                let t = repo::task::create(tx, p.id, None, "T", None)?;
                let st = repo::subtask::create(tx, t.id, "ST", None)?;

                assert!(matches!(
                    update_status(tx, GraphKind::Task, t.id, "DONE"),
                    Err(Error::StatusTransition {
                        reason: StatusReason::ChildNotDone,
                        ..
                    })
                ));

                update_status(tx, GraphKind::SubTask, st.id, "DONE")?;
                update_status(tx, GraphKind::Task, t.id, "DONE")?;
                Ok(())
            })
            .unwrap();
    }
}
