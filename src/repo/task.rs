//! CRUD for Task, which hangs directly off a Project or, optionally, off a
//! SubProject of that Project.

use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{DeletionDetails, DeletionReason, EntityKind, Error};
use crate::models::{Status, Task};
use crate::repo::CascadeImpact;
use crate::store::now;
use crate::validators;

fn from_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    Ok(Task {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        subproject_id: row.get("subproject_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        status: Status::from_str(&status).unwrap_or(Status::Unset),
        order_index: row.get("order_index")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn create(
    conn: &Connection,
    project_id: i64,
    subproject_id: Option<i64>,
    name: &str,
    description: Option<&str>,
) -> Result<Task, Error> {
    super::project::get_by_id(conn, project_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Project,
        id: project_id,
    })?;
    if let Some(sp_id) = subproject_id {
        let subproject = super::subproject::get_by_id(conn, sp_id)?.ok_or(Error::EntityNotFound {
            kind: EntityKind::SubProject,
            id: sp_id,
        })?;
        if subproject.project_id != project_id {
            return Err(Error::ConstraintViolation(
                "subproject does not belong to the given project".into(),
            ));
        }
    }

    let name = validators::name(name)?;
    let description = validators::description(description)?;

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks
         WHERE project_id = ?1 AND name = ?2 AND subproject_id IS ?3)",
        rusqlite::params![project_id, name, subproject_id],
        |row| row.get(0),
    )?;
    if exists {
        return Err(Error::ConstraintViolation(format!(
            "a task named '{name}' already exists in this scope"
        )));
    }

    let order_index: i64 = conn.query_row(
        "SELECT COALESCE(MAX(order_index), -1) + 1 FROM tasks
         WHERE project_id = ?1 AND subproject_id IS ?2",
        rusqlite::params![project_id, subproject_id],
        |row| row.get(0),
    )?;

    let now = now();
    conn.execute(
        "INSERT INTO tasks
            (project_id, subproject_id, name, description, status, order_index, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        rusqlite::params![
            project_id,
            subproject_id,
            name,
            description,
            Status::Unset.as_str(),
            order_index,
            now
        ],
    )?;
    let id = conn.last_insert_rowid();

    touch_parent(conn, project_id, subproject_id, &now)?;

    Ok(Task {
        id,
        project_id,
        subproject_id,
        name,
        description,
        status: Status::Unset,
        order_index,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Touch the immediate parent's `updated_at` — the SubProject if this Task
/// is scoped to one, else the Project directly.
pub(crate) fn touch_parent(
    conn: &Connection,
    project_id: i64,
    subproject_id: Option<i64>,
    now: &str,
) -> Result<(), Error> {
    if let Some(subproject_id) = subproject_id {
        conn.execute(
            "UPDATE subprojects SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, subproject_id],
        )?;
    } else {
        conn.execute(
            "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, project_id],
        )?;
    }
    Ok(())
}

pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Task>, Error> {
    Ok(conn
        .query_row("SELECT * FROM tasks WHERE id = ?1", [id], from_row)
        .optional()?)
}

/// All Tasks scoped to a Project, optionally narrowed to a SubProject
/// (`None` selects the Project's direct Tasks, not every descendant).
pub fn get_by_parent(
    conn: &Connection,
    project_id: i64,
    subproject_id: Option<i64>,
) -> Result<Vec<Task>, Error> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tasks WHERE project_id = ?1 AND subproject_id IS ?2 ORDER BY order_index",
    )?;
    let rows = stmt.query_map(rusqlite::params![project_id, subproject_id], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_by_status(conn: &Connection, project_id: i64, status: Status) -> Result<Vec<Task>, Error> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tasks WHERE project_id = ?1 AND status = ?2 ORDER BY order_index",
    )?;
    let rows = stmt.query_map(rusqlite::params![project_id, status.as_str()], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn update(
    conn: &Connection,
    id: i64,
    name: Option<&str>,
    description: Option<Option<&str>>,
) -> Result<Task, Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Task,
        id,
    })?;

    let new_name = match name {
        Some(n) => validators::name(n)?,
        None => existing.name.clone(),
    };
    let new_description = match description {
        Some(d) => validators::description(d)?,
        None => existing.description.clone(),
    };

    if new_name != existing.name {
        let conflict: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tasks
             WHERE project_id = ?1 AND name = ?2 AND subproject_id IS ?3 AND id != ?4)",
            rusqlite::params![existing.project_id, new_name, existing.subproject_id, id],
            |row| row.get(0),
        )?;
        if conflict {
            return Err(Error::ConstraintViolation(format!(
                "a task named '{new_name}' already exists in this scope"
            )));
        }
    }

    let now = now();
    conn.execute(
        "UPDATE tasks SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
        rusqlite::params![new_name, new_description, now, id],
    )?;
    touch_parent(conn, existing.project_id, existing.subproject_id, &now)?;

    Ok(Task {
        name: new_name,
        description: new_description,
        updated_at: now,
        ..existing
    })
}

/// Update `order_index`, rejecting collisions with another sibling in the
/// same `(project, subproject)` scope.
pub fn update_order_index(conn: &Connection, id: i64, order_index: i64) -> Result<Task, Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Task,
        id,
    })?;
    let order_index = validators::order_index(order_index)?;

    let conflict: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks
         WHERE project_id = ?1 AND subproject_id IS ?2 AND order_index = ?3 AND id != ?4)",
        rusqlite::params![existing.project_id, existing.subproject_id, order_index, id],
        |row| row.get(0),
    )?;
    if conflict {
        return Err(Error::ConstraintViolation(format!(
            "order_index {order_index} is already used by a sibling task"
        )));
    }

    let now = now();
    conn.execute(
        "UPDATE tasks SET order_index = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![order_index, now, id],
    )?;
    touch_parent(conn, existing.project_id, existing.subproject_id, &now)?;

    Ok(Task {
        order_index,
        updated_at: now,
        ..existing
    })
}

/// Write a new status directly, bypassing transition validation. Used by
/// `crate::status` once it has decided a transition is legal.
pub(crate) fn set_status(conn: &Connection, id: i64, status: Status) -> Result<(), Error> {
    let now = now();
    let touched = conn.execute(
        "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![status.as_str(), now, id],
    )?;
    if touched == 0 {
        return Err(Error::EntityNotFound {
            kind: EntityKind::Task,
            id,
        });
    }
    Ok(())
}

pub(crate) fn subtask_count(conn: &Connection, task_id: i64) -> Result<i64, Error> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM subtasks WHERE task_id = ?1",
        [task_id],
        |row| row.get(0),
    )?)
}

/// Restrict-mode delete: fails if any SubTask exists.
pub fn delete(conn: &Connection, id: i64) -> Result<(), Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Task,
        id,
    })?;
    let children = subtask_count(conn, id)?;
    if children > 0 {
        return Err(Error::Deletion {
            reason: DeletionReason::ChildExists,
            details: DeletionDetails {
                entity_id: Some(id),
                child_count: children,
            },
        });
    }
    conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
    touch_parent(conn, existing.project_id, existing.subproject_id, &now())?;
    Ok(())
}

/// Delete a Task after bridging its dependency edges (see
/// `crate::dependency::bridge`), so the graph's reachability survives its
/// removal. Fails if the Task still has SubTasks. Returns the edges
/// `bridge` actually inserted.
pub fn delete_with_bridge(conn: &Connection, id: i64) -> Result<Vec<(i64, i64)>, Error> {
    let task = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Task,
        id,
    })?;
    let children = subtask_count(conn, id)?;
    if children > 0 {
        return Err(Error::Deletion {
            reason: DeletionReason::ChildExists,
            details: DeletionDetails {
                entity_id: Some(id),
                child_count: children,
            },
        });
    }

    let bridged = crate::dependency::bridge(conn, crate::dependency::GraphKind::Task, id)?;
    conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
    touch_parent(conn, task.project_id, task.subproject_id, &now())?;
    Ok(bridged)
}

/// Cascade delete a Task: its SubTasks and every dependency row touching
/// the Task or its SubTasks.
pub fn cascade_delete(conn: &Connection, task_id: i64, dry_run: bool) -> Result<CascadeImpact, Error> {
    let existing = get_by_id(conn, task_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Task,
        id: task_id,
    })?;

    let subtask_ids = subtask_ids_for_tasks(conn, &[task_id])?;
    let task_dep_count = dependency_count_touching(conn, &[task_id])?;
    let subtask_dep_count = super::subtask::dependency_count_touching(conn, &subtask_ids)?;

    let impact = CascadeImpact {
        projects: 0,
        subprojects: 0,
        tasks: 1,
        subtasks: subtask_ids.len() as i64,
        task_dependencies: task_dep_count,
        subtask_dependencies: subtask_dep_count,
        ..CascadeImpact::default()
    };

    if dry_run {
        log::debug!("cascade_delete(task {task_id}, dry_run): {impact:?}");
        return Ok(impact);
    }

    super::subtask::delete_many(conn, &subtask_ids)?;
    delete_many(conn, &[task_id])?;
    touch_parent(conn, existing.project_id, existing.subproject_id, &now())?;
    log::debug!("cascade_delete(task {task_id}): removed {impact:?}");
    Ok(impact)
}

/// SubTask ids belonging to any of `task_ids`.
pub(crate) fn subtask_ids_for_tasks(conn: &Connection, task_ids: &[i64]) -> Result<Vec<i64>, Error> {
    if task_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = task_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM subtasks WHERE task_id IN ({placeholders})"
    ))?;
    let rows = stmt.query_map(rusqlite::params_from_iter(task_ids.iter()), |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Count of task_dependencies rows where predecessor or successor is one of
/// `task_ids`.
pub(crate) fn dependency_count_touching(conn: &Connection, task_ids: &[i64]) -> Result<i64, Error> {
    if task_ids.is_empty() {
        return Ok(0);
    }
    let placeholders = task_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT COUNT(*) FROM task_dependencies
         WHERE predecessor_id IN ({placeholders}) OR successor_id IN ({placeholders})"
    );
    let params: Vec<i64> = task_ids.iter().chain(task_ids.iter()).copied().collect();
    Ok(conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| row.get(0))?)
}

/// Bulk-delete Tasks by id, without any of the guard checks `delete`/
/// `delete_with_bridge` perform — used only by cascade deletes that have
/// already accounted for what they're removing.
pub(crate) fn delete_many(conn: &Connection, task_ids: &[i64]) -> Result<(), Error> {
    if task_ids.is_empty() {
        return Ok(());
    }
    let placeholders = task_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    conn.execute(
        &format!("DELETE FROM tasks WHERE id IN ({placeholders})"),
        rusqlite::params_from_iter(task_ids.iter()),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn create_scopes_uniqueness_by_subproject() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = super::super::project::create(tx, "P", None)?;
                let sp = super::super::subproject::create(tx, p.id, None, "SP", None)?;
                create(tx, p.id, None, "T", None)?;
                create(tx, p.id, Some(sp.id), "T", None)?;
                assert!(create(tx, p.id, None, "T", None).is_err());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn update_order_index_rejects_sibling_collision() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = super::super::project::create(tx, "P", None)?;
                let a = create(tx, p.id, None, "A", None)?;
                let b = create(tx, p.id, None, "B", None)?;
                assert!(update_order_index(tx, b.id, a.order_index).is_err());
                let moved = update_order_index(tx, b.id, 9)?;
                assert_eq!(moved.order_index, 9);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn delete_restricts_on_subtasks() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = super::super::project::create(tx, "P", None)?;
                let t = create(tx, p.id, None, "T", None)?;
                super::super::subtask::create(tx, t.id, "ST", None)?;
                assert!(delete(tx, t.id).is_err());
                Ok(())
            })
            .unwrap();
    }
}
