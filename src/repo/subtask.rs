//! CRUD for SubTask, the leaf entity hanging off a Task.

use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{EntityKind, Error};
use crate::models::{Status, SubTask};
use crate::repo::CascadeImpact;
use crate::store::now;
use crate::validators;

fn from_row(row: &Row) -> rusqlite::Result<SubTask> {
    let status: String = row.get("status")?;
    Ok(SubTask {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
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
    task_id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<SubTask, Error> {
    super::task::get_by_id(conn, task_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Task,
        id: task_id,
    })?;

    let name = validators::name(name)?;
    let description = validators::description(description)?;

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM subtasks WHERE task_id = ?1 AND name = ?2)",
        rusqlite::params![task_id, name],
        |row| row.get(0),
    )?;
    if exists {
        return Err(Error::ConstraintViolation(format!(
            "a subtask named '{name}' already exists on this task"
        )));
    }

    let order_index: i64 = conn.query_row(
        "SELECT COALESCE(MAX(order_index), -1) + 1 FROM subtasks WHERE task_id = ?1",
        [task_id],
        |row| row.get(0),
    )?;

    let now = now();
    conn.execute(
        "INSERT INTO subtasks
            (task_id, name, description, status, order_index, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        rusqlite::params![task_id, name, description, Status::Unset.as_str(), order_index, now],
    )?;
    let id = conn.last_insert_rowid();

    touch_parent_chain(conn, task_id, &now)?;

    Ok(SubTask {
        id,
        task_id,
        name,
        description,
        status: Status::Unset,
        order_index,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Touch the owning Task's `updated_at`, then bubble that touch up through
/// the Task's own parent (SubProject if any, else Project).
pub(crate) fn touch_parent_chain(conn: &Connection, task_id: i64, now: &str) -> Result<(), Error> {
    conn.execute(
        "UPDATE tasks SET updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, task_id],
    )?;
    let task = super::task::get_by_id(conn, task_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Task,
        id: task_id,
    })?;
    super::task::touch_parent(conn, task.project_id, task.subproject_id, now)
}

pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<SubTask>, Error> {
    Ok(conn
        .query_row("SELECT * FROM subtasks WHERE id = ?1", [id], from_row)
        .optional()?)
}

pub fn get_by_task(conn: &Connection, task_id: i64) -> Result<Vec<SubTask>, Error> {
    let mut stmt =
        conn.prepare("SELECT * FROM subtasks WHERE task_id = ?1 ORDER BY order_index")?;
    let rows = stmt.query_map([task_id], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn update(
    conn: &Connection,
    id: i64,
    name: Option<&str>,
    description: Option<Option<&str>>,
) -> Result<SubTask, Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::SubTask,
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
            "SELECT EXISTS(SELECT 1 FROM subtasks WHERE task_id = ?1 AND name = ?2 AND id != ?3)",
            rusqlite::params![existing.task_id, new_name, id],
            |row| row.get(0),
        )?;
        if conflict {
            return Err(Error::ConstraintViolation(format!(
                "a subtask named '{new_name}' already exists on this task"
            )));
        }
    }

    let now = now();
    conn.execute(
        "UPDATE subtasks SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
        rusqlite::params![new_name, new_description, now, id],
    )?;
    touch_parent_chain(conn, existing.task_id, &now)?;

    Ok(SubTask {
        name: new_name,
        description: new_description,
        updated_at: now,
        ..existing
    })
}

/// Update `order_index`, rejecting collisions with another sibling SubTask
/// of the same Task.
pub fn update_order_index(conn: &Connection, id: i64, order_index: i64) -> Result<SubTask, Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::SubTask,
        id,
    })?;
    let order_index = validators::order_index(order_index)?;

    let conflict: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM subtasks WHERE task_id = ?1 AND order_index = ?2 AND id != ?3)",
        rusqlite::params![existing.task_id, order_index, id],
        |row| row.get(0),
    )?;
    if conflict {
        return Err(Error::ConstraintViolation(format!(
            "order_index {order_index} is already used by a sibling subtask"
        )));
    }

    let now = now();
    conn.execute(
        "UPDATE subtasks SET order_index = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![order_index, now, id],
    )?;
    touch_parent_chain(conn, existing.task_id, &now)?;

    Ok(SubTask {
        order_index,
        updated_at: now,
        ..existing
    })
}

pub(crate) fn set_status(conn: &Connection, id: i64, status: Status) -> Result<(), Error> {
    let now = now();
    let touched = conn.execute(
        "UPDATE subtasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![status.as_str(), now, id],
    )?;
    if touched == 0 {
        return Err(Error::EntityNotFound {
            kind: EntityKind::SubTask,
            id,
        });
    }
    Ok(())
}

/// SubTasks have no children; delete is unconditional.
pub fn delete(conn: &Connection, id: i64) -> Result<(), Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::SubTask,
        id,
    })?;
    conn.execute("DELETE FROM subtasks WHERE id = ?1", [id])?;
    touch_parent_chain(conn, existing.task_id, &now())?;
    Ok(())
}

/// Bridge a SubTask's dependency edges before removing it. Since SubTasks
/// have no children, this never fails on a child-existence check — it
/// exists purely so callers get the same bridge-then-delete contract as
/// `crate::repo::task::delete_with_bridge`. Returns the edges `bridge`
/// actually inserted.
pub fn delete_with_bridge(conn: &Connection, id: i64) -> Result<Vec<(i64, i64)>, Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::SubTask,
        id,
    })?;
    let bridged = crate::dependency::bridge(conn, crate::dependency::GraphKind::SubTask, id)?;
    conn.execute("DELETE FROM subtasks WHERE id = ?1", [id])?;
    touch_parent_chain(conn, existing.task_id, &now())?;
    Ok(bridged)
}

pub fn cascade_delete(conn: &Connection, subtask_id: i64, dry_run: bool) -> Result<CascadeImpact, Error> {
    let existing = get_by_id(conn, subtask_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::SubTask,
        id: subtask_id,
    })?;
    let dep_count = dependency_count_touching(conn, &[subtask_id])?;
    let impact = CascadeImpact {
        subtasks: 1,
        subtask_dependencies: dep_count,
        ..CascadeImpact::default()
    };
    if dry_run {
        return Ok(impact);
    }
    delete_many(conn, &[subtask_id])?;
    touch_parent_chain(conn, existing.task_id, &now())?;
    Ok(impact)
}

/// Count of subtask_dependencies rows where predecessor or successor is one
/// of `subtask_ids`.
pub(crate) fn dependency_count_touching(conn: &Connection, subtask_ids: &[i64]) -> Result<i64, Error> {
    if subtask_ids.is_empty() {
        return Ok(0);
    }
    let placeholders = subtask_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT COUNT(*) FROM subtask_dependencies
         WHERE predecessor_id IN ({placeholders}) OR successor_id IN ({placeholders})"
    );
    let params: Vec<i64> = subtask_ids.iter().chain(subtask_ids.iter()).copied().collect();
    Ok(conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| row.get(0))?)
}

pub(crate) fn delete_many(conn: &Connection, subtask_ids: &[i64]) -> Result<(), Error> {
    if subtask_ids.is_empty() {
        return Ok(());
    }
    let placeholders = subtask_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    conn.execute(
        &format!("DELETE FROM subtasks WHERE id IN ({placeholders})"),
        rusqlite::params_from_iter(subtask_ids.iter()),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn update_order_index_rejects_sibling_collision() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = super::super::project::create(tx, "P", None)?;
                let t = super::super::task::create(tx, p.id, None, "T", None)?;
                let a = create(tx, t.id, "A", None)?;
                let b = create(tx, t.id, "B", None)?;
                assert!(update_order_index(tx, b.id, a.order_index).is_err());
                let moved = update_order_index(tx, b.id, 9)?;
                assert_eq!(moved.order_index, 9);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn create_rejects_duplicate_name_on_same_task() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = super::super::project::create(tx, "P", None)?;
                let t = super::super::task::create(tx, p.id, None, "T", None)?;
                create(tx, t.id, "ST", None)?;
                assert!(create(tx, t.id, "ST", None).is_err());
                Ok(())
            })
            .unwrap();
    }
}
