//! CRUD for SubProject, which nests either directly under a Project or
//! under another SubProject via `parent_subproject_id`.

use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{DeletionDetails, DeletionReason, EntityKind, Error};
use crate::models::SubProject;
use crate::repo::CascadeImpact;
use crate::store::now;
use crate::validators;

fn from_row(row: &Row) -> rusqlite::Result<SubProject> {
    Ok(SubProject {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        parent_subproject_id: row.get("parent_subproject_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        order_index: row.get("order_index")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn create(
    conn: &Connection,
    project_id: i64,
    parent_subproject_id: Option<i64>,
    name: &str,
    description: Option<&str>,
) -> Result<SubProject, Error> {
    super::project::get_by_id(conn, project_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Project,
        id: project_id,
    })?;
    if let Some(parent_id) = parent_subproject_id {
        get_by_id(conn, parent_id)?.ok_or(Error::EntityNotFound {
            kind: EntityKind::SubProject,
            id: parent_id,
        })?;
    }

    let name = validators::name(name)?;
    let description = validators::description(description)?;

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM subprojects
         WHERE project_id = ?1 AND name = ?2
           AND parent_subproject_id IS ?3)",
        rusqlite::params![project_id, name, parent_subproject_id],
        |row| row.get(0),
    )?;
    if exists {
        return Err(Error::ConstraintViolation(format!(
            "a subproject named '{name}' already exists in this scope"
        )));
    }

    let order_index: i64 = conn.query_row(
        "SELECT COALESCE(MAX(order_index), -1) + 1 FROM subprojects
         WHERE project_id = ?1 AND parent_subproject_id IS ?2",
        rusqlite::params![project_id, parent_subproject_id],
        |row| row.get(0),
    )?;

    let now = now();
    conn.execute(
        "INSERT INTO subprojects
            (project_id, parent_subproject_id, name, description, order_index, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        rusqlite::params![project_id, parent_subproject_id, name, description, order_index, now],
    )?;
    let id = conn.last_insert_rowid();

    touch_parent(conn, project_id, &now)?;

    Ok(SubProject {
        id,
        project_id,
        parent_subproject_id,
        name,
        description,
        order_index,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Touch the owning Project's `updated_at`.
fn touch_parent(conn: &Connection, project_id: i64, now: &str) -> Result<(), Error> {
    conn.execute(
        "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, project_id],
    )?;
    Ok(())
}

pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<SubProject>, Error> {
    Ok(conn
        .query_row("SELECT * FROM subprojects WHERE id = ?1", [id], from_row)
        .optional()?)
}

/// All SubProjects directly under `project_id`, optionally further scoped by
/// `parent_subproject_id` (`None` selects root-level SubProjects of the
/// project, not every descendant).
pub fn get_by_parent(
    conn: &Connection,
    project_id: i64,
    parent_subproject_id: Option<i64>,
) -> Result<Vec<SubProject>, Error> {
    let mut stmt = conn.prepare(
        "SELECT * FROM subprojects
         WHERE project_id = ?1 AND parent_subproject_id IS ?2
         ORDER BY order_index",
    )?;
    let rows = stmt.query_map(rusqlite::params![project_id, parent_subproject_id], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn update(
    conn: &Connection,
    id: i64,
    name: Option<&str>,
    description: Option<Option<&str>>,
) -> Result<SubProject, Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::SubProject,
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
            "SELECT EXISTS(SELECT 1 FROM subprojects
             WHERE project_id = ?1 AND name = ?2 AND parent_subproject_id IS ?3 AND id != ?4)",
            rusqlite::params![existing.project_id, new_name, existing.parent_subproject_id, id],
            |row| row.get(0),
        )?;
        if conflict {
            return Err(Error::ConstraintViolation(format!(
                "a subproject named '{new_name}' already exists in this scope"
            )));
        }
    }

    let now = now();
    conn.execute(
        "UPDATE subprojects SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
        rusqlite::params![new_name, new_description, now, id],
    )?;
    touch_parent(conn, existing.project_id, &now)?;

    Ok(SubProject {
        name: new_name,
        description: new_description,
        updated_at: now,
        ..existing
    })
}

/// Update `order_index`, rejecting collisions with another sibling in the
/// same `(project, parent_subproject)` scope.
pub fn update_order_index(conn: &Connection, id: i64, order_index: i64) -> Result<SubProject, Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::SubProject,
        id,
    })?;
    let order_index = validators::order_index(order_index)?;

    let conflict: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM subprojects
         WHERE project_id = ?1 AND parent_subproject_id IS ?2 AND order_index = ?3 AND id != ?4)",
        rusqlite::params![existing.project_id, existing.parent_subproject_id, order_index, id],
        |row| row.get(0),
    )?;
    if conflict {
        return Err(Error::ConstraintViolation(format!(
            "order_index {order_index} is already used by a sibling subproject"
        )));
    }

    let now = now();
    conn.execute(
        "UPDATE subprojects SET order_index = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![order_index, now, id],
    )?;
    touch_parent(conn, existing.project_id, &now)?;

    Ok(SubProject {
        order_index,
        updated_at: now,
        ..existing
    })
}

pub(crate) fn child_count(conn: &Connection, subproject_id: i64) -> Result<i64, Error> {
    let nested: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subprojects WHERE parent_subproject_id = ?1",
        [subproject_id],
        |row| row.get(0),
    )?;
    let tasks: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE subproject_id = ?1",
        [subproject_id],
        |row| row.get(0),
    )?;
    Ok(nested + tasks)
}

/// Restrict-mode delete: fails if any nested SubProject or Task exists.
pub fn delete(conn: &Connection, id: i64) -> Result<(), Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::SubProject,
        id,
    })?;
    let children = child_count(conn, id)?;
    if children > 0 {
        return Err(Error::Deletion {
            reason: DeletionReason::ChildExists,
            details: DeletionDetails {
                entity_id: Some(id),
                child_count: children,
            },
        });
    }
    conn.execute("DELETE FROM subprojects WHERE id = ?1", [id])?;
    touch_parent(conn, existing.project_id, &now())?;
    Ok(())
}

/// Cascade delete a SubProject: its Tasks, their SubTasks, and every
/// dependency row touching those Tasks/SubTasks. Nested SubProjects are
/// rejected rather than recursed into (see SPEC_FULL.md §9).
pub fn cascade_delete(
    conn: &Connection,
    subproject_id: i64,
    dry_run: bool,
) -> Result<CascadeImpact, Error> {
    let existing = get_by_id(conn, subproject_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::SubProject,
        id: subproject_id,
    })?;

    let nested: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subprojects WHERE parent_subproject_id = ?1",
        [subproject_id],
        |row| row.get(0),
    )?;
    if nested > 0 {
        return Err(Error::Deletion {
            reason: DeletionReason::ChildExists,
            details: DeletionDetails {
                entity_id: Some(subproject_id),
                child_count: nested,
            },
        });
    }

    let mut stmt = conn.prepare("SELECT id FROM tasks WHERE subproject_id = ?1")?;
    let task_ids: Vec<i64> = stmt
        .query_map([subproject_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let subtask_ids = super::task::subtask_ids_for_tasks(conn, &task_ids)?;
    let task_dep_count = super::task::dependency_count_touching(conn, &task_ids)?;
    let subtask_dep_count = super::subtask::dependency_count_touching(conn, &subtask_ids)?;

    let impact = CascadeImpact {
        projects: 0,
        subprojects: 1,
        tasks: task_ids.len() as i64,
        subtasks: subtask_ids.len() as i64,
        task_dependencies: task_dep_count,
        subtask_dependencies: subtask_dep_count,
        ..CascadeImpact::default()
    };

    if dry_run {
        log::debug!("cascade_delete(subproject {subproject_id}, dry_run): {impact:?}");
        return Ok(impact);
    }

    super::subtask::delete_many(conn, &subtask_ids)?;
    super::task::delete_many(conn, &task_ids)?;
    conn.execute("DELETE FROM subprojects WHERE id = ?1", [subproject_id])?;
    touch_parent(conn, existing.project_id, &now())?;
    log::debug!("cascade_delete(subproject {subproject_id}): removed {impact:?}");
    Ok(impact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn name_uniqueness_is_scoped_by_parent() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = super::super::project::create(tx, "P", None)?;
                let root = create(tx, p.id, None, "SP", None)?;
                // same name, different (nested) scope: allowed
                create(tx, p.id, Some(root.id), "SP", None)?;
                // same name, same (root) scope: rejected
                assert!(create(tx, p.id, None, "SP", None).is_err());
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
                let moved = update_order_index(tx, b.id, 5)?;
                assert_eq!(moved.order_index, 5);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn cascade_delete_rejects_when_nested_subprojects_exist() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = super::super::project::create(tx, "P", None)?;
                let root = create(tx, p.id, None, "SP", None)?;
                create(tx, p.id, Some(root.id), "Nested", None)?;
                assert!(cascade_delete(tx, root.id, true).is_err());
                Ok(())
            })
            .unwrap();
    }
}
