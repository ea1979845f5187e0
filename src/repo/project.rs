//! CRUD for the top-level Project entity.

use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{DeletionDetails, DeletionReason, EntityKind, Error};
use crate::models::Project;
use crate::repo::CascadeImpact;
use crate::store::now;
use crate::validators;

fn from_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        order_index: row.get("order_index")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn create(conn: &Connection, name: &str, description: Option<&str>) -> Result<Project, Error> {
    let name = validators::name(name)?;
    let description = validators::description(description)?;

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE name = ?1)",
        [&name],
        |row| row.get(0),
    )?;
    if exists {
        return Err(Error::ConstraintViolation(format!(
            "a project named '{name}' already exists"
        )));
    }

    let order_index: i64 = conn.query_row(
        "SELECT COALESCE(MAX(order_index), -1) + 1 FROM projects",
        [],
        |row| row.get(0),
    )?;

    let now = now();
    conn.execute(
        "INSERT INTO projects (name, description, order_index, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        rusqlite::params![name, description, order_index, now],
    )?;
    let id = conn.last_insert_rowid();

    Ok(Project {
        id,
        name,
        description,
        order_index,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Project>, Error> {
    Ok(conn
        .query_row("SELECT * FROM projects WHERE id = ?1", [id], from_row)
        .optional()?)
}

pub fn get_all(conn: &Connection) -> Result<Vec<Project>, Error> {
    let mut stmt = conn.prepare("SELECT * FROM projects ORDER BY order_index")?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Update name and/or description. Fields not supplied are preserved.
pub fn update(
    conn: &Connection,
    id: i64,
    name: Option<&str>,
    description: Option<Option<&str>>,
) -> Result<Project, Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Project,
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
            "SELECT EXISTS(SELECT 1 FROM projects WHERE name = ?1 AND id != ?2)",
            rusqlite::params![new_name, id],
            |row| row.get(0),
        )?;
        if conflict {
            return Err(Error::ConstraintViolation(format!(
                "a project named '{new_name}' already exists"
            )));
        }
    }

    let now = now();
    conn.execute(
        "UPDATE projects SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
        rusqlite::params![new_name, new_description, now, id],
    )?;

    Ok(Project {
        id,
        name: new_name,
        description: new_description,
        order_index: existing.order_index,
        created_at: existing.created_at,
        updated_at: now,
    })
}

/// Update `order_index`, rejecting collisions with another root-level project.
pub fn update_order_index(conn: &Connection, id: i64, order_index: i64) -> Result<Project, Error> {
    let existing = get_by_id(conn, id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Project,
        id,
    })?;
    let order_index = validators::order_index(order_index)?;

    let conflict: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE order_index = ?1 AND id != ?2)",
        rusqlite::params![order_index, id],
        |row| row.get(0),
    )?;
    if conflict {
        return Err(Error::ConstraintViolation(format!(
            "order_index {order_index} is already used by another project"
        )));
    }

    let now = now();
    conn.execute(
        "UPDATE projects SET order_index = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![order_index, now, id],
    )?;

    Ok(Project {
        order_index,
        updated_at: now,
        ..existing
    })
}

pub(crate) fn child_count(conn: &Connection, project_id: i64) -> Result<i64, Error> {
    let subprojects: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subprojects WHERE project_id = ?1",
        [project_id],
        |row| row.get(0),
    )?;
    let direct_tasks: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE project_id = ?1 AND subproject_id IS NULL",
        [project_id],
        |row| row.get(0),
    )?;
    Ok(subprojects + direct_tasks)
}

/// Restrict-mode delete: fails if any SubProject or direct Task exists.
pub fn delete(conn: &Connection, id: i64) -> Result<(), Error> {
    if get_by_id(conn, id)?.is_none() {
        return Err(Error::EntityNotFound {
            kind: EntityKind::Project,
            id,
        });
    }
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
    conn.execute("DELETE FROM projects WHERE id = ?1", [id])?;
    Ok(())
}

/// Collect (and optionally perform) a full cascade delete of a Project:
/// its SubProjects, their Tasks and direct Tasks, all SubTasks, and every
/// dependency row incident to any of those Tasks/SubTasks.
pub fn cascade_delete(
    conn: &Connection,
    project_id: i64,
    dry_run: bool,
) -> Result<CascadeImpact, Error> {
    if get_by_id(conn, project_id)?.is_none() {
        return Err(Error::EntityNotFound {
            kind: EntityKind::Project,
            id: project_id,
        });
    }

    let mut stmt = conn.prepare("SELECT id FROM tasks WHERE project_id = ?1")?;
    let task_ids: Vec<i64> = stmt
        .query_map([project_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare("SELECT id FROM subprojects WHERE project_id = ?1")?;
    let subproject_ids: Vec<i64> = stmt
        .query_map([project_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let subtask_ids = super::task::subtask_ids_for_tasks(conn, &task_ids)?;
    let task_dep_count = super::task::dependency_count_touching(conn, &task_ids)?;
    let subtask_dep_count = super::subtask::dependency_count_touching(conn, &subtask_ids)?;

    let impact = CascadeImpact {
        projects: 1,
        subprojects: subproject_ids.len() as i64,
        tasks: task_ids.len() as i64,
        subtasks: subtask_ids.len() as i64,
        task_dependencies: task_dep_count,
        subtask_dependencies: subtask_dep_count,
        ..CascadeImpact::default()
    };

    if dry_run {
        log::debug!("cascade_delete(project {project_id}, dry_run): {impact:?}");
        return Ok(impact);
    }

    super::subtask::delete_many(conn, &subtask_ids)?;
    super::task::delete_many(conn, &task_ids)?;
    if !subproject_ids.is_empty() {
        let placeholders = subproject_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        conn.execute(
            &format!("DELETE FROM subprojects WHERE id IN ({placeholders})"),
            rusqlite::params_from_iter(subproject_ids.iter()),
        )?;
    }
    conn.execute("DELETE FROM projects WHERE id = ?1", [project_id])?;
    log::debug!("cascade_delete(project {project_id}): removed {impact:?}");
    Ok(impact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn create_assigns_dense_order_index() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let a = create(tx, "Alpha", None)?;
                let b = create(tx, "Beta", Some("  "))?;
                assert_eq!(a.order_index, 0);
                assert_eq!(b.order_index, 1);
                assert_eq!(b.description, None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn create_rejects_duplicate_name() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                create(tx, "Alpha", None)?;
                assert!(create(tx, "Alpha", None).is_err());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn delete_restricts_on_children() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = create(tx, "Alpha", None)?;
                super::super::subproject::create(tx, p.id, None, "SP", None)?;
                assert!(matches!(
                    delete(tx, p.id),
                    Err(Error::Deletion {
                        reason: DeletionReason::ChildExists,
                        ..
                    })
                ));
                Ok(())
            })
            .unwrap();
    }
}
