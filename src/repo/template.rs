//! CRUD for the template family of tables. `crate::template` builds the
//! save/apply workflows on top of these primitives.

use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{EntityKind, Error};
use crate::models::{Template, TemplateDependency, TemplateSubTask, TemplateTask};
use crate::store::now;
use crate::validators;

fn template_from_row(row: &Row) -> rusqlite::Result<Template> {
    Ok(Template {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        include_tasks: row.get::<_, i64>("include_tasks")? != 0,
        created_at: row.get("created_at")?,
    })
}

pub fn create_template(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
    include_tasks: bool,
) -> Result<Template, Error> {
    let name = validators::name(name)?;
    let description = validators::description(description)?;

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM templates WHERE name = ?1)",
        [&name],
        |row| row.get(0),
    )?;
    if exists {
        return Err(Error::ConstraintViolation(format!(
            "a template named '{name}' already exists"
        )));
    }

    let now = now();
    conn.execute(
        "INSERT INTO templates (name, description, include_tasks, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![name, description, include_tasks as i64, now],
    )?;
    let id = conn.last_insert_rowid();

    Ok(Template {
        id,
        name,
        description,
        include_tasks,
        created_at: now,
    })
}

pub fn get_template(conn: &Connection, id: i64) -> Result<Option<Template>, Error> {
    Ok(conn
        .query_row("SELECT * FROM templates WHERE id = ?1", [id], template_from_row)
        .optional()?)
}

pub fn get_template_by_name(conn: &Connection, name: &str) -> Result<Option<Template>, Error> {
    Ok(conn
        .query_row(
            "SELECT * FROM templates WHERE name = ?1",
            [name],
            template_from_row,
        )
        .optional()?)
}

pub fn list_templates(conn: &Connection) -> Result<Vec<Template>, Error> {
    let mut stmt = conn.prepare("SELECT * FROM templates ORDER BY name")?;
    let rows = stmt.query_map([], template_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn delete_template(conn: &Connection, id: i64) -> Result<(), Error> {
    let touched = conn.execute("DELETE FROM templates WHERE id = ?1", [id])?;
    if touched == 0 {
        return Err(Error::EntityNotFound {
            kind: EntityKind::Template,
            id,
        });
    }
    Ok(())
}

pub fn add_template_task(
    conn: &Connection,
    template_id: i64,
    task_order: i64,
    name: &str,
    description: Option<&str>,
) -> Result<TemplateTask, Error> {
    conn.execute(
        "INSERT INTO template_tasks (template_id, task_order, name, description) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![template_id, task_order, name, description],
    )?;
    let id = conn.last_insert_rowid();
    Ok(TemplateTask {
        id,
        template_id,
        task_order,
        name: name.to_string(),
        description: description.map(str::to_string),
    })
}

pub fn get_template_tasks(conn: &Connection, template_id: i64) -> Result<Vec<TemplateTask>, Error> {
    let mut stmt = conn.prepare(
        "SELECT * FROM template_tasks WHERE template_id = ?1 ORDER BY task_order",
    )?;
    let rows = stmt.query_map([template_id], |row| {
        Ok(TemplateTask {
            id: row.get("id")?,
            template_id: row.get("template_id")?,
            task_order: row.get("task_order")?,
            name: row.get("name")?,
            description: row.get("description")?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn add_template_subtask(
    conn: &Connection,
    template_task_id: i64,
    subtask_order: i64,
    name: &str,
    description: Option<&str>,
) -> Result<TemplateSubTask, Error> {
    conn.execute(
        "INSERT INTO template_subtasks (template_task_id, subtask_order, name, description)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![template_task_id, subtask_order, name, description],
    )?;
    let id = conn.last_insert_rowid();
    Ok(TemplateSubTask {
        id,
        template_task_id,
        subtask_order,
        name: name.to_string(),
        description: description.map(str::to_string),
    })
}

pub fn get_template_subtasks(
    conn: &Connection,
    template_task_id: i64,
) -> Result<Vec<TemplateSubTask>, Error> {
    let mut stmt = conn.prepare(
        "SELECT * FROM template_subtasks WHERE template_task_id = ?1 ORDER BY subtask_order",
    )?;
    let rows = stmt.query_map([template_task_id], |row| {
        Ok(TemplateSubTask {
            id: row.get("id")?,
            template_task_id: row.get("template_task_id")?,
            subtask_order: row.get("subtask_order")?,
            name: row.get("name")?,
            description: row.get("description")?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn add_template_dependency(
    conn: &Connection,
    template_id: i64,
    predecessor_order: i64,
    successor_order: i64,
) -> Result<TemplateDependency, Error> {
    conn.execute(
        "INSERT INTO template_dependencies (template_id, predecessor_order, successor_order)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![template_id, predecessor_order, successor_order],
    )?;
    let id = conn.last_insert_rowid();
    Ok(TemplateDependency {
        id,
        template_id,
        predecessor_order,
        successor_order,
    })
}

pub fn get_template_dependencies(
    conn: &Connection,
    template_id: i64,
) -> Result<Vec<TemplateDependency>, Error> {
    let mut stmt = conn.prepare(
        "SELECT * FROM template_dependencies WHERE template_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map([template_id], |row| {
        Ok(TemplateDependency {
            id: row.get("id")?,
            template_id: row.get("template_id")?,
            predecessor_order: row.get("predecessor_order")?,
            successor_order: row.get("successor_order")?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
