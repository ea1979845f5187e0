//! Template engine: capture a SubProject subtree as a reusable Template,
//! and instantiate a Template into a fresh SubProject elsewhere.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::error::{EntityKind, Error};
use crate::models::{Direction, ExternalDependencyWarning, SaveTemplateResult, TemplatePreview};
use crate::repo;

/// Detect dependency edges that cross `subproject_id`'s boundary: an
/// internal Task depending on (or depended on by) a Task outside the
/// SubProject. Returned as warnings, never as errors — the caller decides
/// whether to proceed with `save` regardless.
fn detect_external_dependencies(
    conn: &Connection,
    subproject_id: i64,
) -> Result<Vec<ExternalDependencyWarning>, Error> {
    let mut stmt = conn.prepare("SELECT id, name FROM tasks WHERE subproject_id = ?1")?;
    let internal: HashMap<i64, String> = stmt
        .query_map([subproject_id], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<_>>()?;

    if internal.is_empty() {
        return Ok(Vec::new());
    }

    let mut warnings = Vec::new();

    for (&task_id, task_name) in &internal {
        let mut pred_stmt = conn.prepare(
            "SELECT t.id, t.name FROM tasks t
             JOIN task_dependencies td ON t.id = td.predecessor_id
             WHERE td.successor_id = ?1",
        )?;
        let preds = pred_stmt
            .query_map([task_id], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (pred_id, pred_name) in preds {
            if !internal.contains_key(&pred_id) {
                // external -> internal: the internal Task is the successor,
                // i.e. it depends on something outside the SubProject.
                warnings.push(ExternalDependencyWarning {
                    from_task_id: pred_id,
                    from_task_name: pred_name,
                    to_task_id: task_id,
                    to_task_name: task_name.clone(),
                    direction: Direction::Incoming,
                });
            }
        }

        let mut succ_stmt = conn.prepare(
            "SELECT t.id, t.name FROM tasks t
             JOIN task_dependencies td ON t.id = td.successor_id
             WHERE td.predecessor_id = ?1",
        )?;
        let succs = succ_stmt
            .query_map([task_id], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (succ_id, succ_name) in succs {
            if !internal.contains_key(&succ_id) {
                // internal -> external: the internal Task is the
                // predecessor of something outside the SubProject.
                warnings.push(ExternalDependencyWarning {
                    from_task_id: task_id,
                    from_task_name: task_name.clone(),
                    to_task_id: succ_id,
                    to_task_name: succ_name,
                    direction: Direction::Outgoing,
                });
            }
        }
    }

    Ok(warnings)
}

/// Task-to-Task dependency edges with both endpoints inside `subproject_id`,
/// translated from Task ids to the zero-based `task_order` ordinals used
/// inside a Template.
fn internal_dependencies(
    conn: &Connection,
    subproject_id: i64,
    task_id_to_order: &HashMap<i64, i64>,
) -> Result<Vec<(i64, i64)>, Error> {
    let mut stmt = conn.prepare(
        "SELECT td.predecessor_id, td.successor_id FROM task_dependencies td
         WHERE td.predecessor_id IN (SELECT id FROM tasks WHERE subproject_id = ?1)
           AND td.successor_id IN (SELECT id FROM tasks WHERE subproject_id = ?1)",
    )?;
    let rows = stmt.query_map([subproject_id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut deps = Vec::new();
    for row in rows {
        let (pred_id, succ_id) = row?;
        deps.push((task_id_to_order[&pred_id], task_id_to_order[&succ_id]));
    }
    Ok(deps)
}

/// Capture `subproject_id` (and, if `include_tasks`, its Tasks, their
/// SubTasks, and their internal dependencies) as a named Template.
pub fn save(
    conn: &Connection,
    subproject_id: i64,
    name: &str,
    description: Option<&str>,
    include_tasks: bool,
) -> Result<SaveTemplateResult, Error> {
    let subproject = repo::subproject::get_by_id(conn, subproject_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::SubProject,
        id: subproject_id,
    })?;

    let external_dependencies = detect_external_dependencies(conn, subproject_id)?;

    let template = repo::template::create_template(conn, name, description, include_tasks)?;

    if include_tasks {
        let tasks = repo::task::get_by_parent(conn, subproject.project_id, Some(subproject_id))?;
        let task_id_to_order: HashMap<i64, i64> = tasks
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.id, idx as i64))
            .collect();

        let mut template_task_ids = Vec::with_capacity(tasks.len());
        for (idx, task) in tasks.iter().enumerate() {
            let tt = repo::template::add_template_task(
                conn,
                template.id,
                idx as i64,
                &task.name,
                task.description.as_deref(),
            )?;
            template_task_ids.push(tt.id);
        }

        for (task, &template_task_id) in tasks.iter().zip(&template_task_ids) {
            let subtasks = repo::subtask::get_by_task(conn, task.id)?;
            for (idx, subtask) in subtasks.iter().enumerate() {
                repo::template::add_template_subtask(
                    conn,
                    template_task_id,
                    idx as i64,
                    &subtask.name,
                    subtask.description.as_deref(),
                )?;
            }
        }

        for (pred_order, succ_order) in internal_dependencies(conn, subproject_id, &task_id_to_order)? {
            repo::template::add_template_dependency(conn, template.id, pred_order, succ_order)?;
        }
    }

    Ok(SaveTemplateResult {
        template,
        external_dependencies,
    })
}

/// Instantiate `template_id` into `project_id` as a new root-level
/// SubProject, returning its id. Every duplicated Task/SubTask starts at
/// `Status::Unset`; internal dependencies are reconnected by ordinal.
pub fn apply(
    conn: &Connection,
    template_id: i64,
    project_id: i64,
    new_subproject_name: Option<&str>,
) -> Result<i64, Error> {
    let template = repo::template::get_template(conn, template_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Template,
        id: template_id,
    })?;
    repo::project::get_by_id(conn, project_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Project,
        id: project_id,
    })?;

    let name = new_subproject_name.unwrap_or(&template.name);
    let new_subproject = repo::subproject::create(
        conn,
        project_id,
        None,
        name,
        template.description.as_deref(),
    )?;

    if template.include_tasks {
        let template_tasks = repo::template::get_template_tasks(conn, template_id)?;
        let mut order_to_task_id: HashMap<i64, i64> = HashMap::new();

        for tt in &template_tasks {
            let new_task = repo::task::create(
                conn,
                project_id,
                Some(new_subproject.id),
                &tt.name,
                tt.description.as_deref(),
            )?;
            order_to_task_id.insert(tt.task_order, new_task.id);

            for ts in repo::template::get_template_subtasks(conn, tt.id)? {
                repo::subtask::create(conn, new_task.id, &ts.name, ts.description.as_deref())?;
            }
        }

        for dep in repo::template::get_template_dependencies(conn, template_id)? {
            let pred_id = order_to_task_id[&dep.predecessor_order];
            let succ_id = order_to_task_id[&dep.successor_order];
            crate::dependency::add(conn, crate::dependency::GraphKind::Task, pred_id, succ_id)?;
        }
    }

    log::debug!("apply(template {template_id} -> project {project_id}): subproject {}", new_subproject.id);
    Ok(new_subproject.id)
}

/// Preview what `apply` would create, without creating it.
pub fn preview(
    conn: &Connection,
    template_id: i64,
    project_id: i64,
    new_subproject_name: Option<&str>,
) -> Result<TemplatePreview, Error> {
    let template = repo::template::get_template(conn, template_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Template,
        id: template_id,
    })?;
    repo::project::get_by_id(conn, project_id)?.ok_or(Error::EntityNotFound {
        kind: EntityKind::Project,
        id: project_id,
    })?;

    let template_tasks = repo::template::get_template_tasks(conn, template_id)?;
    let template_deps = repo::template::get_template_dependencies(conn, template_id)?;

    let mut subtask_counts: HashMap<i64, i64> = HashMap::new();
    let mut subtask_count = 0i64;
    for tt in &template_tasks {
        let count = repo::template::get_template_subtasks(conn, tt.id)?.len() as i64;
        subtask_counts.insert(tt.id, count);
        subtask_count += count;
    }

    let task_names = template_tasks
        .iter()
        .map(|tt| match subtask_counts.get(&tt.id).copied().unwrap_or(0) {
            0 => tt.name.clone(),
            n => format!("{} (SubTasks: {n})", tt.name),
        })
        .collect();

    Ok(TemplatePreview {
        subproject_name: new_subproject_name.unwrap_or(&template.name).to_string(),
        task_count: template_tasks.len() as i64,
        subtask_count,
        dependency_count: template_deps.len() as i64,
        task_names,
    })
}

/// Delete a Template and everything captured in it (cascades through the
/// template_tasks/template_subtasks/template_dependencies tables).
pub fn delete(conn: &Connection, template_id: i64) -> Result<(), Error> {
    repo::template::delete_template(conn, template_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn save_and_apply_round_trips_tasks_and_dependencies() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = repo::project::create(tx, "P", None)?;
                let sp = repo::subproject::create(tx, p.id, None, "Sprint", None)?;
                let a = repo::task::create(tx, p.id, Some(sp.id), "A", None)?;
                let b = repo::task::create(tx, p.id, Some(sp.id), "B", None)?;
                repo::subtask::create(tx, a.id, "A1", None)?;
                crate::dependency::add(tx, crate::dependency::GraphKind::Task, a.id, b.id)?;

                let result = save(tx, sp.id, "Sprint Template", None, true)?;
                assert!(result.external_dependencies.is_empty());

                let applied_id = apply(tx, result.template.id, p.id, Some("Sprint 2"))?;
                let applied_tasks = repo::task::get_by_parent(tx, p.id, Some(applied_id))?;
                assert_eq!(applied_tasks.len(), 2);
                let neighbors = crate::dependency::neighbors(
                    tx,
                    crate::dependency::GraphKind::Task,
                    applied_tasks[1].id,
                )?;
                assert_eq!(neighbors.predecessors, vec![applied_tasks[0].id]);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn save_detects_external_dependency() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = repo::project::create(tx, "P", None)?;
                let sp = repo::subproject::create(tx, p.id, None, "Sprint", None)?;
                let inside = repo::task::create(tx, p.id, Some(sp.id), "Inside", None)?;
                let outside = repo::task::create(tx, p.id, None, "Outside", None)?;
                // internal -> external: Inside is the predecessor of an
                // external Task, so this reads as outgoing.
                crate::dependency::add(tx, crate::dependency::GraphKind::Task, inside.id, outside.id)?;

                let result = save(tx, sp.id, "T", None, false)?;
                assert_eq!(result.external_dependencies.len(), 1);
                assert_eq!(result.external_dependencies[0].direction, Direction::Outgoing);

                // external -> internal is the reverse case: incoming.
                let p2 = repo::project::create(tx, "P2", None)?;
                let sp2 = repo::subproject::create(tx, p2.id, None, "Sprint2", None)?;
                let inside2 = repo::task::create(tx, p2.id, Some(sp2.id), "Inside2", None)?;
                let outside2 = repo::task::create(tx, p2.id, None, "Outside2", None)?;
                crate::dependency::add(tx, crate::dependency::GraphKind::Task, outside2.id, inside2.id)?;
                let result2 = save(tx, sp2.id, "T2", None, false)?;
                assert_eq!(result2.external_dependencies.len(), 1);
                assert_eq!(result2.external_dependencies[0].direction, Direction::Incoming);
                Ok(())
            })
            .unwrap();
    }
}
