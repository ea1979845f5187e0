//! Read-only integrity auditor. Runs independently of every other engine
//! in this crate and never mutates the store.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    Error,
    Warning,
}

/// A single detected problem, tagged with a stable code (`FK001`, `DAG001`,
/// ...) and a free-form detail map for programmatic consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub level: IssueLevel,
    pub code: &'static str,
    pub message: String,
    pub details: HashMap<String, String>,
}

/// Result of `check_all`: errors and warnings kept separate so a caller can
/// treat health as a simple "errors is empty" test without re-filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl Report {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

fn detail(pairs: &[(&str, String)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn check_fk_integrity(conn: &Connection, issues: &mut Vec<Issue>) -> Result<(), Error> {
    let mut stmt = conn.prepare(
        "SELECT sp.id, sp.name, sp.project_id FROM subprojects sp
         LEFT JOIN projects p ON sp.project_id = p.id WHERE p.id IS NULL",
    )?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)))? {
        let (id, name, missing) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "FK001",
            message: format!("SubProject {id} references missing Project {missing}"),
            details: detail(&[
                ("subproject_id", id.to_string()),
                ("subproject_name", name),
                ("missing_project_id", missing.to_string()),
            ]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.project_id FROM tasks t
         LEFT JOIN projects p ON t.project_id = p.id WHERE p.id IS NULL",
    )?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)))? {
        let (id, name, missing) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "FK002",
            message: format!("Task {id} references missing Project {missing}"),
            details: detail(&[
                ("task_id", id.to_string()),
                ("task_name", name),
                ("missing_project_id", missing.to_string()),
            ]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.subproject_id FROM tasks t
         WHERE t.subproject_id IS NOT NULL
           AND NOT EXISTS (SELECT 1 FROM subprojects sp WHERE sp.id = t.subproject_id)",
    )?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)))? {
        let (id, name, missing) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "FK003",
            message: format!("Task {id} references missing SubProject {missing}"),
            details: detail(&[
                ("task_id", id.to_string()),
                ("task_name", name),
                ("missing_subproject_id", missing.to_string()),
            ]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT st.id, st.name, st.task_id FROM subtasks st
         LEFT JOIN tasks t ON st.task_id = t.id WHERE t.id IS NULL",
    )?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)))? {
        let (id, name, missing) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "FK004",
            message: format!("SubTask {id} references missing Task {missing}"),
            details: detail(&[
                ("subtask_id", id.to_string()),
                ("subtask_name", name),
                ("missing_task_id", missing.to_string()),
            ]),
        });
    }

    for (code, join_col) in [("FK005", "predecessor_id"), ("FK006", "successor_id")] {
        let mut stmt = conn.prepare(&format!(
            "SELECT td.predecessor_id, td.successor_id FROM task_dependencies td
             LEFT JOIN tasks t ON td.{join_col} = t.id WHERE t.id IS NULL"
        ))?;
        for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))? {
            let (pred, succ) = row?;
            issues.push(Issue {
                level: IssueLevel::Error,
                code,
                message: format!("task dependency {pred} -> {succ} references a missing Task"),
                details: detail(&[
                    ("predecessor_id", pred.to_string()),
                    ("successor_id", succ.to_string()),
                ]),
            });
        }
    }

    for (code, join_col) in [("FK007", "predecessor_id"), ("FK008", "successor_id")] {
        let mut stmt = conn.prepare(&format!(
            "SELECT std.predecessor_id, std.successor_id FROM subtask_dependencies std
             LEFT JOIN subtasks st ON std.{join_col} = st.id WHERE st.id IS NULL"
        ))?;
        for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))? {
            let (pred, succ) = row?;
            issues.push(Issue {
                level: IssueLevel::Error,
                code,
                message: format!("subtask dependency {pred} -> {succ} references a missing SubTask"),
                details: detail(&[
                    ("predecessor_id", pred.to_string()),
                    ("successor_id", succ.to_string()),
                ]),
            });
        }
    }

    Ok(())
}

/// DFS cycle detection over an adjacency map, mirroring the recursion-stack
/// approach the original auditor uses, generalized by `crate::dependency`'s
/// `GraphKind` split into edge/node table names.
fn detect_cycles(conn: &Connection, node_table: &str, edge_table: &str) -> Result<Vec<Vec<i64>>, Error> {
    let mut stmt = conn.prepare(&format!("SELECT id FROM {node_table}"))?;
    let node_ids: Vec<i64> = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;

    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut stmt = conn.prepare(&format!("SELECT predecessor_id, successor_id FROM {edge_table}"))?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))? {
        let (pred, succ) = row?;
        adjacency.entry(pred).or_default().push(succ);
    }

    let mut cycles = Vec::new();
    for start in node_ids {
        let mut visited = std::collections::HashSet::new();
        let mut rec_stack = std::collections::HashSet::new();
        let mut path = Vec::new();
        if dfs_has_cycle(start, &adjacency, &mut visited, &mut rec_stack, &mut path) {
            cycles.push(path);
        }
    }
    Ok(cycles)
}

fn dfs_has_cycle(
    node: i64,
    adjacency: &HashMap<i64, Vec<i64>>,
    visited: &mut std::collections::HashSet<i64>,
    rec_stack: &mut std::collections::HashSet<i64>,
    path: &mut Vec<i64>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(successors) = adjacency.get(&node) {
        for &next in successors {
            if !visited.contains(&next) {
                if dfs_has_cycle(next, adjacency, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&next) {
                return true;
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

fn check_dag_integrity(conn: &Connection, issues: &mut Vec<Issue>) -> Result<(), Error> {
    for cycle in detect_cycles(conn, "tasks", "task_dependencies")? {
        let rendered = cycle.iter().map(i64::to_string).collect::<Vec<_>>().join(" -> ");
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "DAG001",
            message: format!("task dependency cycle detected: {rendered}"),
            details: detail(&[("cycle", rendered)]),
        });
    }
    for cycle in detect_cycles(conn, "subtasks", "subtask_dependencies")? {
        let rendered = cycle.iter().map(i64::to_string).collect::<Vec<_>>().join(" -> ");
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "DAG002",
            message: format!("subtask dependency cycle detected: {rendered}"),
            details: detail(&[("cycle", rendered)]),
        });
    }
    Ok(())
}

fn check_status_consistency(conn: &Connection, issues: &mut Vec<Issue>) -> Result<(), Error> {
    let mut stmt = conn.prepare(
        "SELECT id, name, status FROM tasks
         WHERE status NOT IN ('UNSET', 'NOT_STARTED', 'IN_PROGRESS', 'DONE')",
    )?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?)))? {
        let (id, name, status) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "STATUS_INVALID001",
            message: format!("Task {id} has an invalid status: '{status}'"),
            details: detail(&[("task_id", id.to_string()), ("task_name", name), ("invalid_status", status)]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT id, name, status FROM subtasks
         WHERE status NOT IN ('UNSET', 'NOT_STARTED', 'IN_PROGRESS', 'DONE')",
    )?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?)))? {
        let (id, name, status) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "STATUS_INVALID002",
            message: format!("SubTask {id} has an invalid status: '{status}'"),
            details: detail(&[("subtask_id", id.to_string()), ("subtask_name", name), ("invalid_status", status)]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, COUNT(st.id) FROM tasks t
         INNER JOIN subtasks st ON st.task_id = t.id
         WHERE t.status = 'DONE' AND st.status != 'DONE'
         GROUP BY t.id, t.name",
    )?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)))? {
        let (id, name, count) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "STATUS001",
            message: format!("Task {id} is DONE but has {count} incomplete child SubTasks"),
            details: detail(&[
                ("task_id", id.to_string()),
                ("task_name", name),
                ("incomplete_subtask_count", count.to_string()),
            ]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT t2.id, t2.name, t1.id, t1.name FROM tasks t2
         INNER JOIN task_dependencies td ON td.successor_id = t2.id
         INNER JOIN tasks t1 ON td.predecessor_id = t1.id
         WHERE t2.status = 'DONE' AND t1.status != 'DONE'",
    )?;
    for row in stmt.query_map([], |r| {
        Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?, r.get::<_, String>(3)?))
    })? {
        let (id, name, pred_id, pred_name) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "STATUS002",
            message: format!("Task {id} is DONE but predecessor Task {pred_id} is not"),
            details: detail(&[
                ("task_id", id.to_string()),
                ("task_name", name),
                ("predecessor_id", pred_id.to_string()),
                ("predecessor_name", pred_name),
            ]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT st2.id, st2.name, st1.id, st1.name FROM subtasks st2
         INNER JOIN subtask_dependencies std ON std.successor_id = st2.id
         INNER JOIN subtasks st1 ON std.predecessor_id = st1.id
         WHERE st2.status = 'DONE' AND st1.status != 'DONE'",
    )?;
    for row in stmt.query_map([], |r| {
        Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?, r.get::<_, String>(3)?))
    })? {
        let (id, name, pred_id, pred_name) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "STATUS003",
            message: format!("SubTask {id} is DONE but predecessor SubTask {pred_id} is not"),
            details: detail(&[
                ("subtask_id", id.to_string()),
                ("subtask_name", name),
                ("predecessor_id", pred_id.to_string()),
                ("predecessor_name", pred_name),
            ]),
        });
    }

    Ok(())
}

fn check_order_index(conn: &Connection, issues: &mut Vec<Issue>) -> Result<(), Error> {
    let mut stmt = conn.prepare("SELECT id, name, order_index FROM subprojects WHERE order_index < 0")?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)))? {
        let (id, name, idx) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "ORDER_NEG001",
            message: format!("SubProject {id} has a negative order_index: {idx}"),
            details: detail(&[("subproject_id", id.to_string()), ("subproject_name", name), ("order_index", idx.to_string())]),
        });
    }

    let mut stmt = conn.prepare("SELECT id, name, order_index FROM tasks WHERE order_index < 0")?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)))? {
        let (id, name, idx) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "ORDER_NEG002",
            message: format!("Task {id} has a negative order_index: {idx}"),
            details: detail(&[("task_id", id.to_string()), ("task_name", name), ("order_index", idx.to_string())]),
        });
    }

    let mut stmt = conn.prepare("SELECT id, name, order_index FROM subtasks WHERE order_index < 0")?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)))? {
        let (id, name, idx) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "ORDER_NEG003",
            message: format!("SubTask {id} has a negative order_index: {idx}"),
            details: detail(&[("subtask_id", id.to_string()), ("subtask_name", name), ("order_index", idx.to_string())]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT project_id, COALESCE(parent_subproject_id, -1), order_index, COUNT(*) FROM subprojects
         GROUP BY project_id, parent_subproject_id, order_index HAVING COUNT(*) > 1",
    )?;
    for row in stmt.query_map([], |r| {
        Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?, r.get::<_, i64>(3)?))
    })? {
        let (project_id, parent_id, idx, count) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "ORDER001",
            message: format!(
                "Project {project_id} (parent_subproject_id={}) has {count} subprojects sharing order_index {idx}",
                if parent_id == -1 { "NULL".to_string() } else { parent_id.to_string() }
            ),
            details: detail(&[
                ("project_id", project_id.to_string()),
                ("parent_subproject_id", if parent_id == -1 { "null".into() } else { parent_id.to_string() }),
                ("order_index", idx.to_string()),
                ("duplicate_count", count.to_string()),
            ]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT project_id, COALESCE(subproject_id, -1), order_index, COUNT(*) FROM tasks
         GROUP BY project_id, subproject_id, order_index HAVING COUNT(*) > 1",
    )?;
    for row in stmt.query_map([], |r| {
        Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?, r.get::<_, i64>(3)?))
    })? {
        let (project_id, subproject_id, idx, count) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "ORDER002",
            message: format!(
                "{} has {count} tasks sharing order_index {idx}",
                if subproject_id == -1 {
                    format!("Project {project_id} (direct)")
                } else {
                    format!("SubProject {subproject_id}")
                }
            ),
            details: detail(&[
                ("project_id", project_id.to_string()),
                ("subproject_id", if subproject_id == -1 { "null".into() } else { subproject_id.to_string() }),
                ("order_index", idx.to_string()),
                ("duplicate_count", count.to_string()),
            ]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT task_id, order_index, COUNT(*) FROM subtasks
         GROUP BY task_id, order_index HAVING COUNT(*) > 1",
    )?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?)))? {
        let (task_id, idx, count) = row?;
        issues.push(Issue {
            level: IssueLevel::Error,
            code: "ORDER003",
            message: format!("Task {task_id} has {count} subtasks sharing order_index {idx}"),
            details: detail(&[
                ("task_id", task_id.to_string()),
                ("order_index", idx.to_string()),
                ("duplicate_count", count.to_string()),
            ]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT project_id, COALESCE(parent_subproject_id, -1), COUNT(*), MAX(order_index) FROM subprojects
         GROUP BY project_id, parent_subproject_id HAVING MAX(order_index) > (COUNT(*) - 1)",
    )?;
    for row in stmt.query_map([], |r| {
        Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?, r.get::<_, i64>(3)?))
    })? {
        let (project_id, parent_id, total, max_index) = row?;
        issues.push(Issue {
            level: IssueLevel::Warning,
            code: "ORDER_W001",
            message: format!(
                "Project {project_id} (parent_subproject_id={}) has order_index gaps (count={total}, max={max_index})",
                if parent_id == -1 { "NULL".to_string() } else { parent_id.to_string() }
            ),
            details: detail(&[
                ("project_id", project_id.to_string()),
                ("parent_subproject_id", if parent_id == -1 { "null".into() } else { parent_id.to_string() }),
                ("total_count", total.to_string()),
                ("max_index", max_index.to_string()),
            ]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT project_id, COALESCE(subproject_id, -1), COUNT(*), MAX(order_index) FROM tasks
         GROUP BY project_id, subproject_id HAVING MAX(order_index) > (COUNT(*) - 1)",
    )?;
    for row in stmt.query_map([], |r| {
        Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?, r.get::<_, i64>(3)?))
    })? {
        let (project_id, subproject_id, total, max_index) = row?;
        issues.push(Issue {
            level: IssueLevel::Warning,
            code: "ORDER_W002",
            message: format!(
                "{} has order_index gaps (count={total}, max={max_index})",
                if subproject_id == -1 {
                    format!("Project {project_id} (direct)")
                } else {
                    format!("SubProject {subproject_id}")
                }
            ),
            details: detail(&[
                ("project_id", project_id.to_string()),
                ("subproject_id", if subproject_id == -1 { "null".into() } else { subproject_id.to_string() }),
                ("total_count", total.to_string()),
                ("max_index", max_index.to_string()),
            ]),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT task_id, COUNT(*), MAX(order_index) FROM subtasks
         GROUP BY task_id HAVING MAX(order_index) > (COUNT(*) - 1)",
    )?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?)))? {
        let (task_id, total, max_index) = row?;
        issues.push(Issue {
            level: IssueLevel::Warning,
            code: "ORDER_W003",
            message: format!("Task {task_id} has order_index gaps (count={total}, max={max_index})"),
            details: detail(&[
                ("task_id", task_id.to_string()),
                ("total_count", total.to_string()),
                ("max_index", max_index.to_string()),
            ]),
        });
    }

    Ok(())
}

fn check_subproject_nesting(conn: &Connection, issues: &mut Vec<Issue>) -> Result<(), Error> {
    let mut stmt = conn.prepare(
        "SELECT id, name, parent_subproject_id FROM subprojects WHERE parent_subproject_id IS NOT NULL",
    )?;
    for row in stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)))? {
        let (id, name, parent_id) = row?;
        issues.push(Issue {
            level: IssueLevel::Warning,
            code: "NEST001",
            message: format!("SubProject {id} is nested (parent_subproject_id={parent_id})"),
            details: detail(&[
                ("subproject_id", id.to_string()),
                ("subproject_name", name),
                ("parent_subproject_id", parent_id.to_string()),
            ]),
        });
    }
    Ok(())
}

/// Run every check and split the findings into errors vs. warnings.
pub fn check_all(conn: &Connection) -> Result<Report, Error> {
    let mut issues = Vec::new();
    check_fk_integrity(conn, &mut issues)?;
    check_dag_integrity(conn, &mut issues)?;
    check_status_consistency(conn, &mut issues)?;
    check_order_index(conn, &mut issues)?;
    check_subproject_nesting(conn, &mut issues)?;

    let (errors, warnings) = issues.into_iter().partition(|i| i.level == IssueLevel::Error);
    let report = Report { errors, warnings };
    if !report.is_healthy() {
        log::warn!(
            "doctor::check_all found {} error(s), {} warning(s)",
            report.error_count(),
            report.warning_count()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use crate::store::Store;

    #[test]
    fn healthy_store_has_no_errors() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = crate::repo::project::create(tx, "P", None)?;
                crate::repo::task::create(tx, p.id, None, "T", None)?;
                Ok(())
            })
            .unwrap();
        let report = store.doctor().unwrap();
        assert!(report.is_healthy());
    }

    #[test]
    fn detects_cycle_and_nesting() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = crate::repo::project::create(tx, "P", None)?;
                let sp = crate::repo::subproject::create(tx, p.id, None, "SP", None)?;
                crate::repo::subproject::create(tx, p.id, Some(sp.id), "Nested", None)?;
                let a = crate::repo::task::create(tx, p.id, None, "A", None)?;
                let b = crate::repo::task::create(tx, p.id, None, "B", None)?;
                tx.execute(
                    "INSERT INTO task_dependencies (predecessor_id, successor_id, created_at) VALUES (?1, ?2, 'now')",
                    rusqlite::params![a.id, b.id],
                )?;
                tx.execute(
                    "INSERT INTO task_dependencies (predecessor_id, successor_id, created_at) VALUES (?1, ?2, 'now')",
                    rusqlite::params![b.id, a.id],
                )?;
                Ok(())
            })
            .unwrap();
        let report = store.doctor().unwrap();
        assert!(report.errors.iter().any(|i| i.code == "DAG001"));
        assert!(report.warnings.iter().any(|i| i.code == "NEST001"));
    }
}
