//! Dependency-graph engine shared by the Task-level and SubTask-level DAGs.
//!
//! The original port kept two near-identical copies of this logic, one per
//! entity level. `GraphKind` parameterizes the edge table and node table so
//! there is exactly one implementation of cycle detection, bridging, and
//! path search (see SPEC_FULL.md §9).

use std::collections::{HashMap, HashSet, VecDeque};

use rusqlite::Connection;

use crate::error::{EntityKind, Error};
use crate::models::Dependency;

/// Which dependency DAG a call operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Task,
    SubTask,
}

impl GraphKind {
    fn edge_table(self) -> &'static str {
        match self {
            GraphKind::Task => "task_dependencies",
            GraphKind::SubTask => "subtask_dependencies",
        }
    }

    fn node_table(self) -> &'static str {
        match self {
            GraphKind::Task => "tasks",
            GraphKind::SubTask => "subtasks",
        }
    }

    fn entity_kind(self) -> EntityKind {
        match self {
            GraphKind::Task => EntityKind::Task,
            GraphKind::SubTask => EntityKind::SubTask,
        }
    }
}

/// Predecessors and successors of a single node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Neighbors {
    pub predecessors: Vec<i64>,
    pub successors: Vec<i64>,
}

fn node_exists(conn: &Connection, kind: GraphKind, id: i64) -> Result<bool, Error> {
    Ok(conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", kind.node_table()),
        [id],
        |row| row.get(0),
    )?)
}

fn require_node(conn: &Connection, kind: GraphKind, id: i64) -> Result<(), Error> {
    if !node_exists(conn, kind, id)? {
        return Err(Error::EntityNotFound {
            kind: kind.entity_kind(),
            id,
        });
    }
    Ok(())
}

/// The scope a node's edges are confined to: a Task's Project, or a
/// SubTask's parent Task. Two nodes may only share an edge when this
/// matches (the "co-scope rule").
fn scope_of(conn: &Connection, kind: GraphKind, id: i64) -> Result<i64, Error> {
    let column = match kind {
        GraphKind::Task => "project_id",
        GraphKind::SubTask => "task_id",
    };
    Ok(conn.query_row(
        &format!("SELECT {column} FROM {} WHERE id = ?1", kind.node_table()),
        [id],
        |row| row.get(0),
    )?)
}

/// Build the full adjacency map `predecessor -> [successor, ...]` for a graph.
fn build_graph(conn: &Connection, kind: GraphKind) -> Result<HashMap<i64, Vec<i64>>, Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT predecessor_id, successor_id FROM {}",
        kind.edge_table()
    ))?;
    let mut graph: HashMap<i64, Vec<i64>> = HashMap::new();
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (pred, succ) = row?;
        graph.entry(pred).or_default().push(succ);
    }
    Ok(graph)
}

/// Breadth-first search: is `end` reachable from `start` in `graph`?
fn has_path(graph: &HashMap<i64, Vec<i64>>, start: i64, end: i64) -> bool {
    if start == end {
        return true;
    }
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start]);
    seen.insert(start);
    while let Some(node) = queue.pop_front() {
        for &next in graph.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
            if next == end {
                return true;
            }
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    false
}

/// Would inserting the edge `predecessor -> successor` create a cycle?
/// Equivalent to asking whether `successor` can already reach `predecessor`.
pub fn would_create_cycle(
    conn: &Connection,
    kind: GraphKind,
    predecessor_id: i64,
    successor_id: i64,
) -> Result<bool, Error> {
    let graph = build_graph(conn, kind)?;
    Ok(has_path(&graph, successor_id, predecessor_id))
}

fn edge_exists(conn: &Connection, kind: GraphKind, predecessor_id: i64, successor_id: i64) -> Result<bool, Error> {
    Ok(conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE predecessor_id = ?1 AND successor_id = ?2)",
            kind.edge_table()
        ),
        rusqlite::params![predecessor_id, successor_id],
        |row| row.get(0),
    )?)
}

/// Add a dependency edge: existence, self-edge, co-scope, duplicate, and
/// cycle checks run in that order, matching the original manager.
pub fn add(
    conn: &Connection,
    kind: GraphKind,
    predecessor_id: i64,
    successor_id: i64,
) -> Result<Dependency, Error> {
    require_node(conn, kind, predecessor_id)?;
    require_node(conn, kind, successor_id)?;

    if predecessor_id == successor_id {
        return Err(Error::ConstraintViolation(
            "a node cannot depend on itself".into(),
        ));
    }

    if scope_of(conn, kind, predecessor_id)? != scope_of(conn, kind, successor_id)? {
        return Err(Error::ConstraintViolation(format!(
            "{predecessor_id} and {successor_id} do not share the required co-scope"
        )));
    }

    if edge_exists(conn, kind, predecessor_id, successor_id)? {
        return Err(Error::ConstraintViolation(format!(
            "dependency {predecessor_id} -> {successor_id} already exists"
        )));
    }

    if would_create_cycle(conn, kind, predecessor_id, successor_id)? {
        return Err(Error::CyclicDependency {
            predecessor: predecessor_id,
            successor: successor_id,
        });
    }

    conn.execute(
        &format!(
            "INSERT INTO {} (predecessor_id, successor_id, created_at) VALUES (?1, ?2, ?3)",
            kind.edge_table()
        ),
        rusqlite::params![predecessor_id, successor_id, crate::store::now()],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Dependency {
        id,
        predecessor_id,
        successor_id,
    })
}

pub fn remove(
    conn: &Connection,
    kind: GraphKind,
    predecessor_id: i64,
    successor_id: i64,
) -> Result<(), Error> {
    let touched = conn.execute(
        &format!(
            "DELETE FROM {} WHERE predecessor_id = ?1 AND successor_id = ?2",
            kind.edge_table()
        ),
        rusqlite::params![predecessor_id, successor_id],
    )?;
    if touched == 0 {
        return Err(Error::ConstraintViolation(format!(
            "no dependency {predecessor_id} -> {successor_id} exists"
        )));
    }
    Ok(())
}

pub fn neighbors(conn: &Connection, kind: GraphKind, node_id: i64) -> Result<Neighbors, Error> {
    require_node(conn, kind, node_id)?;
    let mut pred_stmt = conn.prepare(&format!(
        "SELECT predecessor_id FROM {} WHERE successor_id = ?1 ORDER BY predecessor_id",
        kind.edge_table()
    ))?;
    let predecessors = pred_stmt
        .query_map([node_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    let mut succ_stmt = conn.prepare(&format!(
        "SELECT successor_id FROM {} WHERE predecessor_id = ?1 ORDER BY successor_id",
        kind.edge_table()
    ))?;
    let successors = succ_stmt
        .query_map([node_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    Ok(Neighbors {
        predecessors,
        successors,
    })
}

/// Shortest path from `start` to `end`, inclusive of both endpoints, or
/// `None` if unreachable.
pub fn path(conn: &Connection, kind: GraphKind, start: i64, end: i64) -> Result<Option<Vec<i64>>, Error> {
    require_node(conn, kind, start)?;
    require_node(conn, kind, end)?;
    let graph = build_graph(conn, kind)?;

    if start == end {
        return Ok(Some(vec![start]));
    }

    let mut came_from: HashMap<i64, i64> = HashMap::new();
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        for &next in graph.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
            if seen.insert(next) {
                came_from.insert(next, node);
                if next == end {
                    let mut path = vec![end];
                    let mut cursor = end;
                    while let Some(&prev) = came_from.get(&cursor) {
                        path.push(prev);
                        cursor = prev;
                    }
                    path.reverse();
                    return Ok(Some(path));
                }
                queue.push_back(next);
            }
        }
    }
    Ok(None)
}

/// Every node transitively reachable as a successor of `node_id` (its full
/// forward closure), via BFS.
pub fn successors_reachable(conn: &Connection, kind: GraphKind, node_id: i64) -> Result<Vec<i64>, Error> {
    require_node(conn, kind, node_id)?;
    let graph = build_graph(conn, kind)?;
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([node_id]);
    let mut result = Vec::new();
    while let Some(node) = queue.pop_front() {
        for &next in graph.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
            if seen.insert(next) {
                result.push(next);
                queue.push_back(next);
            }
        }
    }
    Ok(result)
}

/// Candidate predecessor/successor pairs `bridge` would connect around
/// `node_id`, skipping pairs that already have an edge or would create a
/// cycle. Pure read: used both by `bridge` itself and by dry-run previews.
fn bridge_candidates(conn: &Connection, kind: GraphKind, node_id: i64) -> Result<Vec<(i64, i64)>, Error> {
    let Neighbors {
        predecessors,
        successors,
    } = neighbors(conn, kind, node_id)?;

    let mut edges = Vec::new();
    for &pred in &predecessors {
        for &succ in &successors {
            if pred == succ {
                continue;
            }
            if edge_exists(conn, kind, pred, succ)? {
                continue;
            }
            if would_create_cycle(conn, kind, pred, succ)? {
                log::debug!(
                    "bridge({:?}, {node_id}): skipping {pred} -> {succ}, would cycle",
                    kind
                );
                continue;
            }
            edges.push((pred, succ));
        }
    }
    Ok(edges)
}

/// Before deleting `node_id`, connect every one of its predecessors directly
/// to every one of its successors, skipping pairs that already have an edge
/// or would create a cycle. Keeps the graph's reachability intact across the
/// node's removal. Returns the edges actually inserted.
pub fn bridge(conn: &Connection, kind: GraphKind, node_id: i64) -> Result<Vec<(i64, i64)>, Error> {
    let edges = bridge_candidates(conn, kind, node_id)?;
    for &(pred, succ) in &edges {
        conn.execute(
            &format!(
                "INSERT INTO {} (predecessor_id, successor_id, created_at) VALUES (?1, ?2, ?3)",
                kind.edge_table()
            ),
            rusqlite::params![pred, succ, crate::store::now()],
        )?;
    }
    Ok(edges)
}

/// Preview the edges `bridge` would insert for `node_id`, without writing
/// anything. Used by `deletion::delete`'s dry-run path.
pub fn preview_bridge(conn: &Connection, kind: GraphKind, node_id: i64) -> Result<Vec<(i64, i64)>, Error> {
    bridge_candidates(conn, kind, node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn make_task(conn: &Connection, project_id: i64, name: &str) -> i64 {
        crate::repo::task::create(conn, project_id, None, name, None)
            .unwrap()
            .id
    }

    #[test]
    fn add_rejects_self_edge_and_cycle() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = crate::repo::project::create(tx, "P", None)?;
                let a = make_task(tx, p.id, "A");
                let b = make_task(tx, p.id, "B");
                assert!(add(tx, GraphKind::Task, a, a).is_err());
                add(tx, GraphKind::Task, a, b)?;
                assert!(matches!(
                    add(tx, GraphKind::Task, b, a),
                    Err(Error::CyclicDependency { .. })
                ));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn add_rejects_cross_project_edge() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p1 = crate::repo::project::create(tx, "P1", None)?;
                let p2 = crate::repo::project::create(tx, "P2", None)?;
                let a = make_task(tx, p1.id, "A");
                let b = make_task(tx, p2.id, "B");
                assert!(matches!(
                    add(tx, GraphKind::Task, a, b),
                    Err(Error::ConstraintViolation(_))
                ));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn bridge_reconnects_around_removed_node() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = crate::repo::project::create(tx, "P", None)?;
                let a = make_task(tx, p.id, "A");
                let b = make_task(tx, p.id, "B");
                let c = make_task(tx, p.id, "C");
                add(tx, GraphKind::Task, a, b)?;
                add(tx, GraphKind::Task, b, c)?;
                bridge(tx, GraphKind::Task, b)?;
                assert!(edge_exists(tx, GraphKind::Task, a, c)?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn path_finds_shortest_route() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|tx| {
                let p = crate::repo::project::create(tx, "P", None)?;
                let a = make_task(tx, p.id, "A");
                let b = make_task(tx, p.id, "B");
                let c = make_task(tx, p.id, "C");
                add(tx, GraphKind::Task, a, b)?;
                add(tx, GraphKind::Task, b, c)?;
                assert_eq!(path(tx, GraphKind::Task, a, c)?, Some(vec![a, b, c]));
                assert_eq!(path(tx, GraphKind::Task, c, a)?, None);
                Ok(())
            })
            .unwrap();
    }
}
