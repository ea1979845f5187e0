//! Schema DDL applied by `Store::initialize`.

pub const CURRENT_VERSION: u32 = 1;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE projects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    order_index INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE subprojects (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE RESTRICT,
    parent_subproject_id INTEGER REFERENCES subprojects(id) ON DELETE RESTRICT,
    name TEXT NOT NULL,
    description TEXT,
    order_index INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX idx_subprojects_name_root
    ON subprojects(project_id, name) WHERE parent_subproject_id IS NULL;
CREATE UNIQUE INDEX idx_subprojects_name_nested
    ON subprojects(project_id, parent_subproject_id, name) WHERE parent_subproject_id IS NOT NULL;
CREATE INDEX idx_subprojects_project ON subprojects(project_id);

CREATE TABLE tasks (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE RESTRICT,
    subproject_id INTEGER REFERENCES subprojects(id) ON DELETE RESTRICT,
    name TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL,
    order_index INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX idx_tasks_name_direct
    ON tasks(project_id, name) WHERE subproject_id IS NULL;
CREATE UNIQUE INDEX idx_tasks_name_scoped
    ON tasks(subproject_id, name) WHERE subproject_id IS NOT NULL;
CREATE INDEX idx_tasks_project ON tasks(project_id);
CREATE INDEX idx_tasks_subproject ON tasks(subproject_id);

CREATE TABLE subtasks (
    id INTEGER PRIMARY KEY,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE RESTRICT,
    name TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL,
    order_index INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(task_id, name)
);

CREATE INDEX idx_subtasks_task ON subtasks(task_id);

CREATE TABLE task_dependencies (
    id INTEGER PRIMARY KEY,
    predecessor_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    successor_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    UNIQUE(predecessor_id, successor_id),
    CHECK(predecessor_id != successor_id)
);

CREATE INDEX idx_task_deps_pred ON task_dependencies(predecessor_id);
CREATE INDEX idx_task_deps_succ ON task_dependencies(successor_id);

CREATE TABLE subtask_dependencies (
    id INTEGER PRIMARY KEY,
    predecessor_id INTEGER NOT NULL REFERENCES subtasks(id) ON DELETE CASCADE,
    successor_id INTEGER NOT NULL REFERENCES subtasks(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    UNIQUE(predecessor_id, successor_id),
    CHECK(predecessor_id != successor_id)
);

CREATE INDEX idx_subtask_deps_pred ON subtask_dependencies(predecessor_id);
CREATE INDEX idx_subtask_deps_succ ON subtask_dependencies(successor_id);

CREATE TABLE templates (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    include_tasks INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE template_tasks (
    id INTEGER PRIMARY KEY,
    template_id INTEGER NOT NULL REFERENCES templates(id) ON DELETE CASCADE,
    task_order INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    UNIQUE(template_id, task_order)
);

CREATE TABLE template_subtasks (
    id INTEGER PRIMARY KEY,
    template_task_id INTEGER NOT NULL REFERENCES template_tasks(id) ON DELETE CASCADE,
    subtask_order INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    UNIQUE(template_task_id, subtask_order)
);

CREATE TABLE template_dependencies (
    id INTEGER PRIMARY KEY,
    template_id INTEGER NOT NULL REFERENCES templates(id) ON DELETE CASCADE,
    predecessor_order INTEGER NOT NULL,
    successor_order INTEGER NOT NULL,
    UNIQUE(template_id, predecessor_order, successor_order)
);
"#;
