//! SQL schema definitions

use crate::plan::ContentTable;

pub const SCHEMA: &str = r#"
-- Conversations table
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    messages TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Plans saved for later execution
CREATE TABLE IF NOT EXISTS saved_plans (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    actions TEXT NOT NULL,
    conversation_id TEXT,
    status TEXT NOT NULL DEFAULT 'saved',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Every execution attempt, whatever its outcome
CREATE TABLE IF NOT EXISTS plan_history (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    actions TEXT NOT NULL,
    results TEXT NOT NULL,
    status TEXT NOT NULL,
    conversation_id TEXT,
    executed_at TEXT NOT NULL
);

-- Applied row changes
CREATE TABLE IF NOT EXISTS change_history (
    id TEXT PRIMARY KEY,
    plan_id TEXT,
    table_name TEXT NOT NULL,
    record_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    before_data TEXT,
    after_data TEXT,
    changed_at TEXT NOT NULL,
    FOREIGN KEY (plan_id) REFERENCES plan_history(id) ON DELETE SET NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_saved_plans_status ON saved_plans(status);
CREATE INDEX IF NOT EXISTS idx_saved_plans_conversation_id ON saved_plans(conversation_id);
CREATE INDEX IF NOT EXISTS idx_change_history_plan_id ON change_history(plan_id);
CREATE INDEX IF NOT EXISTS idx_change_history_record ON change_history(table_name, record_id);
"#;

/// DDL for the content tables, generated from the allow-list schemas
pub fn content_schema() -> String {
    let mut sql = String::new();
    for table in ContentTable::ALL {
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    id TEXT PRIMARY KEY,\n",
            table.as_str()
        ));
        for column in table.columns() {
            sql.push_str(&format!(
                "    {} {}{},\n",
                column.name,
                column.kind.sql_type(),
                if column.required { " NOT NULL" } else { "" }
            ));
        }
        sql.push_str("    created_at TEXT NOT NULL,\n    updated_at TEXT NOT NULL\n);\n");
    }
    sql
}
