use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "rosterd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    create_schema(&conn)?;
    Ok(conn)
}

pub fn create_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT
        )",
        [],
    )?;
    // Workspaces created before optimistic versioning have no version column.
    ensure_kv_store_versioning(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_bank_students(
            student_id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            full_name TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_bank_students_class ON exam_bank_students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_bank_slots(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            term INTEGER NOT NULL,
            component TEXT NOT NULL,
            score REAL,
            FOREIGN KEY(student_id) REFERENCES exam_bank_students(student_id),
            UNIQUE(student_id, term, component)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_bank_slots_student ON exam_bank_slots(student_id)",
        [],
    )?;

    Ok(())
}

fn ensure_kv_store_versioning(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "kv_store", "version")? {
        conn.execute(
            "ALTER TABLE kv_store ADD COLUMN version INTEGER NOT NULL DEFAULT 1",
            [],
        )?;
    }
    if !table_has_column(conn, "kv_store", "updated_at")? {
        conn.execute("ALTER TABLE kv_store ADD COLUMN updated_at TEXT", [])?;
    }
    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("setting {} is not valid JSON", key))?;
    Ok(Some(value))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unversioned_kv_store_is_migrated_in_place() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute(
            "CREATE TABLE kv_store(key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .expect("old table");
        conn.execute(
            "INSERT INTO kv_store(key, value) VALUES('classLists', '{}')",
            [],
        )
        .expect("old row");

        create_schema(&conn).expect("migrate");
        create_schema(&conn).expect("migrate twice");

        let version: i64 = conn
            .query_row(
                "SELECT version FROM kv_store WHERE key = 'classLists'",
                [],
                |r| r.get(0),
            )
            .expect("version");
        assert_eq!(version, 1);
    }
}
