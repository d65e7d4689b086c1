use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::store::KvSlot;

/// Opens (or creates) the workspace's key-value slot. One table, string keys
/// to string values, standing in for the browser's per-origin localStorage.
pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("lms.sqlite3");
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn kv_get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM kv WHERE key = ?", [key], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(value)
}

pub fn kv_set(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO kv(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value),
    )?;
    Ok(())
}

impl KvSlot for Connection {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        kv_get(self, key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        kv_set(self, key, value)
    }
}
