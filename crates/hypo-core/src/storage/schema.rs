//! SQLite schema for the local entry store

use rusqlite::{params, Connection, OptionalExtension, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version and one-shot flags
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Entries
        CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY,
            remote_id TEXT,
            text TEXT NOT NULL,
            source TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Entry tags (set per entry)
        CREATE TABLE IF NOT EXISTS entry_tags (
            entry_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (entry_id, tag),
            FOREIGN KEY (entry_id) REFERENCES entries(id) ON DELETE CASCADE
        );

        -- Derived per-entry artifacts (embedding vectors)
        CREATE TABLE IF NOT EXISTS embeddings (
            entry_id TEXT PRIMARY KEY,
            vector BLOB NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_entries_created_at ON entries(created_at);
        CREATE INDEX IF NOT EXISTS idx_entries_updated_at ON entries(updated_at);
        CREATE INDEX IF NOT EXISTS idx_entries_remote_id ON entries(remote_id);
        CREATE INDEX IF NOT EXISTS idx_entry_tags_tag ON entry_tags(tag);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let value = get_flag(conn, "version")?;
    Ok(value.and_then(|v| v.parse().ok()))
}

/// Read a value from `schema_info`
pub fn get_flag(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM schema_info WHERE key = ?",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

/// Write a value to `schema_info`
pub fn set_flag(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES (?, ?)",
        params![key, value],
    )?;
    Ok(())
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"entries".to_string()));
        assert!(tables.contains(&"entry_tags".to_string()));
        assert!(tables.contains(&"embeddings".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();

        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_flags() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(get_flag(&conn, "bracket_migration").unwrap(), None);
        set_flag(&conn, "bracket_migration", "1").unwrap();
        assert_eq!(
            get_flag(&conn, "bracket_migration").unwrap(),
            Some("1".to_string())
        );
    }

    #[test]
    fn test_init_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }
}
