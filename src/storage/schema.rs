//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS local_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS test_history (
            id INTEGER PRIMARY KEY,
            recorded_at TEXT NOT NULL,
            pass_rate REAL NOT NULL,
            total_tests INTEGER NOT NULL,
            build_number TEXT NOT NULL,
            branch TEXT NOT NULL DEFAULT 'unknown'
        );

        CREATE INDEX IF NOT EXISTS idx_test_history_recorded ON test_history(recorded_at);",
    )?;

    // Migration: older databases recorded history without a project column
    let has_project: i32 = conn
        .query_row(
            "SELECT count(*) FROM pragma_table_info('test_history') WHERE name='project_name'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if has_project == 0 {
        conn.execute(
            "ALTER TABLE test_history ADD COLUMN project_name TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM local_state", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM test_history", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap(); // Should not error
    }
}
