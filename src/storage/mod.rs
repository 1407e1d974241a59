//! SQLite storage layer -- schema, key/value slots, migrations.

pub mod execution;
pub mod schema;

use anyhow::Result;
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;

pub use self::execution::ExecutionStore;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Key holding the serialized tracked execution.
pub const KEY_PIPELINE_EXECUTION: &str = "pipeline_execution";
/// Key holding the last published test-result summary.
pub const KEY_LAST_TEST_RESULTS: &str = "lastTestResults";
/// Key holding the display name of the current pipeline.
pub const KEY_CURRENT_PIPELINE_NAME: &str = "current_pipeline_name";
/// Key holding the last phase of the tracked execution.
pub const KEY_EXECUTION_PHASE: &str = "execution_phase";

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// In-memory pool for tests and throwaway sessions.
///
/// Capped at one connection: every new in-memory connection would otherwise
/// see its own empty database.
pub fn open_memory_pool() -> Result<Pool> {
    let manager = SqliteConnectionManager::memory();
    let pool = R2D2Pool::builder().max_size(1).build(manager)?;
    let conn = pool.get()?;
    schema::migrate(&conn)?;
    Ok(pool)
}

/// Read the raw value stored under `key`.
pub fn get_value(pool: &Pool, key: &str) -> Result<Option<String>> {
    let conn = pool.get()?;
    let value = conn
        .query_row(
            "SELECT value FROM local_state WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

/// Overwrite the value stored under `key`.
pub fn put_value(pool: &Pool, key: &str, value: &str) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO local_state (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// Remove the value stored under `key`. Missing keys are not an error.
pub fn remove_value(pool: &Pool, key: &str) -> Result<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM local_state WHERE key = ?1", rusqlite::params![key])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_overwrites_and_remove_clears() {
        let pool = open_memory_pool().unwrap();
        assert_eq!(get_value(&pool, "k").unwrap(), None);

        put_value(&pool, "k", "one").unwrap();
        put_value(&pool, "k", "two").unwrap();
        assert_eq!(get_value(&pool, "k").unwrap().as_deref(), Some("two"));

        remove_value(&pool, "k").unwrap();
        remove_value(&pool, "k").unwrap();
        assert_eq!(get_value(&pool, "k").unwrap(), None);
    }

    #[test]
    fn test_open_pool_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let path = path.to_str().unwrap();

        let pool = open_pool(path).unwrap();
        put_value(&pool, KEY_CURRENT_PIPELINE_NAME, "Nightly").unwrap();
        drop(pool);

        let reopened = open_pool(path).unwrap();
        assert_eq!(
            get_value(&reopened, KEY_CURRENT_PIPELINE_NAME).unwrap().as_deref(),
            Some("Nightly")
        );
    }
}
