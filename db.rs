use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;
use std::path::Path;
use crate::error::Result;
use crate::schema;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Upper bound of ids per `IN (...)` list.
pub const MAX_BATCH_SIZE: usize = 500;

/// Initializes the database connection pool and runs migrations.
pub fn init_database(db_path: &Path) -> Result<DbPool> {
    log::info!("Database path: {}", db_path.display());

    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(|c| {
        c.execute_batch("PRAGMA foreign_keys = ON;")?;
        register_functions(c)
    });
    let pool = r2d2::Pool::new(manager)?;

    let conn = pool.get()?;
    run_migrations(&conn)?;

    Ok(pool)
}

/// Opens a private in-memory database with the full schema applied.
pub fn open_in_memory() -> Result<Connection> {
    let connection = Connection::open_in_memory()?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    register_functions(&connection)?;
    run_migrations(&connection)?;
    Ok(connection)
}

/// Registers `casefold(x)`, the Unicode lowercase of a text value. SQLite's
/// own `lower()` and `LIKE` only fold ASCII letters.
pub fn register_functions(connection: &Connection) -> rusqlite::Result<()> {
    connection.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).to_lowercase()),
                other => Value::from(other),
            })
        },
    )
}

/// Applies all pending database migrations.
pub fn run_migrations(connection: &Connection) -> Result<()> {
    let current: i64 = connection.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let pending = schema::MIGRATIONS.iter().enumerate().skip(current.max(0) as usize);

    log::info!("Running database migrations from version {current}...");

    for (idx, migration) in pending {
        let version = idx + 1;
        connection.execute_batch(migration)?;
        connection.execute_batch(&format!("PRAGMA user_version = {version}"))?;
        log::debug!("Applied migration {version:04}");
    }

    log::info!("Migrations applied successfully.");
    Ok(())
}

/// Expands to `?, ?, ...` with `count` placeholders.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version as usize, schema::MIGRATIONS.len());
        let defaults: i64 = conn
            .query_row("SELECT COUNT(*) FROM configs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(defaults, 8);
    }

    #[test]
    fn casefold_lowers_beyond_ascii() {
        let conn = open_in_memory().unwrap();
        let folded: String = conn
            .query_row("SELECT casefold('ÄRGER in KÖLN')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded, "ärger in köln");
        let null: Option<String> = conn.query_row("SELECT casefold(NULL)", [], |row| row.get(0)).unwrap();
        assert_eq!(null, None);
    }

    #[test]
    fn pooled_connections_know_casefold() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("gallery.db")).unwrap();
        let conn = pool.get().unwrap();
        let folded: String = conn.query_row("SELECT casefold('Ü')", [], |row| row.get(0)).unwrap();
        assert_eq!(folded, "ü");
    }

    #[test]
    fn placeholders_match_count() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }
}
