//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::SheetError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), SheetError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        conn.execute_batch(SHEETS_SCHEMA)?;
        conn.execute_batch(OWNER_RECORDS_SCHEMA)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(SheetError::Config(format!(
            "Database schema v{} is newer than supported v{}",
            current_version, SCHEMA_VERSION
        )));
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, SheetError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), SheetError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

/// Categories, sheets and cells
const SHEETS_SCHEMA: &str = r#"
-- Global row axis, ordered by sort_order
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    sub_name TEXT NOT NULL,
    sort_order INTEGER NOT NULL
);

-- owner_id is a guest token or an authenticated user id; both share this column.
-- parent_id is a hierarchy edge set at creation, not an ownership link.
CREATE TABLE IF NOT EXISTS sheets (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    level TEXT NOT NULL,
    year INTEGER NOT NULL,
    period INTEGER NOT NULL,
    parent_id TEXT REFERENCES sheets(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (owner_id, level, year, period)
);

CREATE TABLE IF NOT EXISTS cells (
    id TEXT PRIMARY KEY NOT NULL,
    sheet_id TEXT NOT NULL REFERENCES sheets(id) ON DELETE CASCADE,
    category_id TEXT NOT NULL,
    column_key TEXT NOT NULL,
    content TEXT,
    checked INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (sheet_id, category_id, column_key)
);

CREATE INDEX IF NOT EXISTS idx_sheets_owner ON sheets(owner_id);
CREATE INDEX IF NOT EXISTS idx_cells_sheet ON cells(sheet_id);
"#;

/// Owner-scoped records outside the grid
const OWNER_RECORDS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS doc_links (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_doc_links_owner ON doc_links(owner_id);

CREATE TABLE IF NOT EXISTS user_profiles (
    owner_id TEXT PRIMARY KEY NOT NULL,
    birth_year INTEGER,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_rejects_newer_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();
        assert!(matches!(init_schema(&conn), Err(SheetError::Config(_))));
    }
}
