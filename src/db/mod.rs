//! SQLite database for sheets and their cells
//!
//! ## Tables
//!
//! - `categories` - Global row axis of every grid (seeded, read-only)
//! - `sheets` - One row per `(owner_id, level, year, period)`
//! - `cells` - One row per `(sheet_id, category_id, column_key)`, cascades with its sheet
//! - `doc_links` - Owner-scoped document links
//! - `user_profiles` - Per-owner settings (birth year anchors the phases)
//!
//! Repository functions live in the submodules and take a `&Connection`;
//! [`SheetDb`] owns the connection and implements [`crate::store::SheetStore`]
//! on top of them.

pub mod schema;
pub mod sheets;
pub mod cells;
pub mod categories;
pub mod doc_links;
pub mod profiles;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::SheetError;
use crate::period::Coord;
use crate::store::SheetStore;

/// How long a writer waits on another connection's lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database for sheets, cells and owner records
pub struct SheetDb {
    conn: Mutex<Connection>,
}

impl SheetDb {
    /// Open or create the sheet database in `storage_dir`
    pub fn open(storage_dir: &Path) -> Result<Self, SheetError> {
        Self::open_file(&storage_dir.join("lifesheet.db"))
    }

    /// Open or create the database at an exact file path
    pub fn open_file(db_path: &Path) -> Result<Self, SheetError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL for concurrent readers; foreign keys so cells cascade with their sheet
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, SheetError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), SheetError> {
        self.with_conn(|conn| {
            schema::init_schema(conn)?;
            categories::seed_default_categories(conn)
        })
    }

    /// Run a read against the shared connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, SheetError>
    where
        F: FnOnce(&Connection) -> Result<T, SheetError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| SheetError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    fn count_rows(&self) -> Result<DbStats, SheetError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, SheetError> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                sheet_count: count("SELECT COUNT(*) FROM sheets")?,
                cell_count: count("SELECT COUNT(*) FROM cells")?,
                owner_count: count("SELECT COUNT(DISTINCT owner_id) FROM sheets")?,
                doc_link_count: count("SELECT COUNT(*) FROM doc_links")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub sheet_count: u64,
    pub cell_count: u64,
    pub owner_count: u64,
    pub doc_link_count: u64,
}

impl SheetStore for SheetDb {
    fn find_sheet(&self, owner_id: &str, coord: &Coord) -> Result<Option<SheetRow>, SheetError> {
        self.with_conn(|conn| sheets::find_sheet(conn, owner_id, coord))
    }

    fn get_sheet(&self, sheet_id: &str) -> Result<Option<SheetRow>, SheetError> {
        self.with_conn(|conn| sheets::get_sheet(conn, sheet_id))
    }

    fn create_sheet(
        &self,
        owner_id: &str,
        coord: &Coord,
        parent_id: Option<&str>,
    ) -> Result<SheetRow, SheetError> {
        self.with_conn(|conn| sheets::create_sheet(conn, owner_id, coord, parent_id))
    }

    fn update_sheet_owner(&self, sheet_id: &str, new_owner_id: &str) -> Result<(), SheetError> {
        self.with_conn(|conn| sheets::update_sheet_owner(conn, sheet_id, new_owner_id))
    }

    fn delete_sheet(&self, sheet_id: &str) -> Result<(), SheetError> {
        self.with_conn(|conn| sheets::delete_sheet(conn, sheet_id).map(|_| ()))
    }

    fn list_sheets(&self, owner_id: &str) -> Result<Vec<SheetRow>, SheetError> {
        self.with_conn(|conn| sheets::list_sheets(conn, owner_id))
    }

    fn upsert_cell(&self, key: &CellKey<'_>, patch: &CellPatch) -> Result<CellRow, SheetError> {
        self.with_conn(|conn| cells::upsert_cell(conn, key, patch))
    }

    fn insert_cell_if_absent(
        &self,
        key: &CellKey<'_>,
        content: Option<&str>,
        checked: bool,
    ) -> Result<bool, SheetError> {
        self.with_conn(|conn| cells::insert_cell_if_absent(conn, key, content, checked))
    }

    fn reassign_auxiliary_records(&self, from_owner: &str, to_owner: &str) -> Result<u64, SheetError> {
        self.with_conn(|conn| doc_links::reassign_doc_links(conn, from_owner, to_owner))
    }

    fn list_categories(&self) -> Result<Vec<CategoryRow>, SheetError> {
        self.with_conn(categories::list_categories)
    }

    fn birth_year(&self, owner_id: &str) -> Result<Option<i32>, SheetError> {
        self.with_conn(|conn| {
            Ok(profiles::get_profile(conn, owner_id)?.and_then(|p| p.birth_year))
        })
    }

    fn get_or_create_profile(&self, owner_id: &str) -> Result<ProfileRow, SheetError> {
        self.with_conn(|conn| profiles::get_or_create_profile(conn, owner_id))
    }

    fn upsert_profile(&self, owner_id: &str, input: &UpdateProfileInput) -> Result<ProfileRow, SheetError> {
        self.with_conn(|conn| profiles::upsert_profile(conn, owner_id, input))
    }

    fn list_doc_links(&self, owner_id: &str) -> Result<Vec<DocLinkRow>, SheetError> {
        self.with_conn(|conn| doc_links::list_doc_links(conn, owner_id))
    }

    fn create_doc_link(&self, owner_id: &str, input: &CreateDocLinkInput) -> Result<DocLinkRow, SheetError> {
        self.with_conn(|conn| doc_links::create_doc_link(conn, owner_id, input))
    }

    /// Row counts for the health endpoint and startup logs
    fn stats(&self) -> Result<DbStats, SheetError> {
        self.count_rows()
    }
}

// Re-exports
pub use categories::CategoryRow;
pub use cells::{CellKey, CellPatch, CellRow, ColumnDef, PDCA_COLUMNS};
pub use doc_links::{CreateDocLinkInput, DocLinkRow};
pub use profiles::{ProfileRow, UpdateProfileInput};
pub use sheets::SheetRow;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Level;

    #[test]
    fn test_open_in_memory_seeds_categories() {
        let db = SheetDb::open_in_memory().unwrap();
        let categories = db.list_categories().unwrap();
        let ids: Vec<&str> = categories.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["foundation", "career", "connection", "free"]);
    }

    #[test]
    fn test_delete_sheet_cascades_to_cells() {
        let db = SheetDb::open_in_memory().unwrap();
        let coord = Coord::new(Level::Month, 2026, 3).unwrap();
        let sheet = db.create_sheet("user-1", &coord, None).unwrap();
        let key = CellKey { sheet_id: &sheet.id, category_id: "career", column_key: "plan" };
        db.upsert_cell(&key, &CellPatch::content("ship it")).unwrap();
        assert_eq!(db.stats().unwrap().cell_count, 1);

        db.delete_sheet(&sheet.id).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.sheet_count, 0);
        assert_eq!(stats.cell_count, 0);
    }

    #[test]
    fn test_reopen_file_keeps_data() {
        let dir = tempfile::TempDir::new().unwrap();
        let coord = Coord::new(Level::Year, 2026, 0).unwrap();
        {
            let db = SheetDb::open(dir.path()).unwrap();
            db.create_sheet("user-1", &coord, None).unwrap();
        }
        let db = SheetDb::open(dir.path()).unwrap();
        assert!(db.find_sheet("user-1", &coord).unwrap().is_some());
        assert_eq!(db.list_categories().unwrap().len(), 4);
    }
}
