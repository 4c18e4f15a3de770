//! Sheet CRUD operations

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::cells::{self, CellRow};
use crate::error::SheetError;
use crate::period::{Coord, Level};

/// Sheet row with its cells
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub id: String,
    pub owner_id: String,
    pub level: Level,
    pub year: i32,
    pub period: i32,
    pub parent_id: Option<String>,
    pub created_at: String,
    pub cells: Vec<CellRow>,
}

impl SheetRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            level: row.get("level")?,
            year: row.get("year")?,
            period: row.get("period")?,
            parent_id: row.get("parent_id")?,
            created_at: row.get("created_at")?,
            cells: vec![], // Loaded separately
        })
    }

    pub fn coord(&self) -> Coord {
        Coord {
            level: self.level,
            year: self.year,
            period: self.period,
        }
    }

    /// Cell at `(category_id, column_key)`, if present
    pub fn cell(&self, category_id: &str, column_key: &str) -> Option<&CellRow> {
        self.cells
            .iter()
            .find(|c| c.category_id == category_id && c.column_key == column_key)
    }
}

impl ToSql for Level {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Level {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn with_cells(conn: &Connection, sheet: Option<SheetRow>) -> Result<Option<SheetRow>, SheetError> {
    match sheet {
        Some(mut sheet) => {
            sheet.cells = cells::list_cells(conn, &sheet.id)?;
            Ok(Some(sheet))
        }
        None => Ok(None),
    }
}

/// Find the sheet an owner has at a coordinate
pub fn find_sheet(conn: &Connection, owner_id: &str, coord: &Coord) -> Result<Option<SheetRow>, SheetError> {
    let sheet = conn
        .query_row(
            "SELECT * FROM sheets WHERE owner_id = ? AND level = ? AND year = ? AND period = ?",
            params![owner_id, coord.level, coord.year, coord.period],
            |row| SheetRow::from_row(row),
        )
        .optional()?;

    with_cells(conn, sheet)
}

/// Get sheet by ID
pub fn get_sheet(conn: &Connection, id: &str) -> Result<Option<SheetRow>, SheetError> {
    let sheet = conn
        .query_row("SELECT * FROM sheets WHERE id = ?", params![id], |row| SheetRow::from_row(row))
        .optional()?;

    with_cells(conn, sheet)
}

/// Create a sheet, or return the existing one at the same coordinate.
///
/// A concurrent creator winning the unique `(owner_id, level, year, period)`
/// key is not an error: the insert becomes a no-op and the winner's row is
/// returned.
pub fn create_sheet(
    conn: &Connection,
    owner_id: &str,
    coord: &Coord,
    parent_id: Option<&str>,
) -> Result<SheetRow, SheetError> {
    coord.validate()?;

    let id = Uuid::new_v4().to_string();
    let inserted = conn.execute(
        "INSERT INTO sheets (id, owner_id, level, year, period, parent_id)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(owner_id, level, year, period) DO NOTHING",
        params![id, owner_id, coord.level, coord.year, coord.period, parent_id],
    )?;

    if inserted == 0 {
        debug!(owner = %owner_id, coord = %coord, "Sheet already existed, re-fetching");
    }

    find_sheet(conn, owner_id, coord)?
        .ok_or_else(|| SheetError::Internal(format!("Sheet {} missing after insert", coord)))
}

/// Move a sheet (and implicitly its cells) to another owner
pub fn update_sheet_owner(conn: &Connection, sheet_id: &str, new_owner_id: &str) -> Result<(), SheetError> {
    let changes = conn.execute(
        "UPDATE sheets SET owner_id = ? WHERE id = ?",
        params![new_owner_id, sheet_id],
    )?;

    if changes == 0 {
        return Err(SheetError::NotFound(format!("sheet {}", sheet_id)));
    }
    Ok(())
}

/// Delete a sheet; its cells go with it
pub fn delete_sheet(conn: &Connection, sheet_id: &str) -> Result<bool, SheetError> {
    let changes = conn.execute("DELETE FROM sheets WHERE id = ?", params![sheet_id])?;
    Ok(changes > 0)
}

/// All sheets of an owner with embedded cells, coarse levels first
pub fn list_sheets(conn: &Connection, owner_id: &str) -> Result<Vec<SheetRow>, SheetError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM sheets WHERE owner_id = ? ORDER BY year, period, created_at",
    )?;

    let rows = stmt.query_map(params![owner_id], |row| SheetRow::from_row(row))?;

    let mut results = vec![];
    for row in rows {
        let mut sheet = row?;
        sheet.cells = cells::list_cells(conn, &sheet.id)?;
        results.push(sheet);
    }
    results.sort_by_key(|s| s.level);

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_create_and_find() {
        let conn = conn();
        let coord = Coord::new(Level::Week, 2026, 13).unwrap();
        let created = create_sheet(&conn, "owner", &coord, None).unwrap();

        let found = find_sheet(&conn, "owner", &coord).unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.level, Level::Week);
        assert!(find_sheet(&conn, "other", &coord).unwrap().is_none());
    }

    #[test]
    fn test_create_duplicate_returns_existing() {
        let conn = conn();
        let coord = Coord::new(Level::Month, 2026, 3).unwrap();
        let first = create_sheet(&conn, "owner", &coord, None).unwrap();
        let second = create_sheet(&conn, "owner", &coord, None).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(list_sheets(&conn, "owner").unwrap().len(), 1);
    }

    #[test]
    fn test_create_rejects_invalid_coord() {
        let conn = conn();
        let coord = Coord { level: Level::Month, year: 2026, period: 13 };
        assert!(matches!(
            create_sheet(&conn, "owner", &coord, None),
            Err(SheetError::Domain(_))
        ));
    }

    #[test]
    fn test_update_owner() {
        let conn = conn();
        let coord = Coord::new(Level::Year, 2026, 0).unwrap();
        let sheet = create_sheet(&conn, "guest", &coord, None).unwrap();

        update_sheet_owner(&conn, &sheet.id, "user").unwrap();

        assert!(find_sheet(&conn, "guest", &coord).unwrap().is_none());
        assert_eq!(find_sheet(&conn, "user", &coord).unwrap().unwrap().id, sheet.id);
        assert!(matches!(
            update_sheet_owner(&conn, "missing", "user"),
            Err(SheetError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_orders_by_level() {
        let conn = conn();
        create_sheet(&conn, "owner", &Coord::new(Level::Week, 2026, 1).unwrap(), None).unwrap();
        create_sheet(&conn, "owner", &Coord::life(), None).unwrap();
        create_sheet(&conn, "owner", &Coord::new(Level::Year, 2026, 0).unwrap(), None).unwrap();

        let levels: Vec<Level> = list_sheets(&conn, "owner").unwrap().iter().map(|s| s.level).collect();
        assert_eq!(levels, vec![Level::Life, Level::Year, Level::Week]);
    }

    #[test]
    fn test_deleting_parent_clears_child_edge() {
        let conn = conn();
        let parent = create_sheet(&conn, "owner", &Coord::new(Level::Month, 2026, 3).unwrap(), None).unwrap();
        let child_coord = Coord::new(Level::Week, 2026, 11).unwrap();
        create_sheet(&conn, "owner", &child_coord, Some(&parent.id)).unwrap();

        assert!(delete_sheet(&conn, &parent.id).unwrap());

        let child = find_sheet(&conn, "owner", &child_coord).unwrap().unwrap();
        assert_eq!(child.parent_id, None);
    }
}
