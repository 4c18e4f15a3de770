//! Cell upserts
//!
//! Cells are keyed by `(sheet_id, category_id, column_key)` and are only ever
//! created or updated through an upsert on that key.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::SheetError;

/// One column of the PDCA grid
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub key: &'static str,
    pub label: &'static str,
    pub group: &'static str,
    pub checkbox: bool,
}

/// The fixed column set of every grid, regardless of level
pub const PDCA_COLUMNS: [ColumnDef; 5] = [
    ColumnDef { key: "plan", label: "P", group: "Plan", checkbox: false },
    ColumnDef { key: "indicator", label: "KPI", group: "Plan", checkbox: false },
    ColumnDef { key: "do", label: "D", group: "Review", checkbox: true },
    ColumnDef { key: "check", label: "C", group: "Review", checkbox: true },
    ColumnDef { key: "action", label: "A", group: "Review", checkbox: false },
];

/// Column whose content is shown to child sheets as the parent's plan
pub const INDICATOR_COLUMN: &str = "indicator";

pub fn is_known_column(key: &str) -> bool {
    PDCA_COLUMNS.iter().any(|c| c.key == key)
}

/// Cell row from database
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRow {
    pub id: String,
    pub sheet_id: String,
    pub category_id: String,
    pub column_key: String,
    pub content: Option<String>,
    pub checked: bool,
    pub updated_at: String,
}

impl CellRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            sheet_id: row.get("sheet_id")?,
            category_id: row.get("category_id")?,
            column_key: row.get("column_key")?,
            content: row.get("content")?,
            checked: row.get("checked")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Unique key of a cell
#[derive(Debug, Clone, Copy)]
pub struct CellKey<'a> {
    pub sheet_id: &'a str,
    pub category_id: &'a str,
    pub column_key: &'a str,
}

/// Fields to write. `None` leaves the stored value alone on update and uses
/// the column default on create.
///
/// `content: Some(None)` clears the text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CellPatch {
    #[serde(default, deserialize_with = "present")]
    pub content: Option<Option<String>>,
    #[serde(default)]
    pub checked: Option<bool>,
}

// Distinguishes `"content": null` (clear) from an absent field (keep).
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl CellPatch {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(Some(text.into())),
            checked: None,
        }
    }

    pub fn checked(checked: bool) -> Self {
        Self {
            content: None,
            checked: Some(checked),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.checked.is_none()
    }
}

/// All cells of a sheet
pub fn list_cells(conn: &Connection, sheet_id: &str) -> Result<Vec<CellRow>, SheetError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM cells WHERE sheet_id = ? ORDER BY category_id, column_key",
    )?;

    let cells = stmt
        .query_map(params![sheet_id], |row| CellRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(cells)
}

/// Get the cell at a key
pub fn get_cell(conn: &Connection, key: &CellKey<'_>) -> Result<Option<CellRow>, SheetError> {
    let cell = conn
        .query_row(
            "SELECT * FROM cells WHERE sheet_id = ? AND category_id = ? AND column_key = ?",
            params![key.sheet_id, key.category_id, key.column_key],
            |row| CellRow::from_row(row),
        )
        .optional()?;

    Ok(cell)
}

/// Create the cell or update only the fields present in `patch`.
///
/// Concurrent writers to the same key are last-write-wins.
pub fn upsert_cell(conn: &Connection, key: &CellKey<'_>, patch: &CellPatch) -> Result<CellRow, SheetError> {
    let content = patch.content.clone().flatten();
    let checked = patch.checked.unwrap_or(false);

    conn.execute(
        "INSERT INTO cells (id, sheet_id, category_id, column_key, content, checked)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(sheet_id, category_id, column_key) DO UPDATE SET
             content = CASE WHEN ?7 THEN excluded.content ELSE cells.content END,
             checked = CASE WHEN ?8 THEN excluded.checked ELSE cells.checked END,
             updated_at = CASE WHEN ?7 OR ?8 THEN datetime('now') ELSE cells.updated_at END",
        params![
            Uuid::new_v4().to_string(),
            key.sheet_id,
            key.category_id,
            key.column_key,
            content,
            checked,
            patch.content.is_some(),
            patch.checked.is_some(),
        ],
    )?;

    get_cell(conn, key)?
        .ok_or_else(|| SheetError::Internal("Cell not found after upsert".to_string()))
}

/// Create the cell with the given values unless one already exists.
///
/// Never touches an existing cell. Returns whether a row was inserted.
pub fn insert_cell_if_absent(
    conn: &Connection,
    key: &CellKey<'_>,
    content: Option<&str>,
    checked: bool,
) -> Result<bool, SheetError> {
    let inserted = conn.execute(
        "INSERT INTO cells (id, sheet_id, category_id, column_key, content, checked)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(sheet_id, category_id, column_key) DO NOTHING",
        params![
            Uuid::new_v4().to_string(),
            key.sheet_id,
            key.category_id,
            key.column_key,
            content,
            checked,
        ],
    )?;

    Ok(inserted > 0)
}
