//! Grid categories (row axis)

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::debug;

use crate::error::SheetError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRow {
    pub id: String,
    pub name: String,
    pub sub_name: String,
    pub sort_order: i32,
}

/// Life domains every grid starts with: (id, name, sub name)
const DEFAULT_CATEGORIES: [(&str, &str, &str); 4] = [
    ("foundation", "Livelihood", "Foundation"),
    ("career", "Career", "Career"),
    ("connection", "Relationships", "Connection"),
    ("free", "Margin (hobbies etc.)", "Free"),
];

/// Insert the default categories, leaving existing rows untouched
pub fn seed_default_categories(conn: &Connection) -> Result<(), SheetError> {
    let mut inserted = 0;
    for (i, (id, name, sub_name)) in DEFAULT_CATEGORIES.iter().enumerate() {
        inserted += conn.execute(
            "INSERT OR IGNORE INTO categories (id, name, sub_name, sort_order) VALUES (?, ?, ?, ?)",
            params![id, name, sub_name, i as i32 + 1],
        )?;
    }
    if inserted > 0 {
        debug!(inserted, "Seeded default categories");
    }
    Ok(())
}

/// All categories in display order
pub fn list_categories(conn: &Connection) -> Result<Vec<CategoryRow>, SheetError> {
    let mut stmt = conn.prepare("SELECT id, name, sub_name, sort_order FROM categories ORDER BY sort_order ASC")?;

    let categories = stmt
        .query_map([], |row| {
            Ok(CategoryRow {
                id: row.get(0)?,
                name: row.get(1)?,
                sub_name: row.get(2)?,
                sort_order: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}
