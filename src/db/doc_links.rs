//! Owner-scoped document links

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SheetError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocLinkRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl DocLinkRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            title: row.get("title")?,
            url: row.get("url")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocLinkInput {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub fn create_doc_link(
    conn: &Connection,
    owner_id: &str,
    input: &CreateDocLinkInput,
) -> Result<DocLinkRow, SheetError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO doc_links (id, owner_id, title, url, description) VALUES (?, ?, ?, ?, ?)",
        params![id, owner_id, input.title, input.url, input.description],
    )?;

    let row = conn.query_row("SELECT * FROM doc_links WHERE id = ?", params![id], |row| {
        DocLinkRow::from_row(row)
    })?;
    Ok(row)
}

pub fn list_doc_links(conn: &Connection, owner_id: &str) -> Result<Vec<DocLinkRow>, SheetError> {
    let mut stmt = conn.prepare("SELECT * FROM doc_links WHERE owner_id = ? ORDER BY created_at, id")?;

    let links = stmt
        .query_map(params![owner_id], |row| DocLinkRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(links)
}

/// Bulk move every link of `from_owner` to `to_owner`. Returns rows moved.
pub fn reassign_doc_links(conn: &Connection, from_owner: &str, to_owner: &str) -> Result<u64, SheetError> {
    let changes = conn.execute(
        "UPDATE doc_links SET owner_id = ? WHERE owner_id = ?",
        params![to_owner, from_owner],
    )?;
    Ok(changes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    #[test]
    fn test_create_list_reassign() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();

        let input = CreateDocLinkInput {
            title: "Framework notes".into(),
            url: "https://example.com/notes".into(),
            description: None,
        };
        let link = create_doc_link(&conn, "guest", &input).unwrap();
        assert_eq!(link.owner_id, "guest");

        assert_eq!(reassign_doc_links(&conn, "guest", "user").unwrap(), 1);
        assert!(list_doc_links(&conn, "guest").unwrap().is_empty());
        assert_eq!(list_doc_links(&conn, "user").unwrap()[0].id, link.id);

        // Nothing left to move
        assert_eq!(reassign_doc_links(&conn, "guest", "user").unwrap(), 0);
    }
}
